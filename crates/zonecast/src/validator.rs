//! Key-constraint validation, deciding whether a peer is a destination.

use zonecast_geometry::{Coordinate, Key, Zone};

use crate::message::RoutingPlan;

/// Decides whether a zone satisfies the key constraints of a message.
///
/// A router transitions a message to its destination state exactly when the
/// local zone validates.
pub trait ConstraintsValidator: Send + Sync {
    /// True when `zone` is a destination for the constrained key.
    fn validates_key_constraints(&self, zone: &Zone) -> bool;
}

/// Exactly the peer owning a point validates.
#[derive(Debug, Clone)]
pub struct PointConstraintsValidator {
    target: Coordinate,
}

impl PointConstraintsValidator {
    /// Validate against `target`.
    pub fn new(target: Coordinate) -> Self {
        Self { target }
    }
}

impl ConstraintsValidator for PointConstraintsValidator {
    fn validates_key_constraints(&self, zone: &Zone) -> bool {
        zone.contains(&self.target)
    }
}

/// Every peer whose zone meets the key on its constrained axes validates.
/// A fully wildcard key selects the whole overlay.
#[derive(Debug, Clone)]
pub struct RegionConstraintsValidator {
    key: Key,
}

impl RegionConstraintsValidator {
    /// Validate against `key`.
    pub fn new(key: Key) -> Self {
        Self { key }
    }
}

impl ConstraintsValidator for RegionConstraintsValidator {
    fn validates_key_constraints(&self, zone: &Zone) -> bool {
        zone.matches_key(&self.key)
    }
}

/// The validator a routing plan implies.
pub fn for_plan(plan: &RoutingPlan) -> Box<dyn ConstraintsValidator> {
    match plan {
        RoutingPlan::Unicast { target } => {
            Box::new(PointConstraintsValidator::new(target.clone()))
        }
        RoutingPlan::Anycast { key } | RoutingPlan::Broadcast { key, .. } => {
            Box::new(RegionConstraintsValidator::new(key.clone()))
        }
    }
}

/// Shorthand used on the routing hot path.
pub fn validates(plan: &RoutingPlan, zone: &Zone) -> bool {
    for_plan(plan).validates_key_constraints(zone)
}

#[cfg(test)]
mod tests {
    use zonecast_geometry::{Element, SpaceDescriptor};

    use super::*;

    #[test]
    fn point_validates_only_the_owning_zone() {
        let space = SpaceDescriptor::numeric(2);
        let (west, east) = Zone::full(&space).split(0).unwrap();
        let target = Coordinate::new(vec![Element::Numeric(0.75), Element::Numeric(0.5)]);
        let plan = RoutingPlan::Unicast { target };
        assert!(!validates(&plan, &west));
        assert!(validates(&plan, &east));
    }

    #[test]
    fn wildcard_axes_impose_no_constraint() {
        let space = SpaceDescriptor::numeric(2);
        let (west, east) = Zone::full(&space).split(0).unwrap();
        let plan = RoutingPlan::Anycast {
            key: Key::wildcard(2).with_element(0, Element::Numeric(0.1)),
        };
        assert!(validates(&plan, &west));
        assert!(!validates(&plan, &east));

        let everywhere = RoutingPlan::Anycast {
            key: Key::wildcard(2),
        };
        assert!(validates(&everywhere, &west));
        assert!(validates(&everywhere, &east));
    }
}
