//! Axis-aligned regions of the coordinate space.

use std::cmp::Ordering;

use crate::coordinate::{Coordinate, Key};
use crate::element::{Alphabet, Element, ElementKind, StrElement};
use crate::{ZoneError, ZoneResult};

/// Network-wide description of the coordinate space: dimension count, element
/// kind per dimension and the alphabet string dimensions are defined over.
///
/// Every peer of one overlay instance is constructed with the same
/// descriptor.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpaceDescriptor {
    kinds: Vec<ElementKind>,
    alphabet: Alphabet,
}

impl SpaceDescriptor {
    /// A space with the given per-dimension kinds.
    pub fn new(kinds: Vec<ElementKind>, alphabet: Alphabet) -> Self {
        Self { kinds, alphabet }
    }

    /// A numeric space of `dimensions` axes over `[0, 1)`.
    pub fn numeric(dimensions: usize) -> Self {
        Self::new(vec![ElementKind::Numeric; dimensions], Alphabet::default())
    }

    /// A lexicographic space of `dimensions` axes.
    pub fn lexicographic(dimensions: usize, alphabet: Alphabet) -> Self {
        Self::new(vec![ElementKind::String; dimensions], alphabet)
    }

    /// Number of dimensions.
    pub fn dimensions(&self) -> usize {
        self.kinds.len()
    }

    /// The element kind of `dimension`.
    pub fn kind(&self, dimension: usize) -> ElementKind {
        self.kinds[dimension]
    }

    /// The alphabet of string dimensions.
    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    /// The dimension following `dimension`, wrapping around.
    ///
    /// Used to rotate split dimensions across successive joins and to pick
    /// the ordering axis of neighborhood verification.
    pub fn next_dimension(&self, dimension: usize) -> usize {
        (dimension + 1) % self.kinds.len()
    }

    fn lower_element(&self, dimension: usize) -> Element {
        match self.kinds[dimension] {
            ElementKind::Numeric => Element::Numeric(0.0),
            ElementKind::String => Element::Str(StrElement::from_digits(
                vec![self.alphabet.lower],
                self.alphabet,
            )),
        }
    }

    fn upper_element(&self, dimension: usize) -> Element {
        match self.kinds[dimension] {
            ElementKind::Numeric => Element::Numeric(1.0),
            ElementKind::String => Element::Str(StrElement::from_digits(
                vec![self.alphabet.upper],
                self.alphabet,
            )),
        }
    }
}

/// An axis-aligned hyper-rectangle of the coordinate space, owned by exactly
/// one peer at any instant.
///
/// A zone is delimited by a lower bound (inclusive) and an upper bound
/// (exclusive) coordinate. The zones of all live peers tile the full space
/// with no gaps and no overlaps, except transiently inside a maintenance
/// window guarded by mutual exclusion.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Zone {
    lower: Coordinate,
    upper: Coordinate,
}

impl Zone {
    /// Build a zone from its bounds.
    pub fn new(lower: Coordinate, upper: Coordinate) -> Self {
        debug_assert_eq!(lower.dimensions(), upper.dimensions());
        Self { lower, upper }
    }

    /// The zone covering the whole space described by `descriptor`.
    pub fn full(descriptor: &SpaceDescriptor) -> Self {
        let dims = descriptor.dimensions();
        let lower = Coordinate::new((0..dims).map(|d| descriptor.lower_element(d)).collect());
        let upper = Coordinate::new((0..dims).map(|d| descriptor.upper_element(d)).collect());
        Self::new(lower, upper)
    }

    /// Lower bound coordinate.
    pub fn lower_bound(&self) -> &Coordinate {
        &self.lower
    }

    /// Upper bound coordinate.
    pub fn upper_bound(&self) -> &Coordinate {
        &self.upper
    }

    /// Lower bound element on `dimension`.
    pub fn lower(&self, dimension: usize) -> &Element {
        self.lower.element(dimension)
    }

    /// Upper bound element on `dimension`.
    pub fn upper(&self, dimension: usize) -> &Element {
        self.upper.element(dimension)
    }

    /// Number of dimensions.
    pub fn dimensions(&self) -> usize {
        self.lower.dimensions()
    }

    /// Where `element` sits relative to this zone on `dimension`:
    /// `Ordering::Less` when below the lower bound, `Ordering::Greater` when
    /// at or above the upper bound, `Ordering::Equal` when contained.
    pub fn contains_on(&self, dimension: usize, element: &Element) -> Ordering {
        if element.compare(self.upper.element(dimension)) != Ordering::Less {
            Ordering::Greater
        } else if element.compare(self.lower.element(dimension)) == Ordering::Less {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    }

    /// True when `coordinate` lies inside the zone on every dimension.
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        (0..self.dimensions())
            .all(|d| self.contains_on(d, coordinate.element(d)) == Ordering::Equal)
    }

    /// True when `key` is matched by the zone. Unconstrained dimensions of
    /// the key match any extent.
    pub fn matches_key(&self, key: &Key) -> bool {
        (0..self.dimensions()).all(|d| match key.element(d) {
            Some(element) => self.contains_on(d, element) == Ordering::Equal,
            None => true,
        })
    }

    /// True when the zones' extents overlap on `dimension`.
    pub fn overlaps_on(&self, other: &Zone, dimension: usize) -> bool {
        let a = self.lower(dimension);
        let b = self.upper(dimension);
        let c = other.lower(dimension);
        let d = other.upper(dimension);

        (a.compare(c) != Ordering::Less && a.compare(d) == Ordering::Less)
            || (b.compare(c) == Ordering::Greater && b.compare(d) != Ordering::Greater)
            || (c.compare(a) != Ordering::Less && c.compare(b) == Ordering::Less)
            || (d.compare(a) == Ordering::Greater && d.compare(b) != Ordering::Greater)
    }

    /// True when the zones overlap on every dimension.
    pub fn overlaps(&self, other: &Zone) -> bool {
        (0..self.dimensions()).all(|d| self.overlaps_on(other, d))
    }

    /// True when `other` abuts this zone on `dimension`: `inferior` checks
    /// the side below the lower bound, otherwise the side at the upper bound.
    pub fn abuts(&self, other: &Zone, dimension: usize, inferior: bool) -> bool {
        if inferior {
            self.lower(dimension).compare(other.upper(dimension)) == Ordering::Equal
        } else {
            self.upper(dimension).compare(other.lower(dimension)) == Ordering::Equal
        }
    }

    /// The dimension on which `other` neighbors this zone, if any.
    ///
    /// In a d-dimensional space two zones are neighbors when their extents
    /// overlap on exactly `d - 1` dimensions and abut on the remaining one.
    pub fn neighbor_dimension(&self, other: &Zone) -> Option<usize> {
        let mut overlaps = 0;
        let mut abuts = 0;
        let mut abut_dimension = None;

        for d in 0..self.dimensions() {
            if self.overlaps_on(other, d) {
                overlaps += 1;
            } else if self.abuts(other, d, true) || self.abuts(other, d, false) {
                abut_dimension = Some(d);
                abuts += 1;
            } else {
                return None;
            }
        }

        if abuts == 1 && overlaps == self.dimensions() - 1 {
            abut_dimension
        } else {
            None
        }
    }

    /// The extent of the zone on `dimension`, projected onto `[0, 1)`.
    pub fn extent(&self, dimension: usize) -> f64 {
        self.upper(dimension).to_fraction() - self.lower(dimension).to_fraction()
    }

    /// The measure of the zone: the product of its per-dimension extents.
    pub fn area(&self) -> f64 {
        (0..self.dimensions()).map(|d| self.extent(d)).product()
    }

    /// Geometric distance from `coordinate` to the nearest point of the
    /// zone. Zero when the coordinate is contained.
    pub fn distance_to(&self, coordinate: &Coordinate) -> f64 {
        let mut sum = 0.0;
        for d in 0..self.dimensions() {
            let e = coordinate.element(d);
            let gap = match self.contains_on(d, e) {
                Ordering::Less => self.lower(d).distance(e),
                Ordering::Greater => self.upper(d).distance(e),
                Ordering::Equal => 0.0,
            };
            sum += gap * gap;
        }
        sum.sqrt()
    }

    /// Split the zone in two on `dimension` at the midpoint of its extent.
    ///
    /// The returned pair tiles the original zone exactly and
    /// `a.merge(&b)` recreates it. Splitting a degenerate extent fails.
    pub fn split(&self, dimension: usize) -> ZoneResult<(Zone, Zone)> {
        let lower = self.lower(dimension);
        let upper = self.upper(dimension);
        let middle = lower.middle(upper)?;

        if lower.compare(upper) != Ordering::Less
            || middle.compare(lower) == Ordering::Equal
            || middle.compare(upper) == Ordering::Equal
        {
            return Err(ZoneError::InvalidSplit {
                zone: self.to_string(),
                dimension,
            });
        }

        let first = Zone::new(
            self.lower.clone(),
            self.upper.clone().with_element(dimension, middle.clone()),
        );
        let second = Zone::new(
            self.lower.clone().with_element(dimension, middle),
            self.upper.clone(),
        );
        Ok((first, second))
    }

    /// True when merging with `other` along `dimension` yields a zone whose
    /// measure equals the sum of both, i.e. the zones are siblings of a
    /// prior split on that dimension.
    pub fn can_merge_with(&self, other: &Zone, dimension: usize) -> bool {
        if self.neighbor_dimension(other) != Some(dimension) {
            return false;
        }
        let merged_extent = Element::max(self.upper(dimension), other.upper(dimension))
            .to_fraction()
            - Element::min(self.lower(dimension), other.lower(dimension)).to_fraction();
        let merged: f64 = (0..self.dimensions())
            .map(|d| {
                if d == dimension {
                    merged_extent
                } else {
                    self.extent(d)
                }
            })
            .product();
        (merged - (self.area() + other.area())).abs() < 1e-9
    }

    /// Merge with a sibling zone, recreating the zone they were split from.
    pub fn merge(&self, other: &Zone) -> ZoneResult<Zone> {
        let dimension = self
            .neighbor_dimension(other)
            .filter(|&d| self.can_merge_with(other, d))
            .ok_or_else(|| ZoneError::InvalidMerge {
                a: self.to_string(),
                b: other.to_string(),
            })?;

        let lower = Element::min(self.lower(dimension), other.lower(dimension)).clone();
        let upper = Element::max(self.upper(dimension), other.upper(dimension)).clone();
        Ok(Zone::new(
            self.lower.clone().with_element(dimension, lower),
            self.upper.clone().with_element(dimension, upper),
        ))
    }
}

impl std::fmt::Display for Zone {
    // The dump format used by operational tooling: "lower to upper".
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.lower, self.upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn unit_square() -> Zone {
        Zone::full(&SpaceDescriptor::numeric(2))
    }

    fn point(x: f64, y: f64) -> Coordinate {
        Coordinate::new(vec![Element::Numeric(x), Element::Numeric(y)])
    }

    #[test]
    fn full_zone_contains_interior_points() {
        let z = unit_square();
        assert!(z.contains(&point(0.0, 0.0)));
        assert!(z.contains(&point(0.5, 0.99)));
        assert!(!z.contains(&point(1.0, 0.5)));
        assert!(!z.contains(&point(-0.1, 0.5)));
    }

    #[test]
    fn split_then_merge_is_identity() {
        let z = unit_square();
        for d in 0..2 {
            let (a, b) = z.split(d).unwrap();
            assert_eq!(a.merge(&b).unwrap(), z);
            assert_eq!(b.merge(&a).unwrap(), z);
        }
    }

    #[test]
    fn split_partitions_space() {
        let (a, b) = unit_square().split(0).unwrap();
        assert!(a.contains(&point(0.25, 0.5)));
        assert!(!a.contains(&point(0.75, 0.5)));
        assert!(b.contains(&point(0.75, 0.5)));
        // The boundary point belongs to exactly one side.
        assert!(!a.contains(&point(0.5, 0.5)));
        assert!(b.contains(&point(0.5, 0.5)));
    }

    #[test]
    fn degenerate_split_rejected() {
        let z = Zone::new(point(0.3, 0.0), point(0.3, 1.0));
        assert!(matches!(
            z.split(0),
            Err(ZoneError::InvalidSplit { dimension: 0, .. })
        ));
    }

    #[test]
    fn siblings_neighbor_on_split_dimension() {
        let (a, b) = unit_square().split(1).unwrap();
        assert_eq!(a.neighbor_dimension(&b), Some(1));
        assert_eq!(b.neighbor_dimension(&a), Some(1));
    }

    #[test]
    fn quadrants_neighbor_correctly() {
        let (left, right) = unit_square().split(0).unwrap();
        let (ll, ul) = left.split(1).unwrap();
        let (lr, ur) = right.split(1).unwrap();

        assert_eq!(ll.neighbor_dimension(&lr), Some(0));
        assert_eq!(ll.neighbor_dimension(&ul), Some(1));
        // Diagonal quadrants only touch at a corner and are not neighbors.
        assert_eq!(ll.neighbor_dimension(&ur), None);
    }

    #[test]
    fn non_sibling_merge_rejected() {
        let (left, right) = unit_square().split(0).unwrap();
        let (ll, _ul) = left.split(1).unwrap();
        // Half zone and quarter zone abut but have different extents.
        assert!(ll.merge(&right).is_err());
    }

    #[test]
    fn area_is_preserved_by_split() {
        let z = unit_square();
        let (a, b) = z.split(0).unwrap();
        assert!((a.area() + b.area() - z.area()).abs() < 1e-12);
    }

    #[test]
    fn distance_is_zero_inside() {
        let (a, _) = unit_square().split(0).unwrap();
        assert_eq!(a.distance_to(&point(0.1, 0.1)), 0.0);
        assert!(a.distance_to(&point(0.75, 0.1)) > 0.2);
    }

    #[test]
    fn lexicographic_zone_split() {
        let space = SpaceDescriptor::lexicographic(1, Alphabet::default());
        let z = Zone::full(&space);
        let (a, b) = z.split(0).unwrap();
        assert_eq!(a.merge(&b).unwrap(), z);
        assert!(a.upper(0).compare(b.lower(0)) == Ordering::Equal);
    }

    #[test]
    fn wildcard_key_matches_everywhere() {
        let (a, b) = unit_square().split(0).unwrap();
        let key = Key::wildcard(2);
        assert!(a.matches_key(&key));
        assert!(b.matches_key(&key));

        let constrained = key.with_element(0, Element::Numeric(0.75));
        assert!(!a.matches_key(&constrained));
        assert!(b.matches_key(&constrained));
    }
}
