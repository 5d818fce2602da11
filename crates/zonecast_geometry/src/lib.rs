#![deny(missing_docs)]
//! Geometric primitives for a content-addressable overlay network.
//!
//! The coordinate space is an N-dimensional hyper-rectangle. Every peer of the
//! overlay owns a [`Zone`] of that space and the zones of all live peers tile
//! the space exactly. Each dimension carries either numeric values or
//! lexicographically ordered strings, see [`Element`].

mod coordinate;
mod element;
mod zone;

pub use coordinate::{Coordinate, Key};
pub use element::{Alphabet, Element, ElementKind, StrElement};
pub use zone::{SpaceDescriptor, Zone};

/// Error type for zone geometry operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ZoneError {
    /// Splitting was requested on a dimension with a degenerate (zero-width)
    /// extent.
    #[error("cannot split zone {zone} on dimension {dimension}: degenerate extent")]
    InvalidSplit {
        /// Rendered zone bounds.
        zone: String,
        /// The dimension the split was attempted on.
        dimension: usize,
    },

    /// Merging was requested between two zones that are not siblings of a
    /// prior split.
    #[error("zones {a} and {b} are not mergeable")]
    InvalidMerge {
        /// Rendered bounds of the first zone.
        a: String,
        /// Rendered bounds of the second zone.
        b: String,
    },

    /// Two values of incompatible element kinds were combined.
    #[error("mismatched element kinds: {0} vs {1}")]
    KindMismatch(ElementKind, ElementKind),

    /// A coordinate of the wrong dimensionality was supplied.
    #[error("expected {expected} dimensions, got {actual}")]
    DimensionMismatch {
        /// Dimensions the space is configured with.
        expected: usize,
        /// Dimensions the offending coordinate carries.
        actual: usize,
    },
}

/// Result alias for geometry operations.
pub type ZoneResult<T> = Result<T, ZoneError>;
