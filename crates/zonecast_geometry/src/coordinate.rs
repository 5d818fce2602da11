//! Points and routing keys of the coordinate space.

use crate::element::Element;
use crate::{ZoneError, ZoneResult};

/// A point in the coordinate space: one [`Element`] per dimension.
///
/// All coordinates of one overlay instance share the same dimensionality and
/// per-dimension element kind.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Coordinate(Vec<Element>);

impl Coordinate {
    /// Build a coordinate from its per-dimension elements.
    pub fn new(elements: Vec<Element>) -> Self {
        Self(elements)
    }

    /// Number of dimensions.
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// The element on `dimension`.
    pub fn element(&self, dimension: usize) -> &Element {
        &self.0[dimension]
    }

    /// Replace the element on `dimension`, returning the updated coordinate.
    pub fn with_element(mut self, dimension: usize, element: Element) -> Self {
        self.0[dimension] = element;
        self
    }

    /// Iterate over the elements in dimension order.
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.0.iter()
    }

    /// Fail unless the coordinate has the expected dimensionality.
    pub fn check_dimensions(&self, expected: usize) -> ZoneResult<()> {
        if self.0.len() == expected {
            Ok(())
        } else {
            Err(ZoneError::DimensionMismatch {
                expected,
                actual: self.0.len(),
            })
        }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{e}")?;
        }
        write!(f, ")")
    }
}

/// A routing key: a coordinate whose dimensions may be left unconstrained.
///
/// A `None` element matches every zone on that dimension. Fully constrained
/// keys address exactly one zone; keys with wildcards address a slice of the
/// space and are used by anycast and multicast requests.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Key(Vec<Option<Element>>);

impl Key {
    /// Build a key from optional per-dimension elements.
    pub fn new(elements: Vec<Option<Element>>) -> Self {
        Self(elements)
    }

    /// A key constraining every dimension of `coordinate`.
    pub fn from_coordinate(coordinate: &Coordinate) -> Self {
        Self(coordinate.iter().cloned().map(Some).collect())
    }

    /// A key leaving all `dimensions` unconstrained.
    pub fn wildcard(dimensions: usize) -> Self {
        Self(vec![None; dimensions])
    }

    /// Number of dimensions.
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// The constraint on `dimension`, if any.
    pub fn element(&self, dimension: usize) -> Option<&Element> {
        self.0[dimension].as_ref()
    }

    /// Constrain `dimension` to `element`, returning the updated key.
    pub fn with_element(mut self, dimension: usize, element: Element) -> Self {
        self.0[dimension] = Some(element);
        self
    }

    /// True when no dimension is constrained.
    pub fn is_fully_wildcard(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

impl From<Coordinate> for Key {
    fn from(coordinate: Coordinate) -> Self {
        Self::from_coordinate(&coordinate)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            match e {
                Some(e) => write!(f, "{e}")?,
                None => write!(f, "*")?,
            }
        }
        write!(f, ")")
    }
}
