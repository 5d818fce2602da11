//! Per-dimension coordinate values.

use std::cmp::Ordering;

use crate::{ZoneError, ZoneResult};

/// The kind of values carried by one dimension of the coordinate space.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, serde::Serialize, serde::Deserialize,
)]
pub enum ElementKind {
    /// Real-valued axis, ordered numerically.
    #[display(fmt = "numeric")]
    Numeric,
    /// String axis, ordered lexicographically over an [`Alphabet`].
    #[display(fmt = "string")]
    String,
}

/// Inclusive code point range over which string elements are defined.
///
/// String elements are treated as fractional numbers written in base
/// `upper - lower + 1`, one digit per code point. The alphabet is a
/// network-wide constant carried by the space descriptor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Alphabet {
    /// Lowest code point of the range.
    pub lower: u32,
    /// Highest code point of the range.
    pub upper: u32,
}

impl Default for Alphabet {
    fn default() -> Self {
        // Basic multilingual plane, the same range the original overlay
        // networks were deployed with.
        Self {
            lower: 0,
            upper: 0xFFFF,
        }
    }
}

impl Alphabet {
    /// Number of distinct digits, i.e. the radix of string arithmetic.
    pub fn radix(&self) -> u64 {
        (self.upper - self.lower) as u64 + 1
    }

    /// The code point sitting in the middle of the range.
    pub fn middle_code_point(&self) -> u32 {
        self.lower + (self.upper - self.lower) / 2
    }
}

/// A string element: a sequence of code point digits within an [`Alphabet`].
///
/// Ordering is lexicographic on the digit sequence. Midpoint computation
/// interprets the digits as a fraction in base `alphabet.radix()` and extends
/// the fraction as needed, so repeated splits never lose precision.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct StrElement {
    digits: Vec<u32>,
    alphabet: Alphabet,
}

impl StrElement {
    /// Build an element from a string, clamping code points to the alphabet.
    pub fn new(value: &str, alphabet: Alphabet) -> Self {
        let digits = value
            .chars()
            .map(|c| (c as u32).clamp(alphabet.lower, alphabet.upper))
            .collect();
        Self { digits, alphabet }
    }

    /// Build an element from raw code point digits.
    pub fn from_digits(digits: Vec<u32>, alphabet: Alphabet) -> Self {
        Self { digits, alphabet }
    }

    /// The code point digits of this element.
    pub fn digits(&self) -> &[u32] {
        &self.digits
    }

    /// The alphabet this element is defined over.
    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    /// Lossy printable rendering, used by zone dumps.
    pub fn display(&self) -> String {
        self.digits
            .iter()
            .map(|&cp| char::from_u32(cp).filter(|c| !c.is_control()).unwrap_or('?'))
            .collect()
    }

    /// Interpret the digit sequence as a fraction in `[0, 1)`.
    ///
    /// Only the leading digits contribute measurably, which is enough for
    /// distance estimation and area computation.
    pub fn to_fraction(&self) -> f64 {
        let radix = self.alphabet.radix() as f64;
        let mut value = 0.0;
        let mut scale = radix;
        for &cp in self.digits.iter().take(16) {
            value += (cp - self.alphabet.lower) as f64 / scale;
            scale *= radix;
        }
        value
    }

    /// The midpoint of `self` and `other` in digit arithmetic: `(a + b) / 2`
    /// computed in base `radix`, appending one digit when the division leaves
    /// a remainder.
    pub fn middle(&self, other: &Self) -> Self {
        let radix = self.alphabet.radix();
        let len = self.digits.len().max(other.digits.len());
        let digit = |e: &Self, i: usize| -> u64 {
            e.digits
                .get(i)
                .map(|&cp| (cp - self.alphabet.lower) as u64)
                .unwrap_or(0)
        };

        // a + b over the fractional digits, least significant digit first.
        // The final carry is the integer part of the sum.
        let mut sum = vec![0u64; len];
        let mut carry = 0u64;
        for i in (0..len).rev() {
            let s = digit(self, i) + digit(other, i) + carry;
            sum[i] = s % radix;
            carry = s / radix;
        }

        // (a + b) / 2, propagating the remainder downward from the integer
        // part.
        let mut remainder = carry;
        let mut out = Vec::with_capacity(len + 1);
        for &d in &sum {
            let cur = remainder * radix + d;
            out.push(cur / 2);
            remainder = cur % 2;
        }
        if remainder == 1 {
            out.push(radix / 2);
        }
        while out.len() > 1 && out.last() == Some(&0) {
            out.pop();
        }

        let digits = out
            .into_iter()
            .map(|d| self.alphabet.lower + d as u32)
            .collect();
        Self {
            digits,
            alphabet: self.alphabet,
        }
    }
}

/// One value of a coordinate, matching the [`ElementKind`] of its dimension.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Element {
    /// Numeric value.
    Numeric(f64),
    /// String value.
    Str(StrElement),
}

impl Element {
    /// The kind of this element.
    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Numeric(_) => ElementKind::Numeric,
            Element::Str(_) => ElementKind::String,
        }
    }

    /// Total order over same-kind elements. Numeric ordering uses the IEEE
    /// total order, string ordering is lexicographic.
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Element::Numeric(a), Element::Numeric(b)) => a.total_cmp(b),
            (Element::Str(a), Element::Str(b)) => a.cmp(b),
            // Kinds never mix within one overlay; order them arbitrarily so
            // the comparison stays total.
            (Element::Numeric(_), Element::Str(_)) => Ordering::Less,
            (Element::Str(_), Element::Numeric(_)) => Ordering::Greater,
        }
    }

    /// The midpoint between `self` and `other`.
    pub fn middle(&self, other: &Self) -> ZoneResult<Element> {
        match (self, other) {
            (Element::Numeric(a), Element::Numeric(b)) => Ok(Element::Numeric((a + b) / 2.0)),
            (Element::Str(a), Element::Str(b)) => Ok(Element::Str(a.middle(b))),
            _ => Err(ZoneError::KindMismatch(self.kind(), other.kind())),
        }
    }

    /// The smaller of two elements.
    pub fn min<'a>(a: &'a Element, b: &'a Element) -> &'a Element {
        if a.compare(b) == Ordering::Greater {
            b
        } else {
            a
        }
    }

    /// The larger of two elements.
    pub fn max<'a>(a: &'a Element, b: &'a Element) -> &'a Element {
        if a.compare(b) == Ordering::Less {
            b
        } else {
            a
        }
    }

    /// Project the element onto `[0, 1)` for distance and area computation.
    pub fn to_fraction(&self) -> f64 {
        match self {
            Element::Numeric(v) => *v,
            Element::Str(s) => s.to_fraction(),
        }
    }

    /// Absolute distance between two same-kind elements on their axis.
    pub fn distance(&self, other: &Self) -> f64 {
        (self.to_fraction() - other.to_fraction()).abs()
    }

    /// True when `self` lies in `[lower, upper)`.
    pub fn is_between(&self, lower: &Element, upper: &Element) -> bool {
        self.compare(lower) != Ordering::Less && self.compare(upper) == Ordering::Less
    }
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Element::Numeric(v) => write!(f, "{v}"),
            Element::Str(s) => write!(f, "{}", s.display()),
        }
    }
}
