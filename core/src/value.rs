//! Primitive value module.
//!
//! A primitive value is the leaf payload of a data element:
//! one or more scalars of the same kind,
//! without any nested data sets.
use smallvec::SmallVec;
use std::borrow::Cow;
use std::convert::TryFrom;
use std::fmt;

/// Base multiplicity-aware container for primitive values.
pub type C<T> = SmallVec<[T; 2]>;

/// An enum representing a primitive value
/// with one or more possible scalars as its value.
///
/// Text-like values (names, dates, times, code strings, UIDs)
/// are kept in their string form,
/// since the Query/Retrieve layer transports them opaquely.
/// Binary integers cover the `US` and `UL` representations
/// used by command set elements.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    /// No value. Used for zero-length elements, such as universal matching keys.
    Empty,
    /// A sequence of strings.
    Strs(C<String>),
    /// A sequence of unsigned 16-bit integers.
    U16(C<u16>),
    /// A sequence of unsigned 32-bit integers.
    U32(C<u32>),
    /// An opaque sequence of bytes, for elements of an unknown representation.
    U8(C<u8>),
}

impl PrimitiveValue {
    /// The number of individual values in this primitive value.
    pub fn multiplicity(&self) -> usize {
        match self {
            PrimitiveValue::Empty => 0,
            PrimitiveValue::Strs(v) => v.len(),
            PrimitiveValue::U16(v) => v.len(),
            PrimitiveValue::U32(v) => v.len(),
            PrimitiveValue::U8(v) => v.len(),
        }
    }

    /// Whether this value holds no scalars at all.
    pub fn is_empty(&self) -> bool {
        self.multiplicity() == 0
    }

    /// Convert the value to a string,
    /// joining multiple values with the standard `\` separator.
    pub fn to_str(&self) -> Cow<'_, str> {
        match self {
            PrimitiveValue::Empty => Cow::from(""),
            PrimitiveValue::Strs(v) if v.len() == 1 => Cow::from(v[0].as_str()),
            PrimitiveValue::Strs(v) => Cow::from(v.join("\\")),
            PrimitiveValue::U16(v) => Cow::from(
                v.iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join("\\"),
            ),
            PrimitiveValue::U32(v) => Cow::from(
                v.iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join("\\"),
            ),
            PrimitiveValue::U8(v) => Cow::from(format!("{:02X?}", &v[..])),
        }
    }

    /// Retrieve the first value as an unsigned 16-bit integer,
    /// if applicable.
    pub fn to_u16(&self) -> Option<u16> {
        match self {
            PrimitiveValue::U16(v) => v.first().copied(),
            PrimitiveValue::U32(v) => v.first().and_then(|&n| u16::try_from(n).ok()),
            PrimitiveValue::Strs(v) => v.first().and_then(|s| s.trim().parse().ok()),
            _ => None,
        }
    }

    /// Retrieve the first value as an unsigned 32-bit integer,
    /// if applicable.
    pub fn to_u32(&self) -> Option<u32> {
        match self {
            PrimitiveValue::U32(v) => v.first().copied(),
            PrimitiveValue::U16(v) => v.first().map(|&n| u32::from(n)),
            PrimitiveValue::Strs(v) => v.first().and_then(|s| s.trim().parse().ok()),
            _ => None,
        }
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str())
    }
}

impl From<&str> for PrimitiveValue {
    fn from(value: &str) -> Self {
        PrimitiveValue::Strs(smallvec::smallvec![value.to_string()])
    }
}

impl From<String> for PrimitiveValue {
    fn from(value: String) -> Self {
        PrimitiveValue::Strs(smallvec::smallvec![value])
    }
}

impl From<Vec<String>> for PrimitiveValue {
    fn from(values: Vec<String>) -> Self {
        PrimitiveValue::Strs(values.into())
    }
}

impl From<u16> for PrimitiveValue {
    fn from(value: u16) -> Self {
        PrimitiveValue::U16(smallvec::smallvec![value])
    }
}

impl From<u32> for PrimitiveValue {
    fn from(value: u32) -> Self {
        PrimitiveValue::U32(smallvec::smallvec![value])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn multiplicity_and_emptiness() {
        assert_eq!(PrimitiveValue::Empty.multiplicity(), 0);
        assert!(PrimitiveValue::Empty.is_empty());
        let v = PrimitiveValue::Strs(smallvec!["CR".to_string(), "MR".to_string()]);
        assert_eq!(v.multiplicity(), 2);
        assert!(!v.is_empty());
    }

    #[test]
    fn to_str_joins_with_backslash() {
        let v = PrimitiveValue::Strs(smallvec!["CR".to_string(), "MR".to_string()]);
        assert_eq!(v.to_str(), "CR\\MR");
        let v = PrimitiveValue::from("BEETHOVEN^LUDWIG^VAN");
        assert_eq!(v.to_str(), "BEETHOVEN^LUDWIG^VAN");
    }

    #[test]
    fn integer_conversions() {
        assert_eq!(PrimitiveValue::from(0xFF00_u16).to_u16(), Some(0xFF00));
        assert_eq!(PrimitiveValue::from(2_u32).to_u16(), Some(2));
        assert_eq!(PrimitiveValue::from("5").to_u32(), Some(5));
        assert_eq!(PrimitiveValue::Empty.to_u16(), None);
    }
}
