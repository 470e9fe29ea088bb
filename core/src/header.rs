//! Basic types for interpreting DICOM data elements:
//! the attribute tag and the value representation code.
use std::cmp::Ordering;
use std::fmt;
use std::str::from_utf8;

/// Idiomatic alias for a tag's group number.
pub type GroupNumber = u16;
/// Idiomatic alias for a tag's element number.
pub type ElementNumber = u16;

/// The data type for DICOM data element tags.
///
/// Tags are orderable by the numeric value of
/// the group number, then the element number,
/// which is the order in which they are laid out in a data set.
///
/// # Example
///
/// ```
/// # use dimse_core::Tag;
/// let tag = Tag(0x0010, 0x0010);
/// assert_eq!(tag.group(), 0x0010);
/// assert_eq!(tag.to_string(), "(0010,0010)");
/// ```
#[derive(PartialEq, Eq, Hash, Clone, Copy)]
pub struct Tag(pub GroupNumber, pub ElementNumber);

impl Tag {
    /// Getter for the tag's group value.
    #[inline]
    pub fn group(self) -> GroupNumber {
        self.0
    }

    /// Getter for the tag's element value.
    #[inline]
    pub fn element(self) -> ElementNumber {
        self.1
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag(0x{:04X}, 0x{:04X})", self.0, self.1)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.0, self.1).cmp(&(other.0, other.1))
    }
}

impl From<(u16, u16)> for Tag {
    #[inline]
    fn from((g, e): (u16, u16)) -> Tag {
        Tag(g, e)
    }
}

/// An enum type for a data element's value representation.
///
/// This is the subset of value representations
/// which can occur in Query/Retrieve request and response data sets,
/// plus `UN` for elements of an unknown dictionary entry.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum VR {
    /// Application Entity
    AE,
    /// Age String
    AS,
    /// Code String
    CS,
    /// Date
    DA,
    /// Date Time
    DT,
    /// Integer String
    IS,
    /// Long String
    LO,
    /// Person Name
    PN,
    /// Short String
    SH,
    /// Sequence of Items
    SQ,
    /// Short Text
    ST,
    /// Time
    TM,
    /// Unique Identifier
    UI,
    /// Unsigned Long
    UL,
    /// Unknown
    UN,
    /// Unsigned Short
    US,
}

impl VR {
    /// Obtain the value representation corresponding to the given two bytes.
    /// Each byte should represent an alphabetic character in upper case.
    pub fn from_binary(chars: [u8; 2]) -> Option<Self> {
        from_utf8(&chars).ok().and_then(|s| match s {
            "AE" => Some(VR::AE),
            "AS" => Some(VR::AS),
            "CS" => Some(VR::CS),
            "DA" => Some(VR::DA),
            "DT" => Some(VR::DT),
            "IS" => Some(VR::IS),
            "LO" => Some(VR::LO),
            "PN" => Some(VR::PN),
            "SH" => Some(VR::SH),
            "SQ" => Some(VR::SQ),
            "ST" => Some(VR::ST),
            "TM" => Some(VR::TM),
            "UI" => Some(VR::UI),
            "UL" => Some(VR::UL),
            "UN" => Some(VR::UN),
            "US" => Some(VR::US),
            _ => None,
        })
    }

    /// Retrieve a string representation of this VR.
    pub fn to_string(self) -> &'static str {
        match self {
            VR::AE => "AE",
            VR::AS => "AS",
            VR::CS => "CS",
            VR::DA => "DA",
            VR::DT => "DT",
            VR::IS => "IS",
            VR::LO => "LO",
            VR::PN => "PN",
            VR::SH => "SH",
            VR::SQ => "SQ",
            VR::ST => "ST",
            VR::TM => "TM",
            VR::UI => "UI",
            VR::UL => "UL",
            VR::UN => "UN",
            VR::US => "US",
        }
    }

    /// Retrieve a copy of this VR's byte representation.
    /// The function returns two alphabetic characters in upper case.
    pub fn to_bytes(self) -> [u8; 2] {
        let bytes = self.to_string().as_bytes();
        [bytes[0], bytes[1]]
    }

    /// Whether the explicit VR encoding of this representation
    /// uses the long form header
    /// (2 reserved bytes followed by a 32-bit length).
    pub fn has_long_header(self) -> bool {
        matches!(self, VR::SQ | VR::UN)
    }
}

impl fmt::Display for VR {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(VR::to_string(*self))
    }
}
