//! Transfer syntax support.
//!
//! This stack encodes and decodes data sets
//! in the two baseline little endian transfer syntaxes only.
//! Big endian and compressed transfer syntaxes are rejected
//! at presentation context selection time.
use crate::uids;
use std::fmt;

/// A supported transfer syntax for data set encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferSyntax {
    /// Implicit VR Little Endian, the default transfer syntax.
    ImplicitVrLittleEndian,
    /// Explicit VR Little Endian.
    ExplicitVrLittleEndian,
}

impl TransferSyntax {
    /// Look up a supported transfer syntax by its unique identifier.
    ///
    /// Trailing null padding in the UID is ignored.
    /// Returns `None` if the UID does not name
    /// one of the two baseline little endian syntaxes.
    pub fn from_uid(uid: &str) -> Option<Self> {
        match uid.trim_end_matches('\0') {
            uids::IMPLICIT_VR_LITTLE_ENDIAN => Some(TransferSyntax::ImplicitVrLittleEndian),
            uids::EXPLICIT_VR_LITTLE_ENDIAN => Some(TransferSyntax::ExplicitVrLittleEndian),
            _ => None,
        }
    }

    /// Retrieve the unique identifier of this transfer syntax.
    pub fn uid(self) -> &'static str {
        match self {
            TransferSyntax::ImplicitVrLittleEndian => uids::IMPLICIT_VR_LITTLE_ENDIAN,
            TransferSyntax::ExplicitVrLittleEndian => uids::EXPLICIT_VR_LITTLE_ENDIAN,
        }
    }

    /// Retrieve the descriptive name of this transfer syntax.
    pub fn name(self) -> &'static str {
        match self {
            TransferSyntax::ImplicitVrLittleEndian => "Implicit VR Little Endian",
            TransferSyntax::ExplicitVrLittleEndian => "Explicit VR Little Endian",
        }
    }

    /// Whether data elements carry an explicit VR code on the wire.
    pub fn is_explicit_vr(self) -> bool {
        matches!(self, TransferSyntax::ExplicitVrLittleEndian)
    }
}

impl fmt::Display for TransferSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
