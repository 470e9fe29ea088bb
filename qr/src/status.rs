//! Interpretation of the status codes
//! carried in DIMSE response command sets (tag (0000,0900)).
use std::fmt;

/// The classified status of one Query/Retrieve response.
///
/// A request yields zero or more responses with a [pending](Status::Pending)
/// status, followed by exactly one terminal response:
/// [success](Status::Success), [cancel](Status::Cancel),
/// [warning](Status::Warning), or [failure](Status::Failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The operation completed (0000H).
    Success,
    /// More responses are forthcoming (FF00H or FF01H).
    Pending(u16),
    /// The operation was cancelled upon request (FE00H).
    Cancel,
    /// The operation completed with warnings (Bxxx H).
    Warning(u16),
    /// The operation failed (any other non-zero code).
    Failure(u16),
}

impl Status {
    /// Classify a raw status code.
    pub fn from_code(code: u16) -> Status {
        match code {
            0x0000 => Status::Success,
            0xFF00 | 0xFF01 => Status::Pending(code),
            0xFE00 => Status::Cancel,
            0xB000..=0xBFFF => Status::Warning(code),
            _ => Status::Failure(code),
        }
    }

    /// Retrieve the raw status code.
    pub fn code(self) -> u16 {
        match self {
            Status::Success => 0x0000,
            Status::Pending(code) => code,
            Status::Cancel => 0xFE00,
            Status::Warning(code) => code,
            Status::Failure(code) => code,
        }
    }

    /// Whether more responses are to be expected after this one.
    pub fn is_pending(self) -> bool {
        matches!(self, Status::Pending(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => f.write_str("Success"),
            Status::Pending(code) => write!(f, "Pending ({:04X}H)", code),
            Status::Cancel => f.write_str("Cancel"),
            Status::Warning(code) => write!(f, "Warning ({:04X}H)", code),
            Status::Failure(code) => write!(f, "Failure ({:04X}H)", code),
        }
    }
}
