//! This crate contains the types and methods needed to interact
//! with DICOM nodes through the upper layer protocol.
//!
//! - The [`address`] module
//!   provides an abstraction for working with compound addresses
//!   referring to application entities in a network.
//! - The [`pdu`] module
//!   provides data structures representing _protocol data units_,
//!   with a resumable decoder and a writer
//!   for arbitrary octet streams.
//! - The [`association`] module
//!   comprises abstractions for establishing and negotiating associations
//!   between application entities,
//!   with an observable lifecycle state machine.
pub mod address;
pub mod association;
pub mod pdu;

/// The implementation class UID of this stack,
/// sent during association negotiation.
///
/// Generated as per the standard, part 5, section B.2.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.168505924925102185633344049626723434037";

/// The implementation version name of this stack,
/// sent during association negotiation.
pub const IMPLEMENTATION_VERSION_NAME: &str = "dimse-rs 0.1.0";

// re-exports

pub use address::{AeAddr, FullAeAddr};
pub use association::client::{ClientAssociation, ClientAssociationOptions};
pub use association::{AssociationState, PresentationContext, StateMonitor};
pub use pdu::{decode_pdu, read_pdu, write_pdu, Pdu};
