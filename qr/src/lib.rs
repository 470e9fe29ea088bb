//! DICOM Query/Retrieve service layer.
//!
//! This crate drives C-FIND and C-MOVE operations
//! over an association established through [`dimse_ul`],
//! correlating streamed, multi-message responses
//! back to the originating request:
//!
//! - the [`client`] module provides the [`QueryRetrieveClient`],
//!   built from an explicit [`QueryRetrieveOptions`] value,
//!   and the lazy [`ResponseStream`] yielded by each operation;
//! - the [`demux`] module multiplexes incoming messages
//!   from a dedicated per-association reader thread
//!   into bounded per-request response sinks;
//! - the [`query`] module offers typed builders
//!   for common request data sets.
//!
//! # Example
//!
//! ```no_run
//! use dimse_core::uids;
//! use dimse_qr::{query, QueryRetrieveOptions};
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = QueryRetrieveOptions::new()
//!     .calling_ae_title("QR-TOOL")
//!     .with_abstract_syntax(uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND)
//!     .connect_with("HOROS@192.168.1.99:2763")?;
//!
//! let query = query::study_query(
//!     "BEETHOVEN^LUDWIG^VAN",
//!     "17700101",
//!     "CR",
//!     "20200101-20200601",
//! );
//! for response in client.find(query)? {
//!     let response = response?;
//!     if let Some(dataset) = response.dataset() {
//!         println!("match: {:?}", dataset);
//!     }
//! }
//! client.release()?;
//! # Ok(())
//! # }
//! ```
pub mod client;
pub mod command;
pub mod demux;
pub mod query;
pub mod response;
pub mod status;

pub use client::{Error, QueryRetrieveClient, QueryRetrieveOptions, ResponseStream};
pub use command::Priority;
pub use demux::AbortReason;
pub use response::Response;
pub use status::Status;
