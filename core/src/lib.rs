//! This crate contains the data set model
//! used by the DICOM Query/Retrieve message layer:
//! attribute tags, value representations, primitive values,
//! data elements, and ordered data sets with nested sequences.
//! It also provides encoding and decoding of data sets
//! under the two baseline little endian transfer syntaxes.
//!
//! - The [`dataset`] module provides the [`Dataset`] type,
//!   an ordered tag-to-element mapping
//!   which is the unit of data exchanged in every DICOM message.
//! - The [`encode`] and [`decode`] modules serialize data sets
//!   according to the data structure encoding rules of the standard.
//! - The [`tags`] and [`uids`] modules hold the dictionary subset
//!   consumed by the Query/Retrieve services.
pub mod dataset;
pub mod decode;
pub mod encode;
pub mod header;
pub mod tags;
pub mod transfer_syntax;
pub mod uids;
pub mod value;

pub use dataset::{DataElement, Dataset, Value};
pub use decode::read_dataset;
pub use encode::{encode_dataset, write_dataset};
pub use header::{Tag, VR};
pub use transfer_syntax::TransferSyntax;
pub use value::PrimitiveValue;
