//! Construction and interpretation of DIMSE command sets
//! for the Query/Retrieve services.
//!
//! Command sets are always encoded in Implicit VR Little Endian,
//! regardless of the transfer syntax negotiated for data sets,
//! and open with a group length element
//! covering the remaining command group bytes.
use crate::status::Status;
use dimse_core::{encode_dataset, read_dataset, tags, DataElement, Dataset, TransferSyntax, VR};
use snafu::{Backtrace, OptionExt, ResultExt, Snafu};

/// C-FIND-RQ command field value
pub(crate) const C_FIND_RQ: u16 = 0x0020;
/// C-MOVE-RQ command field value
pub(crate) const C_MOVE_RQ: u16 = 0x0021;
/// C-CANCEL-RQ command field value
pub(crate) const C_CANCEL_RQ: u16 = 0x0FFF;

/// Command data set type value for "data set present"
pub(crate) const DATA_SET_PRESENT: u16 = 0x0001;
/// Command data set type value for "no data set"
pub(crate) const DATA_SET_ABSENT: u16 = 0x0101;

/// The priority of a Query/Retrieve request.
#[repr(u16)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Priority {
    Low = 0x0002,
    Medium = 0x0000,
    High = 0x0001,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// failed to decode command set
    DecodeCommand {
        #[snafu(backtrace)]
        source: dimse_core::decode::Error,
    },

    /// failed to encode command set
    EncodeCommand {
        #[snafu(backtrace)]
        source: dimse_core::encode::Error,
    },

    #[snafu(display("command set is missing element {}", name))]
    MissingCommandField {
        name: &'static str,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Build a C-FIND-RQ command set.
/// The query keys themselves travel in the accompanying data set.
pub(crate) fn find_rq(
    abstract_syntax: &str,
    message_id: u16,
    priority: Priority,
) -> Dataset {
    Dataset::from_element_iter(vec![
        DataElement::new(tags::AFFECTED_SOP_CLASS_UID, VR::UI, abstract_syntax),
        DataElement::new(tags::COMMAND_FIELD, VR::US, C_FIND_RQ),
        DataElement::new(tags::MESSAGE_ID, VR::US, message_id),
        DataElement::new(tags::PRIORITY, VR::US, priority as u16),
        DataElement::new(tags::COMMAND_DATA_SET_TYPE, VR::US, DATA_SET_PRESENT),
    ])
}

/// Build a C-MOVE-RQ command set.
/// The destination AE title is a routing field of the command set,
/// kept apart from the query keys.
pub(crate) fn move_rq(
    abstract_syntax: &str,
    message_id: u16,
    destination_ae: &str,
    priority: Priority,
) -> Dataset {
    Dataset::from_element_iter(vec![
        DataElement::new(tags::AFFECTED_SOP_CLASS_UID, VR::UI, abstract_syntax),
        DataElement::new(tags::COMMAND_FIELD, VR::US, C_MOVE_RQ),
        DataElement::new(tags::MESSAGE_ID, VR::US, message_id),
        DataElement::new(tags::PRIORITY, VR::US, priority as u16),
        DataElement::new(tags::COMMAND_DATA_SET_TYPE, VR::US, DATA_SET_PRESENT),
        DataElement::new(tags::MOVE_DESTINATION, VR::AE, destination_ae),
    ])
}

/// Build a C-CANCEL-RQ command set
/// referencing the message identifier of the operation to cancel.
pub(crate) fn cancel_rq(message_id: u16) -> Dataset {
    Dataset::from_element_iter(vec![
        DataElement::new(tags::COMMAND_FIELD, VR::US, C_CANCEL_RQ),
        DataElement::new(tags::MESSAGE_ID_BEING_RESPONDED_TO, VR::US, message_id),
        DataElement::new(tags::COMMAND_DATA_SET_TYPE, VR::US, DATA_SET_ABSENT),
    ])
}

/// Encode a command set in Implicit VR Little Endian,
/// prefixed with the command group length element (0000,0000).
pub(crate) fn encode_command(command: &Dataset) -> Result<Vec<u8>> {
    let body =
        encode_dataset(command, TransferSyntax::ImplicitVrLittleEndian).context(EncodeCommandSnafu)?;

    let mut group_length = Dataset::new();
    group_length.put(DataElement::new(
        tags::COMMAND_GROUP_LENGTH,
        VR::UL,
        body.len() as u32,
    ));
    let mut out = encode_dataset(&group_length, TransferSyntax::ImplicitVrLittleEndian)
        .context(EncodeCommandSnafu)?;
    out.extend_from_slice(&body);
    Ok(out)
}

/// A response command set,
/// decoded and reduced to the fields
/// which drive response routing and stream termination.
#[derive(Debug, Clone)]
pub(crate) struct ResponseCommand {
    /// the message ID being responded to (0000,0120)
    pub message_id: u16,
    /// the classified response status
    pub status: Status,
    /// whether a data set accompanies this response message
    pub has_dataset: bool,
    /// the full command set, for consumer inspection
    pub fields: Dataset,
}

impl ResponseCommand {
    /// Decode a reassembled command set.
    pub fn from_bytes(data: &[u8]) -> Result<ResponseCommand> {
        let fields = read_dataset(data, TransferSyntax::ImplicitVrLittleEndian)
            .context(DecodeCommandSnafu)?;

        let message_id = fields
            .get(tags::MESSAGE_ID_BEING_RESPONDED_TO)
            .and_then(|e| e.uint16())
            .context(MissingCommandFieldSnafu {
                name: "Message ID Being Responded To",
            })?;
        let status = fields
            .get(tags::STATUS)
            .and_then(|e| e.uint16())
            .map(Status::from_code)
            .context(MissingCommandFieldSnafu { name: "Status" })?;
        let has_dataset = fields
            .get(tags::COMMAND_DATA_SET_TYPE)
            .and_then(|e| e.uint16())
            .map(|v| v != DATA_SET_ABSENT)
            // a missing data set type is treated as "no data set"
            .unwrap_or(false);

        Ok(ResponseCommand {
            message_id,
            status,
            has_dataset,
            fields,
        })
    }
}
