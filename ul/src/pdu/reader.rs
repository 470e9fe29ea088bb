//! PDU reader module
//!
//! The main entry points are [`decode_pdu`],
//! which decodes a PDU from a byte slice
//! and reports whether more data is needed,
//! and [`read_pdu`],
//! which reads a whole PDU from an arbitrary data source.
use crate::pdu::*;
use byteordered::byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};
use std::io::{Cursor, ErrorKind, Read, Seek, SeekFrom};

/// The default maximum PDU size
pub const DEFAULT_MAX_PDU: u32 = 16_384;

/// The minimum PDU size,
/// as specified by the standard
pub const MINIMUM_PDU_SIZE: u32 = 4_096;

/// The maximum PDU size,
/// as specified by the standard
pub const MAXIMUM_PDU_SIZE: u32 = 131_072;

/// The length of the PDU header in bytes,
/// comprising the PDU type (1 byte),
/// reserved byte (1 byte),
/// and PDU length (4 bytes).
pub const PDU_HEADER_SIZE: u32 = 6;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Invalid max PDU length {}", max_pdu_length))]
    InvalidMaxPdu {
        max_pdu_length: u32,
        backtrace: Backtrace,
    },

    #[snafu(display("No PDU available"))]
    NoPduAvailable { backtrace: Backtrace },

    #[snafu(display("Could not read PDU"))]
    ReadPdu {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Could not read PDU item"))]
    ReadPduItem {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Could not read PDU field `{}`", field))]
    ReadPduField {
        field: &'static str,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Invalid item length {} (must be >=2)", length))]
    InvalidItemLength { length: u32 },

    #[snafu(display("Could not read {} reserved bytes", bytes))]
    ReadReserved {
        bytes: u32,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "Incoming pdu was too large: length {}, maximum is {}",
        pdu_length,
        max_pdu_length
    ))]
    PduTooLarge {
        pdu_length: u32,
        max_pdu_length: u32,
        backtrace: Backtrace,
    },

    #[snafu(display("PDU contained an invalid value {:?}", var_item))]
    InvalidPduVariable {
        var_item: PduVariableItem,
        backtrace: Backtrace,
    },
    #[snafu(display("Multiple transfer syntaxes were accepted"))]
    MultipleTransferSyntaxesAccepted { backtrace: Backtrace },
    #[snafu(display("Invalid reject source or reason"))]
    InvalidRejectSourceOrReason { backtrace: Backtrace },
    #[snafu(display("Invalid abort service provider"))]
    InvalidAbortSourceOrReason { backtrace: Backtrace },
    #[snafu(display("Invalid presentation context result reason"))]
    InvalidPresentationContextResultReason { backtrace: Backtrace },
    #[snafu(display("invalid transfer syntax sub-item"))]
    InvalidTransferSyntaxSubItem { backtrace: Backtrace },
    #[snafu(display("unknown presentation context sub-item"))]
    UnknownPresentationContextSubItem { backtrace: Backtrace },
    #[snafu(display("Could not decode text field `{}`", field))]
    DecodeText {
        field: &'static str,
        backtrace: Backtrace,
    },
    #[snafu(display("Missing application context name"))]
    MissingApplicationContextName { backtrace: Backtrace },
    #[snafu(display("Missing abstract syntax"))]
    MissingAbstractSyntax { backtrace: Backtrace },
    #[snafu(display("Missing transfer syntax"))]
    MissingTransferSyntax { backtrace: Backtrace },
}

impl Error {
    /// Whether the error stems from a read timing out,
    /// as configured through a socket read timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::ReadPdu { source, .. }
            | Error::ReadPduItem { source, .. }
            | Error::ReadPduField { source, .. }
            | Error::ReadReserved { source, .. } => {
                matches!(source.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Decode a single PDU from the beginning of the given byte slice.
///
/// If the slice does not yet contain a full PDU,
/// `Ok(None)` is returned and the caller should retry
/// once more bytes have arrived:
/// the caller owns the buffering.
/// On success, the decoded PDU is returned
/// together with the number of bytes consumed,
/// which the caller should drain from its buffer.
pub fn decode_pdu(buf: &[u8], max_pdu_length: u32, strict: bool) -> Result<Option<(Pdu, usize)>> {
    ensure!(
        (MINIMUM_PDU_SIZE..=MAXIMUM_PDU_SIZE).contains(&max_pdu_length),
        InvalidMaxPduSnafu { max_pdu_length }
    );

    if buf.len() < PDU_HEADER_SIZE as usize {
        return Ok(None);
    }
    let pdu_type = buf[0];
    let pdu_length = BigEndian::read_u32(&buf[2..6]);
    check_pdu_length(pdu_length, max_pdu_length, strict)?;

    let total = PDU_HEADER_SIZE as usize + pdu_length as usize;
    if buf.len() < total {
        return Ok(None);
    }

    let pdu = parse_pdu_body(pdu_type, &buf[PDU_HEADER_SIZE as usize..total])?;
    Ok(Some((pdu, total)))
}

/// Read a single PDU from the given data source,
/// blocking until the full PDU has arrived.
pub fn read_pdu<R>(reader: &mut R, max_pdu_length: u32, strict: bool) -> Result<Pdu>
where
    R: Read,
{
    ensure!(
        (MINIMUM_PDU_SIZE..=MAXIMUM_PDU_SIZE).contains(&max_pdu_length),
        InvalidMaxPduSnafu { max_pdu_length }
    );

    // If we can't read 2 bytes here, there is no PDU available.
    // This read can also wake up when the stream is closed,
    // in which case the distinct `NoPduAvailable` outcome
    // lets the caller tell an orderly closure
    // from a PDU truncated mid-way.
    let mut bytes = [0; 2];
    if let Err(e) = reader.read_exact(&mut bytes) {
        ensure!(e.kind() != ErrorKind::UnexpectedEof, NoPduAvailableSnafu);
        return Err(e).context(ReadPduFieldSnafu { field: "type" });
    }

    let pdu_type = bytes[0];
    let pdu_length = reader
        .read_u32::<BigEndian>()
        .context(ReadPduFieldSnafu { field: "length" })?;
    check_pdu_length(pdu_length, max_pdu_length, strict)?;

    let bytes = read_n(reader, pdu_length as usize).context(ReadPduSnafu)?;
    parse_pdu_body(pdu_type, &bytes)
}

fn check_pdu_length(pdu_length: u32, max_pdu_length: u32, strict: bool) -> Result<()> {
    if strict {
        ensure!(
            pdu_length <= max_pdu_length,
            PduTooLargeSnafu {
                pdu_length,
                max_pdu_length
            }
        );
    } else if pdu_length > max_pdu_length {
        ensure!(
            pdu_length <= MAXIMUM_PDU_SIZE,
            PduTooLargeSnafu {
                pdu_length,
                max_pdu_length: MAXIMUM_PDU_SIZE
            }
        );
        tracing::warn!(
            "Incoming pdu was too large: length {}, maximum is {}",
            pdu_length,
            max_pdu_length
        );
    }
    Ok(())
}

fn parse_pdu_body(pdu_type: u8, body: &[u8]) -> Result<Pdu> {
    let mut cursor = Cursor::new(body);

    match pdu_type {
        0x01 | 0x02 => {
            // A-ASSOCIATE-RQ and A-ASSOCIATE-AC share their layout:
            // protocol version (2), reserved (2),
            // called AE title (16), calling AE title (16), reserved (32),
            // then variable items.
            let mut application_context_name: Option<String> = None;
            let mut presentation_contexts_proposed = vec![];
            let mut presentation_contexts_result = vec![];
            let mut user_variables = vec![];

            let protocol_version = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                field: "Protocol-version",
            })?;
            cursor
                .read_u16::<BigEndian>()
                .context(ReadReservedSnafu { bytes: 2_u32 })?;

            let mut ae_bytes = [0; 16];
            cursor
                .read_exact(&mut ae_bytes)
                .context(ReadPduFieldSnafu {
                    field: "Called-AE-title",
                })?;
            let called_ae_title = decode_ae_title(&ae_bytes, "Called-AE-title")?;

            let mut ae_bytes = [0; 16];
            cursor
                .read_exact(&mut ae_bytes)
                .context(ReadPduFieldSnafu {
                    field: "Calling-AE-title",
                })?;
            let calling_ae_title = decode_ae_title(&ae_bytes, "Calling-AE-title")?;

            cursor
                .seek(SeekFrom::Current(32))
                .context(ReadReservedSnafu { bytes: 32_u32 })?;

            while cursor.position() < cursor.get_ref().len() as u64 {
                match read_pdu_variable(&mut cursor)? {
                    PduVariableItem::ApplicationContext(val) => {
                        application_context_name = Some(val);
                    }
                    PduVariableItem::PresentationContextProposed(val) if pdu_type == 0x01 => {
                        presentation_contexts_proposed.push(val);
                    }
                    PduVariableItem::PresentationContextResult(val) if pdu_type == 0x02 => {
                        presentation_contexts_result.push(val);
                    }
                    PduVariableItem::UserVariables(val) => {
                        user_variables = val;
                    }
                    var_item => {
                        return InvalidPduVariableSnafu { var_item }.fail();
                    }
                }
            }

            let application_context_name =
                application_context_name.context(MissingApplicationContextNameSnafu)?;

            if pdu_type == 0x01 {
                Ok(Pdu::AssociationRQ(AssociationRQ {
                    protocol_version,
                    application_context_name,
                    called_ae_title,
                    calling_ae_title,
                    presentation_contexts: presentation_contexts_proposed,
                    user_variables,
                }))
            } else {
                Ok(Pdu::AssociationAC(AssociationAC {
                    protocol_version,
                    application_context_name,
                    called_ae_title,
                    calling_ae_title,
                    presentation_contexts: presentation_contexts_result,
                    user_variables,
                }))
            }
        }
        0x03 => {
            // A-ASSOCIATE-RJ: reserved (1), result (1), source (1), reason (1)
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;

            let result = AssociationRJResult::from(
                cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Result" })?,
            )
            .context(InvalidRejectSourceOrReasonSnafu)?;

            let source = AssociationRJSource::from(
                cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Source" })?,
                cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Reason/Diag.",
                })?,
            )
            .context(InvalidRejectSourceOrReasonSnafu)?;

            Ok(Pdu::AssociationRJ(AssociationRJ { result, source }))
        }
        0x04 => {
            // P-DATA-TF: one or more presentation data value items
            let mut values = vec![];
            while cursor.position() < cursor.get_ref().len() as u64 {
                // item length covers the context ID, the message control
                // header, and the fragment data
                let item_length = cursor.read_u32::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-Length",
                })?;

                ensure!(
                    item_length >= 2,
                    InvalidItemLengthSnafu {
                        length: item_length
                    }
                );

                let presentation_context_id = cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Presentation-context-ID",
                })?;

                // message control header:
                // bit 0 distinguishes command from data set fragments,
                // bit 1 marks the last fragment of its set
                let header = cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Message Control Header",
                })?;

                let value_type = if header & 0x01 > 0 {
                    PDataValueType::Command
                } else {
                    PDataValueType::Data
                };
                let is_last = (header & 0x02) > 0;

                let data =
                    read_n(&mut cursor, (item_length - 2) as usize).context(ReadPduFieldSnafu {
                        field: "Presentation-data-value",
                    })?;

                values.push(PDataValue {
                    presentation_context_id,
                    value_type,
                    is_last,
                    data,
                })
            }

            Ok(Pdu::PData { data: values })
        }
        0x05 => {
            // A-RELEASE-RQ: 4 reserved bytes
            cursor
                .seek(SeekFrom::Current(4))
                .context(ReadReservedSnafu { bytes: 4_u32 })?;
            Ok(Pdu::ReleaseRQ)
        }
        0x06 => {
            // A-RELEASE-RP: 4 reserved bytes
            cursor
                .seek(SeekFrom::Current(4))
                .context(ReadReservedSnafu { bytes: 4_u32 })?;
            Ok(Pdu::ReleaseRP)
        }
        0x07 => {
            // A-ABORT: reserved (2), source (1), reason (1)
            let mut buf = [0u8; 2];
            cursor
                .read_exact(&mut buf)
                .context(ReadReservedSnafu { bytes: 2_u32 })?;

            let source = AbortRQSource::from(
                cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Source" })?,
                cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Reason/Diag",
                })?,
            )
            .context(InvalidAbortSourceOrReasonSnafu)?;

            Ok(Pdu::AbortRQ { source })
        }
        _ => {
            let data = read_n(&mut cursor, body.len()).context(ReadPduFieldSnafu {
                field: "Unknown",
            })?;
            Ok(Pdu::Unknown { pdu_type, data })
        }
    }
}

fn read_n<R>(reader: &mut R, bytes_to_read: usize) -> std::io::Result<Vec<u8>>
where
    R: Read,
{
    let mut result = Vec::new();
    reader.take(bytes_to_read as u64).read_to_end(&mut result)?;
    if result.len() != bytes_to_read {
        return Err(std::io::Error::new(
            ErrorKind::UnexpectedEof,
            "data ends prematurely",
        ));
    }
    Ok(result)
}

/// Decode an AE title field:
/// 16 characters of the basic G0 set,
/// leading and trailing spaces being non-significant.
fn decode_ae_title(bytes: &[u8], field: &'static str) -> Result<String> {
    let text = std::str::from_utf8(bytes)
        .ok()
        .context(DecodeTextSnafu { field })?;
    Ok(text.trim_matches(|c| c == ' ' || c == '\0').to_string())
}

fn decode_uid(bytes: Vec<u8>, field: &'static str) -> Result<String> {
    let text = String::from_utf8(bytes)
        .ok()
        .context(DecodeTextSnafu { field })?;
    Ok(text.trim_matches(|c| c == ' ' || c == '\0').to_string())
}

fn read_pdu_variable(reader: &mut Cursor<&[u8]>) -> Result<PduVariableItem> {
    let item_type = reader
        .read_u8()
        .context(ReadPduFieldSnafu { field: "Item-type" })?;
    reader
        .read_u8()
        .context(ReadReservedSnafu { bytes: 1_u32 })?;
    let item_length = reader.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
        field: "Item-length",
    })?;

    let bytes = read_n(reader, item_length as usize).context(ReadPduItemSnafu)?;
    let mut cursor = Cursor::new(&bytes[..]);

    match item_type {
        0x10 => {
            // Application Context Item
            let val = decode_uid(bytes, "Application-context-name")?;
            Ok(PduVariableItem::ApplicationContext(val))
        }
        0x20 => {
            // Presentation Context Item (proposed):
            // context ID (1), reserved (3),
            // then one abstract syntax sub-item
            // and one or more transfer syntax sub-items
            let mut abstract_syntax: Option<String> = None;
            let mut transfer_syntaxes = vec![];

            let presentation_context_id = cursor.read_u8().context(ReadPduFieldSnafu {
                field: "Presentation-context-ID",
            })?;
            cursor
                .seek(SeekFrom::Current(3))
                .context(ReadReservedSnafu { bytes: 3_u32 })?;

            while cursor.position() < cursor.get_ref().len() as u64 {
                let item_type = cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Item-type" })?;
                cursor
                    .read_u8()
                    .context(ReadReservedSnafu { bytes: 1_u32 })?;
                let item_length = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-length",
                })?;

                match item_type {
                    0x30 => {
                        let data = read_n(&mut cursor, item_length as usize).context(
                            ReadPduFieldSnafu {
                                field: "Abstract-syntax-name",
                            },
                        )?;
                        abstract_syntax = Some(decode_uid(data, "Abstract-syntax-name")?);
                    }
                    0x40 => {
                        let data = read_n(&mut cursor, item_length as usize).context(
                            ReadPduFieldSnafu {
                                field: "Transfer-syntax-name",
                            },
                        )?;
                        transfer_syntaxes.push(decode_uid(data, "Transfer-syntax-name")?);
                    }
                    _ => {
                        return UnknownPresentationContextSubItemSnafu.fail();
                    }
                }
            }

            Ok(PduVariableItem::PresentationContextProposed(
                PresentationContextProposed {
                    id: presentation_context_id,
                    abstract_syntax: abstract_syntax.context(MissingAbstractSyntaxSnafu)?,
                    transfer_syntaxes,
                },
            ))
        }
        0x21 => {
            // Presentation Context Item (result):
            // context ID (1), reserved (1), result/reason (1), reserved (1),
            // then exactly one transfer syntax sub-item
            let mut transfer_syntax: Option<String> = None;

            let presentation_context_id = cursor.read_u8().context(ReadPduFieldSnafu {
                field: "Presentation-context-ID",
            })?;
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;
            let reason = PresentationContextResultReason::from(cursor.read_u8().context(
                ReadPduFieldSnafu {
                    field: "Result/Reason",
                },
            )?)
            .context(InvalidPresentationContextResultReasonSnafu)?;
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;

            while cursor.position() < cursor.get_ref().len() as u64 {
                let item_type = cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Item-type" })?;
                cursor
                    .read_u8()
                    .context(ReadReservedSnafu { bytes: 1_u32 })?;
                let item_length = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-length",
                })?;

                match item_type {
                    0x40 => {
                        // only a single transfer syntax may be accepted
                        ensure!(
                            transfer_syntax.is_none(),
                            MultipleTransferSyntaxesAcceptedSnafu
                        );
                        let data = read_n(&mut cursor, item_length as usize).context(
                            ReadPduFieldSnafu {
                                field: "Transfer-syntax-name",
                            },
                        )?;
                        transfer_syntax = Some(decode_uid(data, "Transfer-syntax-name")?);
                    }
                    _ => {
                        return InvalidTransferSyntaxSubItemSnafu.fail();
                    }
                }
            }

            Ok(PduVariableItem::PresentationContextResult(
                PresentationContextResult {
                    id: presentation_context_id,
                    reason,
                    transfer_syntax: transfer_syntax.context(MissingTransferSyntaxSnafu)?,
                },
            ))
        }
        0x50 => {
            // User Information Item
            let mut user_variables = vec![];

            while cursor.position() < cursor.get_ref().len() as u64 {
                let item_type = cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Item-type" })?;
                cursor
                    .read_u8()
                    .context(ReadReservedSnafu { bytes: 1_u32 })?;
                let item_length = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-length",
                })?;

                match item_type {
                    0x51 => {
                        // maximum length received:
                        // bounds the P-DATA-TF PDUs the peer may send us
                        user_variables.push(UserVariableItem::MaxLength(
                            cursor.read_u32::<BigEndian>().context(ReadPduFieldSnafu {
                                field: "Maximum-length-received",
                            })?,
                        ));
                    }
                    0x52 => {
                        let data = read_n(&mut cursor, item_length as usize).context(
                            ReadPduFieldSnafu {
                                field: "Implementation-class-uid",
                            },
                        )?;
                        user_variables.push(UserVariableItem::ImplementationClassUID(decode_uid(
                            data,
                            "Implementation-class-uid",
                        )?));
                    }
                    0x55 => {
                        let data = read_n(&mut cursor, item_length as usize).context(
                            ReadPduFieldSnafu {
                                field: "Implementation-version-name",
                            },
                        )?;
                        user_variables.push(UserVariableItem::ImplementationVersionName(
                            decode_uid(data, "Implementation-version-name")?,
                        ));
                    }
                    _ => {
                        user_variables.push(UserVariableItem::Unknown(
                            item_type,
                            read_n(&mut cursor, item_length as usize)
                                .context(ReadPduFieldSnafu { field: "Unknown" })?,
                        ));
                    }
                }
            }

            Ok(PduVariableItem::UserVariables(user_variables))
        }
        _ => Ok(PduVariableItem::Unknown(item_type)),
    }
}
