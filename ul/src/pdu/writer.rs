//! PDU writer module
use crate::pdu::*;
use byteordered::byteorder::{BigEndian, WriteBytesExt};
use snafu::{Backtrace, ResultExt, Snafu};
use std::io::Write;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Could not write chunk of {} PDU structure: {}", name, source))]
    WriteChunk {
        /// the name of the PDU structure
        name: &'static str,
        source: WriteChunkError,
    },

    #[snafu(display("Could not write field `{}`: {}", field, source))]
    WriteField {
        field: &'static str,
        backtrace: Backtrace,
        source: std::io::Error,
    },

    #[snafu(display("Could not write {} reserved bytes: {}", bytes, source))]
    WriteReserved {
        bytes: u32,
        backtrace: Backtrace,
        source: std::io::Error,
    },

    #[snafu(display("Cannot encode non-ASCII field `{}`", field))]
    EncodeField {
        field: &'static str,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
pub enum WriteChunkError {
    #[snafu(display("Failed to build chunk: {}", source))]
    BuildChunk {
        backtrace: Backtrace,
        source: Box<Error>,
    },
    #[snafu(display("Failed to write chunk length: {}", source))]
    WriteLength {
        backtrace: Backtrace,
        source: std::io::Error,
    },
    #[snafu(display("Failed to write chunk data: {}", source))]
    WriteData {
        backtrace: Backtrace,
        source: std::io::Error,
    },
}

/// Run `func` against a fresh buffer,
/// then write the buffer to `writer`
/// preceded by its length in a big endian 32-bit integer.
fn write_chunk_u32<F>(writer: &mut dyn Write, func: F) -> std::result::Result<(), WriteChunkError>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut data = vec![];
    func(&mut data).map_err(Box::from).context(BuildChunkSnafu)?;

    let length = data.len() as u32;
    writer
        .write_u32::<BigEndian>(length)
        .context(WriteLengthSnafu)?;
    writer.write_all(&data).context(WriteDataSnafu)?;
    Ok(())
}

/// Same as [`write_chunk_u32`],
/// but with a 16-bit length prefix.
fn write_chunk_u16<F>(writer: &mut dyn Write, func: F) -> std::result::Result<(), WriteChunkError>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut data = vec![];
    func(&mut data).map_err(Box::from).context(BuildChunkSnafu)?;

    let length = data.len() as u16;
    writer
        .write_u16::<BigEndian>(length)
        .context(WriteLengthSnafu)?;
    writer.write_all(&data).context(WriteDataSnafu)?;
    Ok(())
}

/// Encode and write a whole PDU into the given writer.
pub fn write_pdu<W>(writer: &mut W, pdu: &Pdu) -> Result<()>
where
    W: Write,
{
    match pdu {
        Pdu::AssociationRQ(AssociationRQ {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            user_variables,
        }) => {
            // 1 - PDU-type - 01H; 2 - reserved
            writer
                .write_u8(0x01)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, |writer| {
                writer
                    .write_u16::<BigEndian>(*protocol_version)
                    .context(WriteFieldSnafu {
                        field: "Protocol-version",
                    })?;
                writer
                    .write_u16::<BigEndian>(0x00)
                    .context(WriteReservedSnafu { bytes: 2_u32 })?;

                write_ae_title(writer, called_ae_title, "Called-AE-title")?;
                write_ae_title(writer, calling_ae_title, "Calling-AE-title")?;

                writer
                    .write_all(&[0; 32])
                    .context(WriteReservedSnafu { bytes: 32_u32 })?;

                write_pdu_variable_application_context_name(writer, application_context_name)?;

                for presentation_context in presentation_contexts {
                    write_pdu_variable_presentation_context_proposed(writer, presentation_context)?;
                }

                write_pdu_variable_user_variables(writer, user_variables)?;

                Ok(())
            })
            .context(WriteChunkSnafu {
                name: "A-ASSOCIATE-RQ",
            })?;

            Ok(())
        }
        Pdu::AssociationAC(AssociationAC {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            user_variables,
        }) => {
            // 1 - PDU-type - 02H; 2 - reserved
            writer
                .write_u8(0x02)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, |writer| {
                writer
                    .write_u16::<BigEndian>(*protocol_version)
                    .context(WriteFieldSnafu {
                        field: "Protocol-version",
                    })?;
                writer
                    .write_u16::<BigEndian>(0x00)
                    .context(WriteReservedSnafu { bytes: 2_u32 })?;

                // echoed from the A-ASSOCIATE-RQ;
                // receivers must not test these fields
                write_ae_title(writer, called_ae_title, "Called-AE-title")?;
                write_ae_title(writer, calling_ae_title, "Calling-AE-title")?;

                writer
                    .write_all(&[0; 32])
                    .context(WriteReservedSnafu { bytes: 32_u32 })?;

                write_pdu_variable_application_context_name(writer, application_context_name)?;

                for presentation_context in presentation_contexts {
                    write_pdu_variable_presentation_context_result(writer, presentation_context)?;
                }

                write_pdu_variable_user_variables(writer, user_variables)?;

                Ok(())
            })
            .context(WriteChunkSnafu {
                name: "A-ASSOCIATE-AC",
            })?;

            Ok(())
        }
        Pdu::AssociationRJ(AssociationRJ { result, source }) => {
            // 1 - PDU-type - 03H; 2 - reserved
            writer
                .write_u8(0x03)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, |writer| {
                writer
                    .write_u8(0x00)
                    .context(WriteReservedSnafu { bytes: 1_u32 })?;

                // result: 1 - rejected-permanent, 2 - rejected-transient
                writer
                    .write_u8(match result {
                        AssociationRJResult::Permanent => 0x01,
                        AssociationRJResult::Transient => 0x02,
                    })
                    .context(WriteFieldSnafu { field: "Result" })?;

                let (source_code, reason_code) = match source {
                    AssociationRJSource::ServiceUser(reason) => (
                        0x01,
                        match reason {
                            AssociationRJServiceUserReason::NoReasonGiven => 0x01,
                            AssociationRJServiceUserReason::ApplicationContextNameNotSupported => {
                                0x02
                            }
                            AssociationRJServiceUserReason::CallingAETitleNotRecognized => 0x03,
                            AssociationRJServiceUserReason::CalledAETitleNotRecognized => 0x07,
                            AssociationRJServiceUserReason::Reserved(code) => *code,
                        },
                    ),
                    AssociationRJSource::ServiceProviderAsce(reason) => (
                        0x02,
                        match reason {
                            AssociationRJServiceProviderAsceReason::NoReasonGiven => 0x01,
                            AssociationRJServiceProviderAsceReason::ProtocolVersionNotSupported => {
                                0x02
                            }
                        },
                    ),
                    AssociationRJSource::ServiceProviderPresentation(reason) => (
                        0x03,
                        match reason {
                            AssociationRJServiceProviderPresentationReason::TemporaryCongestion => {
                                0x01
                            }
                            AssociationRJServiceProviderPresentationReason::LocalLimitExceeded => {
                                0x02
                            }
                            AssociationRJServiceProviderPresentationReason::Reserved(code) => *code,
                        },
                    ),
                };
                writer
                    .write_u8(source_code)
                    .context(WriteFieldSnafu { field: "Source" })?;
                writer.write_u8(reason_code).context(WriteFieldSnafu {
                    field: "Reason/Diag.",
                })?;

                Ok(())
            })
            .context(WriteChunkSnafu {
                name: "A-ASSOCIATE-RJ",
            })?;

            Ok(())
        }
        Pdu::PData { data } => {
            // 1 - PDU-type - 04H; 2 - reserved
            writer
                .write_u8(0x04)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, |writer| {
                for presentation_data_value in data {
                    write_chunk_u32(writer, |writer| {
                        writer
                            .write_u8(presentation_data_value.presentation_context_id)
                            .context(WriteFieldSnafu {
                                field: "Presentation-context-ID",
                            })?;

                        // message control header:
                        // bit 0 set for command fragments,
                        // bit 1 set on the last fragment of its set
                        let mut message_header = 0x00;
                        if let PDataValueType::Command = presentation_data_value.value_type {
                            message_header |= 0x01;
                        }
                        if presentation_data_value.is_last {
                            message_header |= 0x02;
                        }
                        writer.write_u8(message_header).context(WriteFieldSnafu {
                            field: "Message Control Header",
                        })?;

                        writer
                            .write_all(&presentation_data_value.data)
                            .context(WriteFieldSnafu {
                                field: "Presentation-data-value",
                            })?;

                        Ok(())
                    })
                    .context(WriteChunkSnafu {
                        name: "Presentation-data-value item",
                    })?;
                }

                Ok(())
            })
            .context(WriteChunkSnafu { name: "PData" })?;

            Ok(())
        }
        Pdu::ReleaseRQ => {
            writer
                .write_u8(0x05)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, |writer| {
                writer
                    .write_all(&[0u8; 4])
                    .context(WriteReservedSnafu { bytes: 4_u32 })
            })
            .context(WriteChunkSnafu { name: "ReleaseRQ" })?;

            Ok(())
        }
        Pdu::ReleaseRP => {
            writer
                .write_u8(0x06)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, |writer| {
                writer
                    .write_all(&[0u8; 4])
                    .context(WriteReservedSnafu { bytes: 4_u32 })
            })
            .context(WriteChunkSnafu { name: "ReleaseRP" })?;

            Ok(())
        }
        Pdu::AbortRQ { source } => {
            writer
                .write_u8(0x07)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, |writer| {
                writer
                    .write_all(&[0u8; 2])
                    .context(WriteReservedSnafu { bytes: 2_u32 })?;

                let (source_code, reason_code) = match source {
                    AbortRQSource::ServiceUser => (0x00, 0x00),
                    AbortRQSource::Reserved => (0x01, 0x00),
                    AbortRQSource::ServiceProvider(reason) => (
                        0x02,
                        match reason {
                            AbortRQServiceProviderReason::ReasonNotSpecified => 0x00,
                            AbortRQServiceProviderReason::UnrecognizedPdu => 0x01,
                            AbortRQServiceProviderReason::UnexpectedPdu => 0x02,
                            AbortRQServiceProviderReason::Reserved => 0x03,
                            AbortRQServiceProviderReason::UnrecognizedPduParameter => 0x04,
                            AbortRQServiceProviderReason::UnexpectedPduParameter => 0x05,
                            AbortRQServiceProviderReason::InvalidPduParameter => 0x06,
                        },
                    ),
                };
                writer
                    .write_u8(source_code)
                    .context(WriteFieldSnafu { field: "Source" })?;
                writer.write_u8(reason_code).context(WriteFieldSnafu {
                    field: "Reason/Diag",
                })?;

                Ok(())
            })
            .context(WriteChunkSnafu { name: "AbortRQ" })?;

            Ok(())
        }
        Pdu::Unknown { pdu_type, data } => {
            writer
                .write_u8(*pdu_type)
                .context(WriteFieldSnafu { field: "PDU-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, |writer| {
                writer.write_all(data).context(WriteFieldSnafu {
                    field: "Unknown data",
                })
            })
            .context(WriteChunkSnafu { name: "Unknown" })?;

            Ok(())
        }
    }
}

/// Write an AE title field:
/// 16 characters of the basic G0 set,
/// padded with trailing spaces.
fn write_ae_title(writer: &mut dyn Write, ae_title: &str, field: &'static str) -> Result<()> {
    snafu::ensure!(
        ae_title.is_ascii() && ae_title.len() <= 16,
        EncodeFieldSnafu { field }
    );
    let mut ae_title_bytes = ae_title.as_bytes().to_vec();
    ae_title_bytes.resize(16, b' ');
    writer.write_all(&ae_title_bytes).context(WriteFieldSnafu { field })
}

fn write_uid(writer: &mut dyn Write, uid: &str, field: &'static str) -> Result<()> {
    snafu::ensure!(uid.is_ascii(), EncodeFieldSnafu { field });
    writer
        .write_all(uid.trim_end_matches('\0').as_bytes())
        .context(WriteFieldSnafu { field })
}

fn write_pdu_variable_application_context_name(
    writer: &mut dyn Write,
    application_context_name: &str,
) -> Result<()> {
    // 1 - Item-type - 10H; 2 - reserved
    writer
        .write_u8(0x10)
        .context(WriteFieldSnafu { field: "Item-type" })?;
    writer
        .write_u8(0x00)
        .context(WriteReservedSnafu { bytes: 1_u32 })?;

    write_chunk_u16(writer, |writer| {
        write_uid(writer, application_context_name, "Application-context-name")
    })
    .context(WriteChunkSnafu {
        name: "Application Context Item",
    })?;

    Ok(())
}

fn write_pdu_variable_presentation_context_proposed(
    writer: &mut dyn Write,
    presentation_context: &PresentationContextProposed,
) -> Result<()> {
    // 1 - Item-type - 20H; 2 - reserved
    writer
        .write_u8(0x20)
        .context(WriteFieldSnafu { field: "Item-type" })?;
    writer
        .write_u8(0x00)
        .context(WriteReservedSnafu { bytes: 1_u32 })?;

    write_chunk_u16(writer, |writer| {
        // context ID (odd integer), then 3 reserved bytes
        writer
            .write_u8(presentation_context.id)
            .context(WriteFieldSnafu {
                field: "Presentation-context-ID",
            })?;
        writer
            .write_all(&[0u8; 3])
            .context(WriteReservedSnafu { bytes: 3_u32 })?;

        // one abstract syntax sub-item (30H)
        writer
            .write_u8(0x30)
            .context(WriteFieldSnafu { field: "Item-type" })?;
        writer
            .write_u8(0x00)
            .context(WriteReservedSnafu { bytes: 1_u32 })?;
        write_chunk_u16(writer, |writer| {
            write_uid(
                writer,
                &presentation_context.abstract_syntax,
                "Abstract-syntax-name",
            )
        })
        .context(WriteChunkSnafu {
            name: "Abstract Syntax Sub-Item",
        })?;

        // one or more transfer syntax sub-items (40H)
        for transfer_syntax in &presentation_context.transfer_syntaxes {
            writer
                .write_u8(0x40)
                .context(WriteFieldSnafu { field: "Item-type" })?;
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;
            write_chunk_u16(writer, |writer| {
                write_uid(writer, transfer_syntax, "Transfer-syntax-name")
            })
            .context(WriteChunkSnafu {
                name: "Transfer Syntax Sub-Item",
            })?;
        }

        Ok(())
    })
    .context(WriteChunkSnafu {
        name: "Presentation Context Item",
    })?;

    Ok(())
}

fn write_pdu_variable_presentation_context_result(
    writer: &mut dyn Write,
    presentation_context: &PresentationContextResult,
) -> Result<()> {
    // 1 - Item-type - 21H; 2 - reserved
    writer
        .write_u8(0x21)
        .context(WriteFieldSnafu { field: "Item-type" })?;
    writer
        .write_u8(0x00)
        .context(WriteReservedSnafu { bytes: 1_u32 })?;

    write_chunk_u16(writer, |writer| {
        writer
            .write_u8(presentation_context.id)
            .context(WriteFieldSnafu {
                field: "Presentation-context-ID",
            })?;
        writer
            .write_u8(0x00)
            .context(WriteReservedSnafu { bytes: 1_u32 })?;

        writer
            .write_u8(match &presentation_context.reason {
                PresentationContextResultReason::Acceptance => 0,
                PresentationContextResultReason::UserRejection => 1,
                PresentationContextResultReason::NoReason => 2,
                PresentationContextResultReason::AbstractSyntaxNotSupported => 3,
                PresentationContextResultReason::TransferSyntaxesNotSupported => 4,
            })
            .context(WriteFieldSnafu {
                field: "Result/Reason",
            })?;
        writer
            .write_u8(0x00)
            .context(WriteReservedSnafu { bytes: 1_u32 })?;

        // exactly one transfer syntax sub-item (40H)
        writer
            .write_u8(0x40)
            .context(WriteFieldSnafu { field: "Item-type" })?;
        writer
            .write_u8(0x00)
            .context(WriteReservedSnafu { bytes: 1_u32 })?;
        write_chunk_u16(writer, |writer| {
            write_uid(
                writer,
                &presentation_context.transfer_syntax,
                "Transfer-syntax-name",
            )
        })
        .context(WriteChunkSnafu {
            name: "Transfer Syntax Sub-Item",
        })?;

        Ok(())
    })
    .context(WriteChunkSnafu {
        name: "Presentation Context Item",
    })
}

fn write_pdu_variable_user_variables(
    writer: &mut dyn Write,
    user_variables: &[UserVariableItem],
) -> Result<()> {
    if user_variables.is_empty() {
        return Ok(());
    }

    // 1 - Item-type - 50H; 2 - reserved
    writer
        .write_u8(0x50)
        .context(WriteFieldSnafu { field: "Item-type" })?;
    writer
        .write_u8(0x00)
        .context(WriteReservedSnafu { bytes: 1_u32 })?;

    write_chunk_u16(writer, |writer| {
        for user_variable in user_variables {
            match user_variable {
                UserVariableItem::MaxLength(max_length) => {
                    writer
                        .write_u8(0x51)
                        .context(WriteFieldSnafu { field: "Item-type" })?;
                    writer
                        .write_u8(0x00)
                        .context(WriteReservedSnafu { bytes: 1_u32 })?;
                    write_chunk_u16(writer, |writer| {
                        writer
                            .write_u32::<BigEndian>(*max_length)
                            .context(WriteFieldSnafu {
                                field: "Maximum-length-received",
                            })
                    })
                    .context(WriteChunkSnafu {
                        name: "Maximum-length-received",
                    })?;
                }
                UserVariableItem::ImplementationClassUID(implementation_class_uid) => {
                    writer
                        .write_u8(0x52)
                        .context(WriteFieldSnafu { field: "Item-type" })?;
                    writer
                        .write_u8(0x00)
                        .context(WriteReservedSnafu { bytes: 1_u32 })?;
                    write_chunk_u16(writer, |writer| {
                        write_uid(writer, implementation_class_uid, "Implementation-class-uid")
                    })
                    .context(WriteChunkSnafu {
                        name: "Implementation-class-uid",
                    })?;
                }
                UserVariableItem::ImplementationVersionName(implementation_version_name) => {
                    writer
                        .write_u8(0x55)
                        .context(WriteFieldSnafu { field: "Item-type" })?;
                    writer
                        .write_u8(0x00)
                        .context(WriteReservedSnafu { bytes: 1_u32 })?;
                    write_chunk_u16(writer, |writer| {
                        writer
                            .write_all(implementation_version_name.as_bytes())
                            .context(WriteFieldSnafu {
                                field: "Implementation-version-name",
                            })
                    })
                    .context(WriteChunkSnafu {
                        name: "Implementation-version-name",
                    })?;
                }
                UserVariableItem::Unknown(item_type, data) => {
                    writer
                        .write_u8(*item_type)
                        .context(WriteFieldSnafu { field: "Item-type" })?;
                    writer
                        .write_u8(0x00)
                        .context(WriteReservedSnafu { bytes: 1_u32 })?;
                    write_chunk_u16(writer, |writer| {
                        writer.write_all(data).context(WriteFieldSnafu {
                            field: "Unknown Data",
                        })
                    })
                    .context(WriteChunkSnafu { name: "Unknown" })?;
                }
            }
        }

        Ok(())
    })
    .context(WriteChunkSnafu { name: "User-data" })
}
