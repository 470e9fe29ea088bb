//! Data set decoding
//! under the baseline little endian transfer syntaxes.
//!
//! Sequences with both defined and undefined lengths are accepted,
//! as are defined and undefined length items.
//! Under Implicit VR,
//! value representations come from the built-in dictionary subset,
//! falling back to `UN` for unknown tags.
use crate::dataset::{DataElement, Dataset};
use crate::header::{Tag, VR};
use crate::tags;
use crate::transfer_syntax::TransferSyntax;
use crate::value::{C, PrimitiveValue};
use byteordered::byteorder::{LittleEndian, ReadBytesExt};
use snafu::{Backtrace, OptionExt, ResultExt, Snafu};
use std::io::{Cursor, Read, Seek, SeekFrom};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Could not read field `{}`", field))]
    ReadField {
        field: &'static str,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Could not read value of element {} ({} bytes)", tag, length))]
    ReadValue {
        tag: Tag,
        length: u32,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Unknown VR code {:?} in element {}", vr_bytes, tag))]
    UnknownVr {
        tag: Tag,
        vr_bytes: [u8; 2],
        backtrace: Backtrace,
    },

    #[snafu(display("Invalid length {} for element {} of VR {}", length, tag, vr))]
    InvalidValueLength {
        tag: Tag,
        vr: VR,
        length: u32,
        backtrace: Backtrace,
    },

    #[snafu(display("Undefined length in non-sequence element {}", tag))]
    UndefinedLengthNotAllowed { tag: Tag, backtrace: Backtrace },

    #[snafu(display("Unexpected delimiter {} outside of a sequence", tag))]
    UnexpectedDelimiter { tag: Tag, backtrace: Backtrace },

    #[snafu(display("Unexpected item tag {} outside of a sequence", tag))]
    UnexpectedItem { tag: Tag, backtrace: Backtrace },

    #[snafu(display("Missing delimiter for sequence {}", tag))]
    MissingDelimiter { tag: Tag, backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Decode a full data set from a byte slice
/// using the given transfer syntax.
pub fn read_dataset(data: &[u8], ts: TransferSyntax) -> Result<Dataset> {
    let mut cursor = Cursor::new(data);
    let mut dataset = Dataset::new();
    while (cursor.position() as usize) < data.len() {
        let element = read_element(&mut cursor, ts)?;
        dataset.put(element);
    }
    Ok(dataset)
}

fn read_element(cursor: &mut Cursor<&[u8]>, ts: TransferSyntax) -> Result<DataElement> {
    let tag = read_tag(cursor)?;
    if tag == tags::ITEM_DELIMITER || tag == tags::SEQUENCE_DELIMITER {
        return UnexpectedDelimiterSnafu { tag }.fail();
    }
    if tag == tags::ITEM {
        return UnexpectedItemSnafu { tag }.fail();
    }

    let (vr, length) = read_header(cursor, tag, ts)?;

    if vr == VR::SQ {
        let items = read_sequence_items(cursor, tag, length, ts)?;
        return Ok(DataElement::new(tag, VR::SQ, items));
    }
    if length == UNDEFINED_LENGTH {
        return UndefinedLengthNotAllowedSnafu { tag }.fail();
    }

    let data = read_n(cursor, length as usize).context(ReadValueSnafu { tag, length })?;
    let value = primitive_value_from_bytes(tag, vr, &data)?;
    Ok(DataElement::new(tag, vr, value))
}

fn read_tag(cursor: &mut Cursor<&[u8]>) -> Result<Tag> {
    let group = cursor
        .read_u16::<LittleEndian>()
        .context(ReadFieldSnafu { field: "Group" })?;
    let element = cursor
        .read_u16::<LittleEndian>()
        .context(ReadFieldSnafu { field: "Element" })?;
    Ok(Tag(group, element))
}

fn read_header(cursor: &mut Cursor<&[u8]>, tag: Tag, ts: TransferSyntax) -> Result<(VR, u32)> {
    if !ts.is_explicit_vr() {
        let length = cursor
            .read_u32::<LittleEndian>()
            .context(ReadFieldSnafu {
                field: "Value Length",
            })?;
        let vr = tags::vr_of(tag).unwrap_or(VR::UN);
        return Ok((vr, length));
    }

    let mut vr_bytes = [0u8; 2];
    cursor
        .read_exact(&mut vr_bytes)
        .context(ReadFieldSnafu { field: "VR" })?;
    let vr = VR::from_binary(vr_bytes).with_context(|| UnknownVrSnafu { tag, vr_bytes })?;

    let length = if vr.has_long_header() {
        cursor
            .read_u16::<LittleEndian>()
            .context(ReadFieldSnafu { field: "Reserved" })?;
        cursor
            .read_u32::<LittleEndian>()
            .context(ReadFieldSnafu {
                field: "Value Length",
            })?
    } else {
        u32::from(cursor.read_u16::<LittleEndian>().context(ReadFieldSnafu {
            field: "Value Length",
        })?)
    };
    Ok((vr, length))
}

/// Read the items of a sequence element,
/// which may have a defined length (read until consumed)
/// or an undefined length (read until the sequence delimiter).
fn read_sequence_items(
    cursor: &mut Cursor<&[u8]>,
    tag: Tag,
    length: u32,
    ts: TransferSyntax,
) -> Result<Vec<Dataset>> {
    let mut items = Vec::new();
    let end = if length == UNDEFINED_LENGTH {
        None
    } else {
        Some(cursor.position() + u64::from(length))
    };

    loop {
        if let Some(end) = end {
            if cursor.position() >= end {
                break;
            }
        }
        let item_tag = read_tag(cursor)?;
        let item_length = cursor
            .read_u32::<LittleEndian>()
            .context(ReadFieldSnafu {
                field: "Item Length",
            })?;
        match item_tag {
            t if t == tags::SEQUENCE_DELIMITER => {
                if end.is_none() {
                    return Ok(items);
                }
                // defined length sequences do not carry a delimiter
                return UnexpectedDelimiterSnafu { tag: item_tag }.fail();
            }
            t if t == tags::ITEM => {
                items.push(read_item(cursor, item_length, ts)?);
            }
            _ => return MissingDelimiterSnafu { tag }.fail(),
        }
    }
    Ok(items)
}

fn read_item(cursor: &mut Cursor<&[u8]>, length: u32, ts: TransferSyntax) -> Result<Dataset> {
    if length != UNDEFINED_LENGTH {
        let data = read_n(cursor, length as usize).context(ReadValueSnafu {
            tag: tags::ITEM,
            length,
        })?;
        return read_dataset(&data, ts);
    }

    // undefined length: read elements until the item delimiter
    let mut dataset = Dataset::new();
    loop {
        let tag = read_tag(cursor)?;
        if tag == tags::ITEM_DELIMITER {
            cursor
                .read_u32::<LittleEndian>()
                .context(ReadFieldSnafu {
                    field: "Item Delimiter Length",
                })?;
            return Ok(dataset);
        }
        // rewind the tag and read a whole element
        cursor
            .seek(SeekFrom::Current(-4))
            .context(ReadFieldSnafu { field: "Tag" })?;
        dataset.put(read_element(cursor, ts)?);
    }
}

fn read_n(cursor: &mut Cursor<&[u8]>, bytes_to_read: usize) -> std::io::Result<Vec<u8>> {
    let mut result = Vec::with_capacity(bytes_to_read.min(1 << 16));
    cursor.take(bytes_to_read as u64).read_to_end(&mut result)?;
    if result.len() != bytes_to_read {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "value data ends prematurely",
        ));
    }
    Ok(result)
}

fn primitive_value_from_bytes(tag: Tag, vr: VR, data: &[u8]) -> Result<PrimitiveValue> {
    if data.is_empty() {
        return Ok(PrimitiveValue::Empty);
    }
    let value = match vr {
        VR::US => {
            snafu::ensure!(
                data.len() % 2 == 0,
                InvalidValueLengthSnafu {
                    tag,
                    vr,
                    length: data.len() as u32,
                }
            );
            PrimitiveValue::U16(data.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect())
        }
        VR::UL => {
            snafu::ensure!(
                data.len() % 4 == 0,
                InvalidValueLengthSnafu {
                    tag,
                    vr,
                    length: data.len() as u32,
                }
            );
            PrimitiveValue::U32(
                data.chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            )
        }
        VR::UN => PrimitiveValue::U8(data.iter().copied().collect()),
        _ => {
            let text = String::from_utf8_lossy(data);
            let trimmed = match vr {
                VR::UI => text.trim_end_matches('\0'),
                _ => text.trim_end_matches(' '),
            };
            if trimmed.is_empty() {
                PrimitiveValue::Empty
            } else {
                PrimitiveValue::Strs(trimmed.split('\\').map(|s| s.to_string()).collect::<C<String>>())
            }
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_dataset;

    fn sample_query() -> Dataset {
        Dataset::from_element_iter(vec![
            DataElement::new(tags::SPECIFIC_CHARACTER_SET, VR::CS, "ISO_IR 100"),
            DataElement::new(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "STUDY"),
            DataElement::new(tags::PATIENT_NAME, VR::PN, "BEETHOVEN^LUDWIG^VAN"),
            DataElement::new(tags::PATIENT_BIRTH_DATE, VR::DA, "17700101"),
            DataElement::new(
                tags::MODALITIES_IN_STUDY,
                VR::CS,
                vec!["CR".to_string(), "MR".to_string()],
            ),
            DataElement::new(tags::STUDY_DATE, VR::DA, "20200101-20200601"),
            DataElement::empty(tags::STUDY_INSTANCE_UID, VR::UI),
            DataElement::empty(tags::STUDY_DESCRIPTION, VR::LO),
            DataElement::new(tags::STATUS, VR::US, 0xFF00_u16),
            DataElement::new(tags::COMMAND_GROUP_LENGTH, VR::UL, 128_u32),
        ])
    }

    #[test]
    fn round_trip_implicit_vr() {
        let ds = sample_query();
        let data = encode_dataset(&ds, TransferSyntax::ImplicitVrLittleEndian).unwrap();
        let back = read_dataset(&data, TransferSyntax::ImplicitVrLittleEndian).unwrap();
        assert_eq!(back, ds);
        // tag order is preserved through the round trip
        let tags_in: Vec<_> = ds.iter().map(|e| e.tag()).collect();
        let tags_out: Vec<_> = back.iter().map(|e| e.tag()).collect();
        assert_eq!(tags_in, tags_out);
    }

    #[test]
    fn round_trip_explicit_vr() {
        let ds = sample_query();
        let data = encode_dataset(&ds, TransferSyntax::ExplicitVrLittleEndian).unwrap();
        let back = read_dataset(&data, TransferSyntax::ExplicitVrLittleEndian).unwrap();
        assert_eq!(back, ds);
    }

    #[test]
    fn round_trip_nested_sequence() {
        let item = Dataset::from_element_iter(vec![
            DataElement::new(tags::SCHEDULED_STATION_AE_TITLE, VR::AE, "CT01"),
            DataElement::new(tags::SCHEDULED_PROCEDURE_STEP_START_DATE, VR::DA, "20260401"),
            DataElement::new(tags::MODALITY, VR::CS, "CT"),
        ]);
        let ds = Dataset::from_element_iter(vec![
            DataElement::new(tags::PATIENT_NAME, VR::PN, "DOE^JANE"),
            DataElement::new(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE, VR::SQ, vec![item]),
        ]);

        for ts in [
            TransferSyntax::ImplicitVrLittleEndian,
            TransferSyntax::ExplicitVrLittleEndian,
        ] {
            let data = encode_dataset(&ds, ts).unwrap();
            let back = read_dataset(&data, ts).unwrap();
            assert_eq!(back, ds);
        }
    }

    #[test]
    fn defined_length_item_is_accepted() {
        // a sequence with a defined length item,
        // as some peers prefer to encode them
        let inner = Dataset::from_element_iter(vec![DataElement::new(
            tags::MODALITY,
            VR::CS,
            "MR",
        )]);
        let inner_data = encode_dataset(&inner, TransferSyntax::ImplicitVrLittleEndian).unwrap();

        let mut data = Vec::new();
        // sequence element with undefined length
        data.extend_from_slice(&[0x40, 0x00, 0x00, 0x01]);
        data.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
        // item with defined length
        data.extend_from_slice(&[0xFE, 0xFF, 0x00, 0xE0]);
        data.extend_from_slice(&(inner_data.len() as u32).to_le_bytes());
        data.extend_from_slice(&inner_data);
        // sequence delimiter
        data.extend_from_slice(&[0xFE, 0xFF, 0xDD, 0xE0, 0x00, 0x00, 0x00, 0x00]);

        let ds = read_dataset(&data, TransferSyntax::ImplicitVrLittleEndian).unwrap();
        let items = ds
            .get(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)
            .and_then(|e| e.items())
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0], inner);
    }

    #[test]
    fn truncated_value_is_an_error() {
        let ds = Dataset::from_element_iter(vec![DataElement::new(
            tags::PATIENT_NAME,
            VR::PN,
            "BEETHOVEN^LUDWIG^VAN",
        )]);
        let data = encode_dataset(&ds, TransferSyntax::ImplicitVrLittleEndian).unwrap();
        let err = read_dataset(&data[..data.len() - 4], TransferSyntax::ImplicitVrLittleEndian)
            .unwrap_err();
        assert!(matches!(err, Error::ReadValue { .. }));
    }
}
