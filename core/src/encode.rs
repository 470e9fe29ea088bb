//! Data set encoding
//! under the baseline little endian transfer syntaxes,
//! as per the data structure encoding rules of the standard (part 5).
//!
//! Element values are padded to an even length:
//! text values with a trailing space,
//! unique identifiers and binary values with a trailing zero byte.
//! Sequences are encoded with undefined lengths
//! and explicit item and sequence delimiters.
use crate::dataset::{DataElement, Dataset, Value};
use crate::header::{Tag, VR};
use crate::tags;
use crate::transfer_syntax::TransferSyntax;
use crate::value::PrimitiveValue;
use byteordered::byteorder::{LittleEndian, WriteBytesExt};
use snafu::{Backtrace, OptionExt, ResultExt, Snafu};
use std::io::Write;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Could not write field `{}` of element {}", field, tag))]
    WriteField {
        field: &'static str,
        tag: Tag,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Value of element {} is too long for a short form header ({} bytes)", tag, len))]
    ValueTooLong {
        tag: Tag,
        len: usize,
        backtrace: Backtrace,
    },

    #[snafu(display("Cannot encode value {:?} under VR {}", value, vr))]
    IncompatibleValue {
        vr: VR,
        value: PrimitiveValue,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Encode a full data set into the given writer
/// using the given transfer syntax.
pub fn write_dataset<W>(to: &mut W, dataset: &Dataset, ts: TransferSyntax) -> Result<()>
where
    W: Write,
{
    for element in dataset.iter() {
        write_element(to, element, ts)?;
    }
    Ok(())
}

/// Encode a full data set into a new byte vector.
pub fn encode_dataset(dataset: &Dataset, ts: TransferSyntax) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(128);
    write_dataset(&mut out, dataset, ts)?;
    Ok(out)
}

fn write_element<W>(to: &mut W, element: &DataElement, ts: TransferSyntax) -> Result<()>
where
    W: Write,
{
    let tag = element.tag();
    match element.value() {
        Value::Sequence(items) => {
            write_header(to, tag, VR::SQ, UNDEFINED_LENGTH, ts)?;
            for item in items {
                write_tag_length(to, tags::ITEM, UNDEFINED_LENGTH)?;
                write_dataset(to, item, ts)?;
                write_tag_length(to, tags::ITEM_DELIMITER, 0)?;
            }
            write_tag_length(to, tags::SEQUENCE_DELIMITER, 0)?;
        }
        Value::Primitive(value) => {
            let data = primitive_value_bytes(tag, element.vr(), value)?;
            write_header(to, tag, element.vr(), data.len() as u32, ts)?;
            to.write_all(&data).context(WriteFieldSnafu {
                field: "Value",
                tag,
            })?;
        }
    }
    Ok(())
}

fn write_header<W>(to: &mut W, tag: Tag, vr: VR, length: u32, ts: TransferSyntax) -> Result<()>
where
    W: Write,
{
    if !ts.is_explicit_vr() {
        return write_tag_length(to, tag, length);
    }

    write_tag(to, tag)?;
    to.write_all(&vr.to_bytes()).context(WriteFieldSnafu {
        field: "VR",
        tag,
    })?;
    if vr.has_long_header() {
        // 2 reserved bytes, then a 32-bit length
        to.write_u16::<LittleEndian>(0).context(WriteFieldSnafu {
            field: "Reserved",
            tag,
        })?;
        to.write_u32::<LittleEndian>(length)
            .context(WriteFieldSnafu {
                field: "Value Length",
                tag,
            })?;
    } else {
        if length > u32::from(u16::MAX) {
            return ValueTooLongSnafu {
                tag,
                len: length as usize,
            }
            .fail();
        }
        to.write_u16::<LittleEndian>(length as u16)
            .context(WriteFieldSnafu {
                field: "Value Length",
                tag,
            })?;
    }
    Ok(())
}

fn write_tag<W>(to: &mut W, tag: Tag) -> Result<()>
where
    W: Write,
{
    to.write_u16::<LittleEndian>(tag.group())
        .context(WriteFieldSnafu { field: "Group", tag })?;
    to.write_u16::<LittleEndian>(tag.element())
        .context(WriteFieldSnafu {
            field: "Element",
            tag,
        })?;
    Ok(())
}

fn write_tag_length<W>(to: &mut W, tag: Tag, length: u32) -> Result<()>
where
    W: Write,
{
    write_tag(to, tag)?;
    to.write_u32::<LittleEndian>(length)
        .context(WriteFieldSnafu {
            field: "Value Length",
            tag,
        })?;
    Ok(())
}

/// Serialize a primitive value under the given VR,
/// already padded to an even length.
fn primitive_value_bytes(tag: Tag, vr: VR, value: &PrimitiveValue) -> Result<Vec<u8>> {
    let mut data = match (vr, value) {
        (_, PrimitiveValue::Empty) => Vec::new(),
        (VR::US, PrimitiveValue::U16(values)) => {
            let mut data = Vec::with_capacity(values.len() * 2);
            for v in values {
                data.extend_from_slice(&v.to_le_bytes());
            }
            data
        }
        (VR::UL, PrimitiveValue::U32(values)) => {
            let mut data = Vec::with_capacity(values.len() * 4);
            for v in values {
                data.extend_from_slice(&v.to_le_bytes());
            }
            data
        }
        (VR::US, _) => {
            let v = value.to_u16().with_context(|| IncompatibleValueSnafu {
                vr,
                value: value.clone(),
            })?;
            v.to_le_bytes().to_vec()
        }
        (VR::UL, _) => {
            let v = value.to_u32().with_context(|| IncompatibleValueSnafu {
                vr,
                value: value.clone(),
            })?;
            v.to_le_bytes().to_vec()
        }
        (VR::UN, PrimitiveValue::U8(bytes)) => bytes.to_vec(),
        (VR::SQ, value) => {
            return IncompatibleValueSnafu {
                vr,
                value: value.clone(),
            }
            .fail()
        }
        // the remaining representations are text on the wire
        (_, value) => value.to_str().into_owned().into_bytes(),
    };

    if data.len() % 2 != 0 {
        data.push(pad_byte(vr));
    }
    Ok(data)
}

fn pad_byte(vr: VR) -> u8 {
    match vr {
        // unique identifiers and binary data are padded with a zero byte
        VR::UI | VR::UN => 0x00,
        _ => b' ',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DataElement;

    #[test]
    fn even_length_padding() {
        let data =
            primitive_value_bytes(tags::PATIENT_NAME, VR::PN, &PrimitiveValue::from("DOE")).unwrap();
        assert_eq!(data, b"DOE ");

        let data = primitive_value_bytes(
            tags::STUDY_INSTANCE_UID,
            VR::UI,
            &PrimitiveValue::from("1.2.3"),
        )
        .unwrap();
        assert_eq!(data, b"1.2.3\0");
    }

    #[test]
    fn implicit_vr_element_layout() {
        let mut ds = Dataset::new();
        ds.put(DataElement::new(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "STUDY"));
        let data = encode_dataset(&ds, TransferSyntax::ImplicitVrLittleEndian).unwrap();
        assert_eq!(
            data,
            [
                0x08, 0x00, 0x52, 0x00, // tag (0008,0052)
                0x06, 0x00, 0x00, 0x00, // length 6
                b'S', b'T', b'U', b'D', b'Y', b' ', // padded value
            ],
        );
    }

    #[test]
    fn explicit_vr_element_layout() {
        let mut ds = Dataset::new();
        ds.put(DataElement::new(tags::MODALITIES_IN_STUDY, VR::CS, "CR"));
        let data = encode_dataset(&ds, TransferSyntax::ExplicitVrLittleEndian).unwrap();
        assert_eq!(
            data,
            [
                0x08, 0x00, 0x61, 0x00, // tag (0008,0061)
                b'C', b'S', // VR
                0x02, 0x00, // length 2
                b'C', b'R', // value
            ],
        );
    }

    #[test]
    fn binary_integer_values() {
        let mut ds = Dataset::new();
        ds.put(DataElement::new(tags::STATUS, VR::US, 0xFF00_u16));
        let data = encode_dataset(&ds, TransferSyntax::ImplicitVrLittleEndian).unwrap();
        assert_eq!(
            data,
            [
                0x00, 0x00, 0x00, 0x09, // tag (0000,0900)
                0x02, 0x00, 0x00, 0x00, // length 2
                0x00, 0xFF, // 0xFF00 in little endian
            ],
        );
    }
}
