//! Decoding field values straight out of memory.

use std::fmt;

use crate::address::format_address;
use crate::field::{classify, display_name, FieldKind};
use crate::heap::{read_exact, ElementType, FieldDescriptor, Heap, HeapObject, MemoryReader};
use crate::timestamp::{self, Timestamp};
use crate::InspectError;

/// One field of one object, ready to print.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DecodedField {
    /// The object's type has no field by this (raw) name.
    Missing(String),
    Value {
        name: String,
        /// Read failures print as an empty value.
        value: Result<String, InspectError>,
        /// Printed in parentheses after the value, if present.
        annotation: Option<String>,
    },
}

impl fmt::Display for DecodedField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodedField::Missing(name) => f.write_str(name),
            DecodedField::Value { name, value, annotation } => {
                write!(f, "{name}:")?;
                if let Ok(v) = value {
                    f.write_str(v)?;
                }
                if let Some(a) = annotation {
                    write!(f, "({a})")?;
                }
                Ok(())
            }
        }
    }
}

/// Decodes the field named `field_name` (raw name, not display name) of
/// `object`.
///
/// Primitives, references and timestamps are read through `heap`; other
/// inline values are dumped through `memory`, and come out empty without it.
pub fn decode<H: Heap + ?Sized>(
    heap: &H,
    memory: Option<&dyn MemoryReader>,
    object: HeapObject<'_>,
    field_name: &str,
) -> DecodedField {
    let Some(field) = object.ty.field_by_name(field_name) else {
        return DecodedField::Missing(field_name.to_string());
    };
    let location = object.address.wrapping_add(field.offset);

    let (value, annotation) = match classify(field) {
        FieldKind::Primitive(e) => (read_primitive(heap, location, e), Some(e.name().to_string())),
        FieldKind::ObjectReference => (read_reference(heap, location), Some(field.type_name.clone())),
        FieldKind::InlineValue { timestamp: false } => {
            (dump_bytes(memory, location, field.size), Some(field.type_name.clone()))
        }
        FieldKind::InlineValue { timestamp: true } => (read_timestamp(heap, field, location), None),
    };

    DecodedField::Value {
        name: display_name(&field.name).to_string(),
        value,
        annotation,
    }
}

/// Decodes each requested field in the order given.
pub fn decode_fields<H: Heap + ?Sized, S: AsRef<str>>(
    heap: &H,
    memory: Option<&dyn MemoryReader>,
    object: HeapObject<'_>,
    field_names: &[S],
) -> Vec<DecodedField> {
    field_names
        .iter()
        .map(|name| decode(heap, memory, object, name.as_ref()))
        .collect()
}

fn read_primitive(
    reader: &(impl MemoryReader + ?Sized),
    address: u64,
    element: ElementType,
) -> Result<String, InspectError> {
    let width = element.byte_size();
    // Little-endian, so a short element lands zero-extended in the low bytes.
    let mut buf = [0u8; 8];
    match reader.read_memory(address, &mut buf[..width]) {
        Some(n) if n == width => (),
        _ => return Err(InspectError::MemoryUnavailable { address, len: width }),
    }
    Ok(format_primitive(element, u64::from_le_bytes(buf)))
}

fn format_primitive(element: ElementType, raw: u64) -> String {
    match element {
        ElementType::Boolean => (if raw != 0 { "True" } else { "False" }).to_string(),
        ElementType::Char => char::from_u32(raw as u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER)
            .to_string(),
        ElementType::Int8 => (raw as u8 as i8).to_string(),
        ElementType::UInt8 => (raw as u8).to_string(),
        ElementType::Int16 => (raw as u16 as i16).to_string(),
        ElementType::UInt16 => (raw as u16).to_string(),
        ElementType::Int32 => (raw as u32 as i32).to_string(),
        ElementType::UInt32 => (raw as u32).to_string(),
        ElementType::Int64 | ElementType::NativeInt => (raw as i64).to_string(),
        ElementType::UInt64 | ElementType::NativeUInt => raw.to_string(),
        ElementType::Float => f32::from_bits(raw as u32).to_string(),
        ElementType::Double => f64::from_bits(raw).to_string(),
    }
}

/// Only the pointer is read; the referent is left alone.
fn read_reference(
    reader: &(impl MemoryReader + ?Sized),
    address: u64,
) -> Result<String, InspectError> {
    let ptr = read_exact::<8, _>(reader, address)
        .ok_or(InspectError::MemoryUnavailable { address, len: 8 })?;
    Ok(format_address(u64::from_le_bytes(ptr)))
}

/// Uppercase hex of however many bytes could be read.
fn dump_bytes(
    memory: Option<&dyn MemoryReader>,
    address: u64,
    size: usize,
) -> Result<String, InspectError> {
    let unavailable = InspectError::MemoryUnavailable { address, len: size };
    let memory = memory.ok_or_else(|| unavailable.clone())?;
    let mut buf = vec![0; size];
    let n = memory.read_memory(address, &mut buf).ok_or(unavailable)?;
    Ok(buf[..n].iter().map(|b| format!("{b:02X}")).collect())
}

fn read_timestamp<H: Heap + ?Sized>(
    heap: &H,
    field: &FieldDescriptor,
    address: u64,
) -> Result<String, InspectError> {
    let data = field
        .type_id
        .and_then(|id| heap.type_by_identity(id))
        .and_then(|ty| ty.field_by_name(timestamp::BACKING_FIELD))
        .ok_or_else(|| InspectError::FieldUnknown {
            ty: field.type_name.clone(),
            field: timestamp::BACKING_FIELD.to_string(),
        })?;
    let address = address.wrapping_add(data.offset);
    let packed = read_exact::<8, _>(heap, address)
        .ok_or(InspectError::MemoryUnavailable { address, len: 8 })?;
    Ok(Timestamp::unpack(u64::from_le_bytes(packed)).to_string())
}
