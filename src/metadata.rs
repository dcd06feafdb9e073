//! `heap.toml`: the type and object tables that go with a snapshot's memory.

use serde::Deserialize;

use crate::address::parse_address;
use crate::heap::{ElementType, FieldDescriptor, Storage, TypeDescriptor, TypeIdentity};
use crate::SnapshotError;

pub const METADATA_FILE: &str = "heap.toml";

fn yes() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHeap {
    #[serde(default = "yes")]
    can_walk_heap: bool,
    #[serde(default)]
    types: Vec<RawType>,
    #[serde(default)]
    objects: Vec<RawObject>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawType {
    id: String,
    name: String,
    #[serde(default)]
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    name: String,
    kind: RawKind,
    element: Option<String>,
    #[serde(rename = "type")]
    type_name: String,
    type_id: Option<String>,
    offset: u64,
    size: Option<usize>,
}

#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawKind {
    Primitive,
    Reference,
    Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawObject {
    address: String,
    #[serde(rename = "type")]
    type_id: String,
}

/// Heap metadata after validation.
#[derive(Debug)]
pub struct HeapMetadata {
    pub can_walk_heap: bool,
    pub types: Vec<TypeDescriptor>,
    /// In enumeration order.
    pub objects: Vec<(u64, TypeIdentity)>,
}

pub fn parse_metadata(text: &str) -> Result<HeapMetadata, SnapshotError> {
    let raw: RawHeap = toml::from_str(text).map_err(SnapshotError::MetadataToml)?;

    let types = raw.types.into_iter()
        .map(|t| -> Result<TypeDescriptor, SnapshotError> {
            let fields = t.fields.into_iter()
                .map(|f| field(&t.name, f))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(TypeDescriptor {
                identity: TypeIdentity(hex(&t.id)?),
                name: t.name,
                fields,
            })
        })
        .collect::<Result<_, SnapshotError>>()?;

    let objects = raw.objects.iter()
        .map(|o| Ok::<_, SnapshotError>((hex(&o.address)?, TypeIdentity(hex(&o.type_id)?))))
        .collect::<Result<_, _>>()?;

    Ok(HeapMetadata {
        can_walk_heap: raw.can_walk_heap,
        types,
        objects,
    })
}

fn hex(text: &str) -> Result<u64, SnapshotError> {
    parse_address(text).map_err(|_| SnapshotError::BadHex(text.to_string()))
}

fn field(ty: &str, f: RawField) -> Result<FieldDescriptor, SnapshotError> {
    let storage = match f.kind {
        RawKind::Primitive => {
            let Some(element) = &f.element else {
                return Err(SnapshotError::MissingElement { ty: ty.to_string(), field: f.name });
            };
            let Some(e) = ElementType::from_name(element) else {
                return Err(SnapshotError::UnknownElement {
                    ty: ty.to_string(),
                    field: f.name,
                    element: element.clone(),
                });
            };
            Storage::Primitive(e)
        }
        RawKind::Reference => Storage::Reference,
        RawKind::Value => Storage::Value,
    };
    let size = match (storage, f.size) {
        (_, Some(size)) => size,
        (Storage::Primitive(e), None) => e.byte_size(),
        (Storage::Reference, None) => 8,
        (Storage::Value, None) => {
            return Err(SnapshotError::MissingSize { ty: ty.to_string(), field: f.name });
        }
    };
    let type_id = f.type_id.as_deref().map(hex).transpose()?.map(TypeIdentity);

    Ok(FieldDescriptor {
        name: f.name,
        storage,
        type_name: f.type_name,
        type_id,
        offset: f.offset,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[types]]
        id = "7ff8a0001000"
        name = "Shop.Order"

        [[types.fields]]
        name = "_count"
        kind = "primitive"
        element = "Int32"
        type = "System.Int32"
        offset = 8

        [[types.fields]]
        name = "<Placed>k__BackingField"
        kind = "value"
        type = "System.DateTime"
        type_id = "7ff8a0002000"
        offset = 16
        size = 8

        [[types.fields]]
        name = "_next"
        kind = "reference"
        type = "Shop.Order"
        offset = 24

        [[objects]]
        address = "0x20001000"
        type = "7ff8a0001000"
    "#;

    #[test]
    fn parses_types_and_objects() {
        let meta = parse_metadata(SAMPLE).unwrap();
        assert!(meta.can_walk_heap);
        assert_eq!(meta.objects, [(0x2000_1000, TypeIdentity(0x7ff8_a000_1000))]);

        let ty = &meta.types[0];
        assert_eq!(ty.name, "Shop.Order");
        let names = ty.fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["_count", "<Placed>k__BackingField", "_next"]);

        assert_eq!(ty.fields[0].storage, Storage::Primitive(ElementType::Int32));
        assert_eq!(ty.fields[0].size, 4);
        assert_eq!(ty.fields[1].type_id, Some(TypeIdentity(0x7ff8_a000_2000)));
        assert_eq!(ty.fields[2].storage, Storage::Reference);
        assert_eq!(ty.fields[2].size, 8);
    }

    #[test]
    fn rejects_bad_metadata() {
        let unknown_element = r#"
            [[types]]
            id = "10"
            name = "T"
            [[types.fields]]
            name = "s"
            kind = "primitive"
            element = "String"
            type = "System.String"
            offset = 8
        "#;
        assert!(matches!(parse_metadata(unknown_element), Err(SnapshotError::UnknownElement { .. })));

        let sizeless_value = r#"
            [[types]]
            id = "10"
            name = "T"
            [[types.fields]]
            name = "g"
            kind = "value"
            type = "System.Guid"
            offset = 8
        "#;
        assert!(matches!(parse_metadata(sizeless_value), Err(SnapshotError::MissingSize { .. })));

        let bad_address = r#"
            [[objects]]
            address = "nope"
            type = "10"
        "#;
        assert!(matches!(parse_metadata(bad_address), Err(SnapshotError::BadHex(s)) if s == "nope"));

        assert!(matches!(parse_metadata("can_walk_heap = 3"), Err(SnapshotError::MetadataToml(_))));
    }

    #[test]
    fn walkability_can_be_turned_off() {
        assert!(!parse_metadata("can_walk_heap = false").unwrap().can_walk_heap);
        assert!(parse_metadata("").unwrap().can_walk_heap);
    }
}
