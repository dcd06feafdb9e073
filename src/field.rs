use crate::heap::{ElementType, FieldDescriptor, Storage};

/// Declared type name of the runtime's wall-clock timestamp.
pub const TIMESTAMP_TYPE_NAME: &str = "System.DateTime";

/// Compiler-generated suffix on auto-property backing fields.
pub const BACKING_FIELD_SUFFIX: &str = "k__BackingField";

/// How a field gets decoded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Primitive(ElementType),
    ObjectReference,
    InlineValue { timestamp: bool },
}

/// Classifies from metadata alone; the field's bytes are never consulted.
pub fn classify(field: &FieldDescriptor) -> FieldKind {
    match field.storage {
        Storage::Primitive(e) => FieldKind::Primitive(e),
        Storage::Reference => FieldKind::ObjectReference,
        Storage::Value => FieldKind::InlineValue {
            timestamp: field.type_name == TIMESTAMP_TYPE_NAME,
        },
    }
}

/// Name to show for a field. Lookups always use the raw name.
pub fn display_name(raw: &str) -> &str {
    raw.strip_suffix(BACKING_FIELD_SUFFIX).unwrap_or(raw)
}
