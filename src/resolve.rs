use std::fmt;

use crate::heap::{Heap, HeapObject, TypeDescriptor};
use crate::InspectError;

/// Finds the object starting at `address`.
pub fn resolve<H: Heap + ?Sized>(heap: &H, address: u64) -> Result<HeapObject<'_>, InspectError> {
    heap.object_at(address)
        .ok_or(InspectError::ObjectNotFound(address))
}

/// A type's fields as `name type` rows, in declaration order, with the type
/// column aligned.
pub struct FieldSchema<'t> {
    rows: Vec<(&'t str, &'t str)>,
    name_width: usize,
}

pub fn field_schema(ty: &TypeDescriptor) -> FieldSchema<'_> {
    let rows = ty.fields.iter()
        .map(|f| (f.name.as_str(), f.type_name.as_str()))
        .collect::<Vec<_>>();
    let name_width = rows.iter()
        .map(|(name, _)| name.chars().count())
        .max()
        .unwrap_or(0);
    FieldSchema { rows, name_width }
}

impl FieldSchema<'_> {
    pub fn rows(&self) -> &[(&str, &str)] {
        &self.rows
    }

    pub fn name_width(&self) -> usize {
        self.name_width
    }
}

impl fmt::Display for FieldSchema<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let width = self.name_width;
        for (name, type_name) in &self.rows {
            writeln!(f, "{name:width$} {type_name}")?;
        }
        Ok(())
    }
}
