//! The `dump` command: show one object, or every object of a type.

use std::io::{self, Write};

use crate::address::parse_address;
use crate::decode::decode_fields;
use crate::heap::{Heap, HeapObject, MemoryReader, TypeIdentity};
use crate::report::Report;
use crate::resolve::{field_schema, resolve};
use crate::scan::scan_by_type;
use crate::InspectError;

/// Arguments to [`dump`], as text straight from the user.
#[derive(Clone, Debug, Default)]
pub struct DumpOptions {
    /// Address of the object to show.
    pub address: Option<String>,
    /// Comma separated raw field names.
    pub fields: Option<String>,
    /// Type identity whose instances should all be shown.
    pub by_type: Option<String>,
}

impl DumpOptions {
    /// Requested field names in the order given. Blank entries are dropped.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.as_deref()
            .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// Runs a dump.
///
/// Bad input is reported and skipped; the address part and the by-type part
/// run independently of each other. Only a heap that can't be walked stops
/// everything.
pub fn dump<H: Heap + ?Sized, W: Write>(
    heap: &H,
    memory: Option<&dyn MemoryReader>,
    options: &DumpOptions,
    report: &mut Report<W>,
) -> io::Result<()> {
    report.note("dump invoked")?;

    let fields = options.field_names();
    let can_walk = heap.can_walk_heap();
    report.note(format_args!("Can walk heap: {can_walk}"))?;

    if can_walk {
        let object = object_by_address(heap, options.address.as_deref(), &fields, report)?;
        match object {
            Some(object) => report.fields(&decode_fields(heap, memory, object, &fields))?,
            None => report.note("No object resolved...")?,
        }
        all_objects_by_type(heap, memory, options.by_type.as_deref(), &fields, report)?;
    }

    report.note("dump finished")
}

/// Resolves the object, printing its schema if no fields were asked for.
fn object_by_address<'h, H: Heap + ?Sized, W: Write>(
    heap: &'h H,
    address: Option<&str>,
    fields: &[&str],
    report: &mut Report<W>,
) -> io::Result<Option<HeapObject<'h>>> {
    let Some(address) = address.filter(|a| !a.is_empty()) else {
        report.note("Address is not specified...")?;
        return Ok(None);
    };
    let Ok(address) = parse_address(address) else {
        report.error("Hexadecimal address expected...")?;
        return Ok(None);
    };
    let object = match resolve(heap, address) {
        Ok(o) => o,
        Err(e) => {
            report.note(e)?;
            return Ok(None);
        }
    };

    if fields.is_empty() {
        report.line(format_args!("The object's type name is: {}", object.ty.name))?;
        report.write(field_schema(object.ty))?;
    }
    Ok(Some(object))
}

fn all_objects_by_type<H: Heap + ?Sized, W: Write>(
    heap: &H,
    memory: Option<&dyn MemoryReader>,
    by_type: Option<&str>,
    fields: &[&str],
    report: &mut Report<W>,
) -> io::Result<()> {
    let Some(by_type) = by_type.filter(|t| !t.is_empty()) else {
        report.note("Type identity is not specified...")?;
        return Ok(());
    };
    let scan = match parse_address(by_type)
        .and_then(|id| scan_by_type(heap, TypeIdentity(id)))
    {
        Ok(scan) => scan,
        Err(e @ (InspectError::NotHexadecimal(_) | InspectError::TypeIdentityUnresolved(_))) => {
            return report.error(e);
        }
        Err(e) => return report.note(e),
    };

    report.note(format_args!("All objects of type: {}", scan.ty().name))?;
    for object in scan {
        report.write(format_args!("{:016X} ", object.address))?;
        report.fields(&decode_fields(heap, memory, object, fields))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{ElementType, FieldDescriptor, Storage, TypeDescriptor};
    use crate::HeapSnapshot;

    const FOO: TypeIdentity = TypeIdentity(0xF00);
    const BAR: TypeIdentity = TypeIdentity(0xBA4);

    fn snapshot() -> HeapSnapshot {
        let foo = TypeDescriptor {
            identity: FOO,
            name: "Foo".into(),
            fields: vec![
                FieldDescriptor {
                    name: "Count".into(),
                    storage: Storage::Primitive(ElementType::Int32),
                    type_name: "System.Int32".into(),
                    type_id: None,
                    offset: 8,
                    size: 4,
                },
                FieldDescriptor {
                    name: "Next".into(),
                    storage: Storage::Reference,
                    type_name: "Foo".into(),
                    type_id: Some(FOO),
                    offset: 16,
                    size: 8,
                },
            ],
        };
        let bar = TypeDescriptor { identity: BAR, name: "Bar".into(), fields: vec![] };

        let object = |count: i32, next: u64| {
            let mut mem = vec![0u8; 24];
            mem[8..12].copy_from_slice(&count.to_le_bytes());
            mem[16..24].copy_from_slice(&next.to_le_bytes());
            mem
        };

        let mut snap = HeapSnapshot::new(
            [foo, bar],
            [(0x1000, FOO), (0x1800, BAR), (0x2000, FOO)],
        )
        .unwrap();
        snap.insert_segment(0x1000, object(5, 0x2000), "a");
        snap.insert_segment(0x2000, object(-7, 0), "b");
        snap
    }

    fn run(snap: &HeapSnapshot, options: DumpOptions, verbose: bool) -> String {
        let mut report = Report::new(vec![]).with_verbose(verbose);
        dump(snap, Some(snap), &options, &mut report).unwrap();
        String::from_utf8(report.into_inner()).unwrap()
    }

    fn opts(address: Option<&str>, fields: Option<&str>, by_type: Option<&str>) -> DumpOptions {
        DumpOptions {
            address: address.map(String::from),
            fields: fields.map(String::from),
            by_type: by_type.map(String::from),
        }
    }

    #[test]
    fn decodes_requested_fields_of_one_object() {
        let out = run(&snapshot(), opts(Some("1000"), Some("Count,Next"), None), false);
        assert_eq!(out, "Count:5(Int32) Next:0000000000002000(Foo) \n");
    }

    #[test]
    fn no_fields_prints_schema() {
        let out = run(&snapshot(), opts(Some("0x1000"), None, None), false);
        assert_eq!(
            out,
            "The object's type name is: Foo\n\
             Count System.Int32\n\
             Next  Foo\n\
             \n",
        );
    }

    #[test]
    fn nothing_requested_prints_only_notes() {
        let snap = snapshot();
        assert_eq!(run(&snap, DumpOptions::default(), false), "");
        assert_eq!(
            run(&snap, DumpOptions::default(), true),
            "dump invoked\n\
             Can walk heap: true\n\
             Address is not specified...\n\
             No object resolved...\n\
             Type identity is not specified...\n\
             dump finished\n",
        );
    }

    #[test]
    fn bad_address_does_not_stop_the_scan() {
        let out = run(&snapshot(), opts(Some("zz"), Some("Count"), Some("f00")), false);
        assert_eq!(
            out,
            "Error: Hexadecimal address expected...\n\
             0000000000001000 Count:5(Int32) \n\
             0000000000002000 Count:-7(Int32) \n",
        );
    }

    #[test]
    fn missing_object_is_a_note() {
        let snap = snapshot();
        assert_eq!(run(&snap, opts(Some("1004"), Some("Count"), None), false), "");
        let out = run(&snap, opts(Some("1004"), Some("Count"), None), true);
        assert!(out.contains("no object at 0000000000001004\nNo object resolved...\n"), "{out}");
    }

    #[test]
    fn scan_lists_addresses_without_fields() {
        let out = run(&snapshot(), opts(None, None, Some("0xF00")), true);
        assert!(
            out.contains("All objects of type: Foo\n0000000000001000 \n0000000000002000 \n"),
            "{out}",
        );
    }

    #[test]
    fn scan_reports_unknown_and_malformed_types() {
        let snap = snapshot();
        assert_eq!(
            run(&snap, opts(None, Some("Count"), Some("abc")), false),
            "Error: Address is not a type identity.\n",
        );
        assert_eq!(
            run(&snap, opts(None, Some("Count"), Some("mt")), false),
            "Error: Hexadecimal address expected.\n",
        );
        assert_eq!(
            run(&snap, opts(None, Some("Count"), Some("bf00")), false),
            "Error: Address is not a type identity.\n",
        );
        // Bar has no Count field.
        assert_eq!(
            run(&snap, opts(None, Some("Count"), Some("ba4")), false),
            "0000000000001800 Count\n",
        );
    }

    #[test]
    fn unknown_fields_stay_in_place() {
        let out = run(&snapshot(), opts(Some("2000"), Some("Nope,Count"), None), false);
        assert_eq!(out, "NopeCount:-7(Int32) \n");
    }

    #[test]
    fn unwalkable_heap_does_nothing() {
        let mut snap = snapshot();
        snap.set_can_walk_heap(false);
        assert_eq!(run(&snap, opts(Some("1000"), Some("Count"), Some("f00")), false), "");
        assert_eq!(
            run(&snap, opts(Some("1000"), Some("Count"), Some("f00")), true),
            "dump invoked\nCan walk heap: false\ndump finished\n",
        );
    }

    #[test]
    fn field_list_parsing_keeps_order() {
        let o = opts(None, Some("b, a,,c"), None);
        assert_eq!(o.field_names(), ["b", "a", "c"]);
        assert!(opts(None, Some(""), None).field_names().is_empty());
        assert!(DumpOptions::default().field_names().is_empty());
    }
}
