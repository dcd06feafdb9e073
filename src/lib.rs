use std::{io::{Read, Seek}, ops::RangeInclusive, collections::BTreeMap, rc::Rc};

use rangemap::RangeInclusiveMap;
use regex::Regex;
use thiserror::Error;

pub mod address;
pub mod decode;
pub mod dump;
pub mod field;
pub mod heap;
pub mod metadata;
pub mod report;
pub mod resolve;
pub mod scan;
pub mod timestamp;

use heap::{Heap, HeapObject, MemoryReader, TypeDescriptor, TypeIdentity};
use metadata::{parse_metadata, HeapMetadata, METADATA_FILE};

pub const FORMAT_VERSION: u64 = 1;

/// Zip comment identifying a snapshot archive.
pub fn snapshot_comment() -> String {
    format!("heapdbg snapshot v{FORMAT_VERSION}")
}

/// Loads a snapshot archive: memory segments under `seg/`, heap metadata in
/// `heap.toml`.
pub fn load_snapshot<F: Read + Seek>(
    source: F,
) -> Result<HeapSnapshot, SnapshotError> {
    let segname = Regex::new(r#"^([0-9a-fA-F]+)@([0-9a-fA-F]+)\.bin$"#).unwrap();
    let comment_pattern = Regex::new(r#"^heapdbg snapshot v([0-9]+)$"#).unwrap();
    let mut archive = zip::ZipArchive::new(source)?;
    let comment = std::str::from_utf8(archive.comment())
        .map_err(|_| SnapshotError::NotASnapshot)?;
    let comment_parts = comment_pattern.captures(comment)
        .ok_or(SnapshotError::NotASnapshot)?;

    let format_version = comment_parts[1].parse::<u64>()
        .map_err(|_| SnapshotError::NotASnapshot)?;
    match format_version {
        FORMAT_VERSION => (),
        _ => return Err(SnapshotError::UnsupportedVersion(format_version)),
    }

    let mut segment_files = vec![];
    let mut metadata = None;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = file.name().to_string();
        if let Some(("seg", rest)) = name.split_once('/') {
            if let Some(c) = segname.captures(rest) {
                if let Ok(address) = u64::from_str_radix(&c[1], 16) {
                    if let Ok(order) = u64::from_str_radix(&c[2], 16) {
                        let mut data = vec![];
                        file.read_to_end(&mut data)?;
                        segment_files.push((order, address, i, name, data));
                    }
                }
            }
        } else if name == METADATA_FILE {
            let mut contents = vec![];
            file.read_to_end(&mut contents)?;
            let contents = std::str::from_utf8(&contents).map_err(SnapshotError::MetadataUtf8)?;
            metadata = Some(parse_metadata(contents)?);
        }
    }

    let metadata = metadata.ok_or(SnapshotError::NoMetadata)?;
    let mut snapshot = HeapSnapshot::from_metadata(metadata)?;
    snapshot.format_version = format_version;

    // Insert low orders first so higher orders overwrite them.
    segment_files.sort_unstable_by_key(|(order, address, index, _, _)| (*order, *address, *index));
    for (order, address, _, name, data) in segment_files {
        snapshot.insert_segment_with_order(address, data, name, order);
    }

    Ok(snapshot)
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("this file is a ZIP file, but is not a snapshot")]
    NotASnapshot,
    #[error("snapshot is format version {0}, which we don't understand")]
    UnsupportedVersion(u64),
    #[error("ZIP file access or format error")]
    Zip(#[from] zip::result::ZipError),
    #[error("snapshot has no heap.toml")]
    NoMetadata,
    #[error("could not load heap metadata as UTF-8")]
    MetadataUtf8(#[source] std::str::Utf8Error),
    #[error("could not parse heap metadata as TOML")]
    MetadataToml(#[source] toml::de::Error),
    #[error("expected hexadecimal in heap metadata, got {0:?}")]
    BadHex(String),
    #[error("primitive field {ty}::{field} has no element type")]
    MissingElement { ty: String, field: String },
    #[error("field {ty}::{field} has unsupported element type {element:?}")]
    UnknownElement { ty: String, field: String, element: String },
    #[error("value field {ty}::{field} has no size")]
    MissingSize { ty: String, field: String },
    #[error("type {0} is defined more than once")]
    DuplicateType(TypeIdentity),
    #[error("object at {address:#x} has undefined type {ty}")]
    UnknownObjectType { address: u64, ty: TypeIdentity },
    #[error("more than one object at {0:#x}")]
    DuplicateObject(u64),
    #[error("problem accessing file within ZIP archive")]
    Io(#[from] std::io::Error),
}

/// Things that can go wrong while inspecting a heap. None of them are fatal;
/// see [`dump::dump`] for how each one is reported.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InspectError {
    #[error("Hexadecimal address expected.")]
    NotHexadecimal(String),
    #[error("no object at {0:016x}")]
    ObjectNotFound(u64),
    #[error("Address is not a type identity.")]
    TypeIdentityUnresolved(TypeIdentity),
    #[error("type {ty} has no field {field}")]
    FieldUnknown { ty: String, field: String },
    #[error("can't read {len} bytes at {address:016x}")]
    MemoryUnavailable { address: u64, len: usize },
}

/// A loaded heap snapshot: type and object tables plus captured memory.
pub struct HeapSnapshot {
    format_version: u64,
    can_walk_heap: bool,
    types: BTreeMap<TypeIdentity, TypeDescriptor>,
    /// Enumeration order.
    objects: Vec<(u64, TypeIdentity)>,
    objects_by_address: BTreeMap<u64, TypeIdentity>,
    segments: RangeInclusiveMap<u64, Segment>,
    next_order: u64,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Segment {
    pub range: RangeInclusive<u64>,
    pub order: u64,
    pub name: String,
    data: Rc<[u8]>,
}

impl HeapSnapshot {
    /// Builds a snapshot with no memory. Every object's type must be among
    /// `types`, and no two objects may share an address.
    pub fn new(
        types: impl IntoIterator<Item = TypeDescriptor>,
        objects: impl IntoIterator<Item = (u64, TypeIdentity)>,
    ) -> Result<Self, SnapshotError> {
        let mut type_map = BTreeMap::new();
        for ty in types {
            let identity = ty.identity;
            if type_map.insert(identity, ty).is_some() {
                return Err(SnapshotError::DuplicateType(identity));
            }
        }

        let objects = objects.into_iter().collect::<Vec<_>>();
        let mut objects_by_address = BTreeMap::new();
        for &(address, ty) in &objects {
            if !type_map.contains_key(&ty) {
                return Err(SnapshotError::UnknownObjectType { address, ty });
            }
            if objects_by_address.insert(address, ty).is_some() {
                return Err(SnapshotError::DuplicateObject(address));
            }
        }

        Ok(Self {
            format_version: FORMAT_VERSION,
            can_walk_heap: true,
            types: type_map,
            objects,
            objects_by_address,
            segments: RangeInclusiveMap::new(),
            next_order: 0,
        })
    }

    pub fn from_metadata(metadata: HeapMetadata) -> Result<Self, SnapshotError> {
        let mut snapshot = Self::new(metadata.types, metadata.objects)?;
        snapshot.can_walk_heap = metadata.can_walk_heap;
        Ok(snapshot)
    }

    pub fn format_version(&self) -> u64 {
        self.format_version
    }

    pub fn set_can_walk_heap(&mut self, can_walk_heap: bool) {
        self.can_walk_heap = can_walk_heap;
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn ranges(&self) -> impl Iterator<Item = (RangeInclusive<u64>, &Segment)> {
        self.segments.iter().map(|(r, s)| (r.clone(), s))
    }

    /// Adds memory at `address`, on top of (and hiding) anything already
    /// loaded there. Empty data is ignored.
    pub fn insert_segment(&mut self, address: u64, data: Vec<u8>, name: impl Into<String>) {
        let order = self.next_order;
        self.insert_segment_with_order(address, data, name.into(), order);
    }

    fn insert_segment_with_order(&mut self, address: u64, data: Vec<u8>, name: String, order: u64) {
        let Some(size_m1) = u64::try_from(data.len()).ok().and_then(|n| n.checked_sub(1)) else {
            return;
        };
        let Some(end) = address.checked_add(size_m1) else {
            return;
        };
        self.next_order = self.next_order.max(order.saturating_add(1));
        let range = address..=end;
        self.segments.insert(range.clone(), Segment {
            range,
            order,
            name,
            data: data.into(),
        });
    }

    /// Copies memory into `dest`, stopping at the first byte not covered by
    /// any segment. Returns how many bytes were copied.
    pub fn read(&self, address: u64, dest: &mut [u8]) -> usize {
        let Ok(len) = u64::try_from(dest.len()) else {
            return 0;
        };
        if len == 0 {
            return 0;
        }
        let requested_end = address.saturating_add(len - 1);
        let requested_range = address..=requested_end;
        // Truncate the read at the first gap.
        let end = match self.segments.gaps(&requested_range).next() {
            Some(gap) if *gap.start() == address => return 0,
            Some(gap) => *gap.start() - 1,
            None => requested_end,
        };

        let mut address = address;
        let mut copied = 0;
        for (overlap_range, segment) in self.segments.overlapping(&(address..=end)) {
            // A segment may be split by a later one laid over it, so the
            // offset is from the segment's own start, not the overlap's.
            let segment_offset = (address - segment.range.start()) as usize;
            let overlap_end = u64::min(*overlap_range.end(), end);
            let chunk_len = (overlap_end - address + 1) as usize;
            dest[copied..copied + chunk_len]
                .copy_from_slice(&segment.data[segment_offset..segment_offset + chunk_len]);
            copied += chunk_len;
            if overlap_end == end {
                break;
            }
            address = overlap_end + 1;
        }
        copied
    }

    fn object(&self, address: u64, ty: TypeIdentity) -> Option<HeapObject<'_>> {
        Some(HeapObject { address, ty: self.types.get(&ty)? })
    }
}

impl MemoryReader for HeapSnapshot {
    fn read_memory(&self, address: u64, dest: &mut [u8]) -> Option<usize> {
        match self.read(address, dest) {
            0 if !dest.is_empty() => None,
            n => Some(n),
        }
    }
}

impl Heap for HeapSnapshot {
    fn can_walk_heap(&self) -> bool {
        self.can_walk_heap
    }

    fn objects(&self) -> Box<dyn Iterator<Item = HeapObject<'_>> + '_> {
        Box::new(self.objects.iter().filter_map(|&(a, t)| self.object(a, t)))
    }

    fn object_at(&self, address: u64) -> Option<HeapObject<'_>> {
        let &ty = self.objects_by_address.get(&address)?;
        self.object(address, ty)
    }

    fn type_by_identity(&self, identity: TypeIdentity) -> Option<&TypeDescriptor> {
        self.types.get(&identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> HeapSnapshot {
        HeapSnapshot::new(Vec::<TypeDescriptor>::new(), Vec::<(u64, TypeIdentity)>::new()).unwrap()
    }

    #[test]
    fn reads_across_adjacent_segments() {
        let mut snap = empty();
        snap.insert_segment(0x100, vec![1, 2, 3, 4], "a");
        snap.insert_segment(0x104, vec![5, 6], "b");
        let mut buf = [0; 6];
        assert_eq!(snap.read(0x101, &mut buf[..5]), 5);
        assert_eq!(buf[..5], [2, 3, 4, 5, 6]);
    }

    #[test]
    fn reads_stop_at_gaps() {
        let mut snap = empty();
        snap.insert_segment(0x100, vec![1, 2, 3, 4], "a");
        snap.insert_segment(0x108, vec![9, 9], "b");
        let mut buf = [0; 8];
        assert_eq!(snap.read(0x102, &mut buf), 2);
        assert_eq!(buf[..2], [3, 4]);
        assert_eq!(snap.read(0x104, &mut buf), 0);
        assert_eq!(snap.read_memory(0x104, &mut buf), None);
        assert_eq!(snap.read_memory(0x104, &mut []), Some(0));
    }

    #[test]
    fn later_segments_hide_earlier_ones() {
        let mut snap = empty();
        snap.insert_segment(0x100, vec![1; 8], "base");
        snap.insert_segment(0x102, vec![7, 7], "patch");
        let mut buf = [0; 8];
        assert_eq!(snap.read(0x100, &mut buf), 8);
        assert_eq!(buf, [1, 1, 7, 7, 1, 1, 1, 1]);
    }

    #[test]
    fn object_tables_are_validated() {
        let ty = TypeDescriptor { identity: TypeIdentity(1), name: "T".into(), fields: vec![] };
        assert!(matches!(
            HeapSnapshot::new([ty.clone(), ty.clone()], Vec::<(u64, TypeIdentity)>::new()),
            Err(SnapshotError::DuplicateType(TypeIdentity(1))),
        ));
        assert!(matches!(
            HeapSnapshot::new([ty.clone()], [(0x10, TypeIdentity(2))]),
            Err(SnapshotError::UnknownObjectType { address: 0x10, .. }),
        ));
        assert!(matches!(
            HeapSnapshot::new([ty], [(0x10, TypeIdentity(1)), (0x10, TypeIdentity(1))]),
            Err(SnapshotError::DuplicateObject(0x10)),
        ));
    }
}
