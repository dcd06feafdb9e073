//! Heap model: the types and traits the inspection code is written against.
//!
//! Anything that can enumerate objects and read memory can be inspected; the
//! zip-backed [`crate::HeapSnapshot`] is one such thing.

use std::fmt;

/// Stable pointer-sized value naming a type (the runtime's method table).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TypeIdentity(pub u64);

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Primitive element types a field can be stored as.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ElementType {
    Boolean,
    Char,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    NativeInt,
    NativeUInt,
}

impl ElementType {
    pub const ALL: [ElementType; 14] = [
        ElementType::Boolean,
        ElementType::Char,
        ElementType::Int8,
        ElementType::UInt8,
        ElementType::Int16,
        ElementType::UInt16,
        ElementType::Int32,
        ElementType::UInt32,
        ElementType::Int64,
        ElementType::UInt64,
        ElementType::Float,
        ElementType::Double,
        ElementType::NativeInt,
        ElementType::NativeUInt,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ElementType::Boolean => "Boolean",
            ElementType::Char => "Char",
            ElementType::Int8 => "Int8",
            ElementType::UInt8 => "UInt8",
            ElementType::Int16 => "Int16",
            ElementType::UInt16 => "UInt16",
            ElementType::Int32 => "Int32",
            ElementType::UInt32 => "UInt32",
            ElementType::Int64 => "Int64",
            ElementType::UInt64 => "UInt64",
            ElementType::Float => "Float",
            ElementType::Double => "Double",
            ElementType::NativeInt => "NativeInt",
            ElementType::NativeUInt => "NativeUInt",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }

    /// Width in bytes. Native integers assume a 64-bit target.
    pub fn byte_size(self) -> usize {
        match self {
            ElementType::Boolean | ElementType::Int8 | ElementType::UInt8 => 1,
            ElementType::Char | ElementType::Int16 | ElementType::UInt16 => 2,
            ElementType::Int32 | ElementType::UInt32 | ElementType::Float => 4,
            ElementType::Int64
            | ElementType::UInt64
            | ElementType::Double
            | ElementType::NativeInt
            | ElementType::NativeUInt => 8,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a field's contents are stored, as reported by type metadata.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Storage {
    Primitive(ElementType),
    Reference,
    Value,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub storage: Storage,
    /// Fully qualified name of the declared type.
    pub type_name: String,
    /// Identity of the declared type, when the metadata knows it. Needed to
    /// look inside value types.
    pub type_id: Option<TypeIdentity>,
    /// Offset from the start of the containing object (or value).
    pub offset: u64,
    pub size: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TypeDescriptor {
    pub identity: TypeIdentity,
    pub name: String,
    /// In declaration order.
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A live object in a heap. Borrowed from the heap that produced it.
#[derive(Copy, Clone, Debug)]
pub struct HeapObject<'h> {
    pub address: u64,
    pub ty: &'h TypeDescriptor,
}

/// Raw memory access.
pub trait MemoryReader {
    /// Copies memory starting at `address` into `dest`. Returns the number of
    /// bytes copied, which may be short, or `None` if nothing was readable.
    fn read_memory(&self, address: u64, dest: &mut [u8]) -> Option<usize>;
}

/// A walkable object heap.
pub trait Heap: MemoryReader {
    fn can_walk_heap(&self) -> bool;

    /// All live objects, in the heap's native order.
    fn objects(&self) -> Box<dyn Iterator<Item = HeapObject<'_>> + '_>;

    /// The object starting exactly at `address`, if there is one.
    fn object_at(&self, address: u64) -> Option<HeapObject<'_>>;

    fn type_by_identity(&self, identity: TypeIdentity) -> Option<&TypeDescriptor>;
}

/// Reads exactly `N` bytes, or nothing.
pub(crate) fn read_exact<const N: usize, R: MemoryReader + ?Sized>(
    reader: &R,
    address: u64,
) -> Option<[u8; N]> {
    let mut buf = [0; N];
    match reader.read_memory(address, &mut buf) {
        Some(n) if n == N => Some(buf),
        _ => None,
    }
}
