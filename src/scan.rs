use crate::heap::{Heap, HeapObject, TypeDescriptor, TypeIdentity};
use crate::InspectError;

/// Lazily walks a heap, yielding objects of one type in heap order.
pub struct TypeScan<'h> {
    ty: &'h TypeDescriptor,
    objects: Box<dyn Iterator<Item = HeapObject<'h>> + 'h>,
}

impl<'h> TypeScan<'h> {
    pub fn ty(&self) -> &'h TypeDescriptor {
        self.ty
    }
}

impl<'h> Iterator for TypeScan<'h> {
    type Item = HeapObject<'h>;

    fn next(&mut self) -> Option<Self::Item> {
        self.objects.next()
    }
}

/// Starts a scan for objects whose type is `identity`.
///
/// An identity the heap doesn't know is an error, which is not the same
/// thing as a known type with no instances.
pub fn scan_by_type<H: Heap + ?Sized>(
    heap: &H,
    identity: TypeIdentity,
) -> Result<TypeScan<'_>, InspectError> {
    let ty = heap.type_by_identity(identity)
        .ok_or(InspectError::TypeIdentityUnresolved(identity))?;
    let objects = heap.objects()
        .filter(move |o| o.ty.identity == identity);
    Ok(TypeScan { ty, objects: Box::new(objects) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeapSnapshot;

    const A: TypeIdentity = TypeIdentity(0xA0);
    const B: TypeIdentity = TypeIdentity(0xB0);
    const C: TypeIdentity = TypeIdentity(0xC0);

    fn snapshot() -> HeapSnapshot {
        let ty = |identity, name: &str| TypeDescriptor { identity, name: name.into(), fields: vec![] };
        HeapSnapshot::new(
            [ty(A, "A"), ty(B, "B"), ty(C, "C")],
            [(0x3000, A), (0x1000, B), (0x2000, A), (0x4000, B), (0x5000, A)],
        )
        .unwrap()
    }

    #[test]
    fn yields_only_matching_objects_in_heap_order() {
        let snap = snapshot();
        let scan = scan_by_type(&snap, A).unwrap();
        assert_eq!(scan.ty().name, "A");
        let found = scan.map(|o| o.address).collect::<Vec<_>>();
        assert_eq!(found, [0x3000, 0x2000, 0x5000]);

        let count_a = snap.objects().filter(|o| o.ty.identity == A).count();
        assert_eq!(scan_by_type(&snap, A).unwrap().count(), count_a);
        assert!(scan_by_type(&snap, B).unwrap().all(|o| o.ty.identity == B));
    }

    #[test]
    fn known_type_without_instances_is_empty() {
        let snap = snapshot();
        assert_eq!(scan_by_type(&snap, C).unwrap().count(), 0);
    }

    #[test]
    fn unknown_identity_is_an_error() {
        let snap = snapshot();
        assert_eq!(
            scan_by_type(&snap, TypeIdentity(0xD0)).err(),
            Some(InspectError::TypeIdentityUnresolved(TypeIdentity(0xD0))),
        );
    }
}
