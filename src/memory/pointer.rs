use std::fmt;
use crate::heap::{HeapError, HeapResult};
use crate::types::{TypeKind, TypeRef};

/// A C-style pointer into one heap.
///
/// The handle is a plain value: it owns no memory and is never checked when it
/// is formed. `address` is always the start of the allocation the handle came
/// from, `epoch` is that allocation's epoch, and the element actually pointed
/// at sits `byte_offset + element_index * size` bytes past `address`.
/// Offsets are kept in `i128` and saturate, so no sequence of arithmetic can
/// wrap a far pointer back into its block.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PointerHandle {
    heap_id: u32,
    address: usize,
    element_type: TypeRef,
    epoch: u64,
    element_index: i128,
    byte_offset: i128,
}

impl PointerHandle {
    pub(crate) fn new(heap_id: u32, address: usize, element_type: TypeRef, epoch: u64) -> Self {
        Self {
            heap_id,
            address,
            element_type,
            epoch,
            element_index: 0,
            byte_offset: 0,
        }
    }

    /// The null pointer of a given element type
    pub fn null(element_type: TypeRef) -> Self {
        Self::new(0, 0, element_type, 0)
    }

    pub fn is_null(&self) -> bool {
        self.address == 0
    }

    pub fn heap_id(&self) -> u32 {
        self.heap_id
    }

    /// Base address of the allocation
    pub fn address(&self) -> usize {
        self.address
    }

    pub fn element_type(&self) -> &TypeRef {
        &self.element_type
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn element_index(&self) -> i128 {
        self.element_index
    }

    pub fn byte_offset(&self) -> i128 {
        self.byte_offset
    }

    /// Distance in bytes from the allocation start to the pointed-at element
    pub fn displacement(&self) -> i128 {
        self.element_index
            .saturating_mul(self.element_type.size() as i128)
            .saturating_add(self.byte_offset)
    }

    /// The effective byte address, if it is representable
    pub fn effective_address(&self) -> Option<usize> {
        let address = (self.address as i128).checked_add(self.displacement())?;
        usize::try_from(address).ok()
    }

    /// Pointer arithmetic in units of the element type. Out-of-bounds results
    /// are legal to form; only dereferencing them fails.
    pub fn add(&self, delta: i64) -> Self {
        Self {
            element_index: self.element_index.saturating_add(delta as i128),
            ..self.clone()
        }
    }

    pub fn sub(&self, delta: i64) -> Self {
        Self {
            element_index: self.element_index.saturating_sub(delta as i128),
            ..self.clone()
        }
    }

    /// Reinterpret the same address as a different element type. The
    /// displacement carries over unchanged.
    pub fn cast(&self, element_type: &TypeRef) -> Self {
        Self {
            element_type: element_type.clone(),
            element_index: 0,
            byte_offset: self.displacement(),
            ..self.clone()
        }
    }

    /// Pointer to a named field of the struct this handle points at
    pub fn field(&self, name: &str) -> HeapResult<Self> {
        let field = match self.element_type.kind() {
            TypeKind::Struct(_) => self.element_type.field(name),
            _ => None,
        };
        let field = field.ok_or_else(|| HeapError::UnknownField {
            ty: self.element_type.name().to_string(),
            field: name.to_string(),
        })?;
        let field_type = field.ty.clone();
        let cast = self.cast(&field_type);
        Ok(Self {
            byte_offset: cast.byte_offset.saturating_add(field.offset as i128),
            ..cast
        })
    }

    /// Number of elements between `origin` and `self`, like C pointer
    /// subtraction. Both must point into the same allocation and share an
    /// element size.
    pub fn offset_from(&self, origin: &PointerHandle) -> HeapResult<i64> {
        if !self.same_allocation(origin) {
            return Err(HeapError::PointerMismatch);
        }
        let size = self.element_type.size();
        if size != origin.element_type.size() {
            return Err(HeapError::TypeMismatch {
                expected: self.element_type.name().to_string(),
                found: origin.element_type.name().to_string(),
            });
        }
        let bytes = self
            .displacement()
            .checked_sub(origin.displacement())
            .ok_or(HeapError::PointerMismatch)?;
        i64::try_from(bytes / size as i128).map_err(|_| HeapError::PointerMismatch)
    }

    /// Whether both handles point at the same allocation
    pub fn same_allocation(&self, other: &PointerHandle) -> bool {
        self.heap_id == other.heap_id && self.address == other.address && self.epoch == other.epoch
    }
}

impl fmt::Debug for PointerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Ptr<{}>(null)", self.element_type.name())
        } else {
            write!(
                f,
                "Ptr<{}>(heap={}, base={:#x}, disp={}, epoch={})",
                self.element_type.name(),
                self.heap_id,
                self.address,
                self.displacement(),
                self.epoch
            )
        }
    }
}

impl fmt::Display for PointerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.effective_address() {
            _ if self.is_null() => write!(f, "({}*) null", self.element_type.name()),
            Some(address) => write!(f, "({}*) {:#x}", self.element_type.name(), address),
            None => write!(f, "({}*) <unrepresentable>", self.element_type.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::types::{Scalar, StructLayout, TypeDescriptor, TypeRegistry};

    fn scalar(s: Scalar) -> TypeRef {
        Arc::new(TypeDescriptor::scalar(s))
    }

    fn int_ptr() -> PointerHandle {
        PointerHandle::new(1, 0x20, scalar(Scalar::I32), 7)
    }

    #[test]
    fn test_pointer_handle_creation() {
        let ptr = int_ptr();

        assert_eq!(ptr.heap_id(), 1);
        assert_eq!(ptr.address(), 0x20);
        assert_eq!(ptr.epoch(), 7);
        assert_eq!(ptr.element_index(), 0);
        assert_eq!(ptr.effective_address(), Some(0x20));
        assert!(!ptr.is_null());
    }

    #[test]
    fn test_pointer_handle_null() {
        let null = PointerHandle::null(scalar(Scalar::I32));

        assert!(null.is_null());
        assert!(null.add(3).is_null());
        assert_eq!(null.heap_id(), 0);
    }

    #[test]
    fn test_pointer_handle_add_scales_by_element_size() {
        let ptr = int_ptr();

        let third = ptr.add(3);
        assert_eq!(third.element_index(), 3);
        assert_eq!(third.displacement(), 12);
        assert_eq!(third.effective_address(), Some(0x2C));

        let back = third.sub(5);
        assert_eq!(back.displacement(), -8);
        assert_eq!(back.address(), ptr.address());
        assert_eq!(back.epoch(), ptr.epoch());
    }

    #[test]
    fn test_pointer_handle_add_never_panics() {
        let ptr = int_ptr().add(i64::MAX).add(i64::MAX);
        let _ = ptr.effective_address();
        let _ = ptr.displacement();
    }

    #[test]
    fn test_pointer_handle_add_does_not_wrap() {
        let ptr = int_ptr();

        let far = ptr.add(i64::MAX).add(i64::MAX).add(2);

        assert_eq!(far.element_index(), 2 * i64::MAX as i128 + 2);
        assert_ne!(far.displacement(), ptr.displacement());
        assert_eq!(far.sub(i64::MAX).sub(i64::MAX).sub(2), ptr);
        assert_eq!(ptr.sub(i64::MIN).element_index(), -(i64::MIN as i128));
    }

    #[test]
    fn test_pointer_handle_cast_preserves_far_displacement() {
        let ptr = PointerHandle::new(1, 0x20, scalar(Scalar::I64), 7);
        let far = ptr.add(1 << 61);

        let bytes = far.cast(&scalar(Scalar::Byte));

        assert_eq!(far.displacement(), 1i128 << 64);
        assert_eq!(bytes.displacement(), far.displacement());
        assert_eq!(bytes.effective_address(), far.effective_address());
        assert_eq!(bytes.effective_address(), None);
        assert_eq!(bytes.cast(&scalar(Scalar::I64)).add(-(1 << 61)).displacement(), 0);
    }

    #[test]
    fn test_pointer_handle_cast_keeps_address_and_epoch() {
        let ptr = int_ptr().add(2);

        let bytes = ptr.cast(&scalar(Scalar::Byte));

        assert_eq!(bytes.element_type().name(), "byte");
        assert_eq!(bytes.element_index(), 0);
        assert_eq!(bytes.byte_offset(), 8);
        assert_eq!(bytes.effective_address(), ptr.effective_address());
        assert_eq!(bytes.epoch(), ptr.epoch());
        assert_eq!(bytes.add(1).effective_address(), Some(0x29));
    }

    #[test]
    fn test_pointer_handle_field() {
        let mut registry = TypeRegistry::new();
        let i32_ty = registry.scalar(Scalar::I32);
        let f64_ty = registry.scalar(Scalar::F64);
        let sample = registry
            .register("sample", StructLayout::new(16).field("id", 0, &i32_ty).field("weight", 8, &f64_ty))
            .unwrap();
        let ptr = PointerHandle::new(1, 0x40, sample, 2);

        let weight = ptr.add(1).field("weight").unwrap();

        assert_eq!(weight.element_type().name(), "f64");
        assert_eq!(weight.displacement(), 24);
        assert_eq!(weight.address(), 0x40);
        assert_eq!(weight.epoch(), 2);
    }

    #[test]
    fn test_pointer_handle_unknown_field() {
        let result = int_ptr().field("x");
        match result.unwrap_err() {
            HeapError::UnknownField { ty, field } => {
                assert_eq!(ty, "i32");
                assert_eq!(field, "x");
            },
            other => panic!("Expected UnknownField, got {:?}", other),
        }
    }

    #[test]
    fn test_pointer_handle_offset_from() {
        let base = int_ptr();
        let end = base.add(4);

        assert_eq!(end.offset_from(&base).unwrap(), 4);
        assert_eq!(base.offset_from(&end).unwrap(), -4);

        let other = PointerHandle::new(1, 0x80, scalar(Scalar::I32), 9);
        assert!(matches!(other.offset_from(&base), Err(HeapError::PointerMismatch)));

        let wide = base.cast(&scalar(Scalar::I64));
        assert!(matches!(wide.offset_from(&base), Err(HeapError::TypeMismatch { .. })));
    }

    #[test]
    fn test_pointer_handle_equality_and_hash() {
        use std::collections::HashSet;

        let a = int_ptr();
        let b = int_ptr();
        let c = a.add(1);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.same_allocation(&c));

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_pointer_handle_debug_format() {
        assert_eq!(
            format!("{:?}", int_ptr().add(1)),
            "Ptr<i32>(heap=1, base=0x20, disp=4, epoch=7)"
        );
        assert_eq!(
            format!("{:?}", PointerHandle::null(scalar(Scalar::U8))),
            "Ptr<u8>(null)"
        );
    }

    #[test]
    fn test_pointer_handle_display_format() {
        assert_eq!(int_ptr().add(1).to_string(), "(i32*) 0x24");
        assert_eq!(PointerHandle::null(scalar(Scalar::F64)).to_string(), "(f64*) null");
    }
}
