use std::sync::Arc;
use rustc_hash::FxHashMap;
use crate::heap::{HeapError, HeapResult};
use crate::types::{Scalar, StructLayout, TypeDescriptor, TypeRef};

/// Name-to-descriptor table of one heap. Built-in scalars are always present
/// and registered types can never be changed or removed.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: FxHashMap<String, TypeRef>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut types = FxHashMap::default();
        for scalar in Scalar::ALL {
            types.insert(scalar.name().to_string(), Arc::new(TypeDescriptor::scalar(scalar)));
        }
        Self { types }
    }

    fn insert(&mut self, descriptor: TypeDescriptor) -> TypeRef {
        let ty = Arc::new(descriptor);
        self.types.insert(ty.name().to_string(), ty.clone());
        ty
    }

    fn ensure_unused(&self, name: &str) -> HeapResult<()> {
        if self.types.contains_key(name) {
            return Err(HeapError::DuplicateType(name.to_string()));
        }
        Ok(())
    }

    /// Register a struct type
    pub fn register(&mut self, name: &str, layout: StructLayout) -> HeapResult<TypeRef> {
        self.ensure_unused(name)?;
        let descriptor = layout.into_descriptor(name)?;
        Ok(self.insert(descriptor))
    }

    /// Register a fixed-length array type
    pub fn register_array(&mut self, name: &str, element: &TypeRef, len: usize) -> HeapResult<TypeRef> {
        self.ensure_unused(name)?;
        let descriptor = TypeDescriptor::array(name, element, len)?;
        Ok(self.insert(descriptor))
    }

    pub fn resolve(&self, name: &str) -> HeapResult<TypeRef> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| HeapError::UnknownType(name.to_string()))
    }

    /// The descriptor of a built-in scalar
    pub fn scalar(&self, scalar: Scalar) -> TypeRef {
        match self.types.get(scalar.name()) {
            Some(ty) => ty.clone(),
            None => Arc::new(TypeDescriptor::scalar(scalar)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
