//! Type descriptors: how a run of heap bytes is interpreted

mod registry;
mod value;

pub use registry::TypeRegistry;
pub use value::Value;

use std::fmt;
use std::sync::Arc;
use crate::heap::{HeapError, HeapResult};

/// Shared, immutable type descriptor. Every handle of a type holds one.
pub type TypeRef = Arc<TypeDescriptor>;

/// Built-in scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Byte,
    Bool,
}

impl Scalar {
    pub const ALL: [Scalar; 12] = [
        Scalar::I8,
        Scalar::I16,
        Scalar::I32,
        Scalar::I64,
        Scalar::U8,
        Scalar::U16,
        Scalar::U32,
        Scalar::U64,
        Scalar::F32,
        Scalar::F64,
        Scalar::Byte,
        Scalar::Bool,
    ];

    /// Name the scalar is registered under
    pub fn name(self) -> &'static str {
        match self {
            Scalar::I8 => "i8",
            Scalar::I16 => "i16",
            Scalar::I32 => "i32",
            Scalar::I64 => "i64",
            Scalar::U8 => "u8",
            Scalar::U16 => "u16",
            Scalar::U32 => "u32",
            Scalar::U64 => "u64",
            Scalar::F32 => "f32",
            Scalar::F64 => "f64",
            Scalar::Byte => "byte",
            Scalar::Bool => "bool",
        }
    }

    /// Size in bytes; scalars are aligned to their size
    pub fn size(self) -> usize {
        match self {
            Scalar::I8 | Scalar::U8 | Scalar::Byte | Scalar::Bool => 1,
            Scalar::I16 | Scalar::U16 => 2,
            Scalar::I32 | Scalar::U32 | Scalar::F32 => 4,
            Scalar::I64 | Scalar::U64 | Scalar::F64 => 8,
        }
    }
}

/// A named member of a struct type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub offset: usize,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Scalar(Scalar),
    Struct(Vec<Field>),
    Array { element: TypeRef, len: usize },
}

/// Name, size, alignment and layout of a type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    name: String,
    size: usize,
    alignment: usize,
    kind: TypeKind,
}

impl TypeDescriptor {
    pub fn scalar(scalar: Scalar) -> Self {
        Self {
            name: scalar.name().to_string(),
            size: scalar.size(),
            alignment: scalar.size(),
            kind: TypeKind::Scalar(scalar),
        }
    }

    /// A fixed-length array of `len` elements laid out back to back
    pub fn array(name: &str, element: &TypeRef, len: usize) -> HeapResult<Self> {
        if len == 0 {
            return Err(HeapError::InvalidLayout(format!("array {} has no elements", name)));
        }
        let size = element.size.checked_mul(len).ok_or_else(|| {
            HeapError::InvalidLayout(format!("array {} is too large", name))
        })?;
        Ok(Self {
            name: name.to_string(),
            size,
            alignment: element.alignment,
            kind: TypeKind::Array { element: element.clone(), len },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self.kind {
            TypeKind::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    /// Look up a struct field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        match &self.kind {
            TypeKind::Struct(fields) => fields.iter().find(|f| f.name == name),
            _ => None,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Caller-supplied layout of a struct type: a declared total size and an
/// ordered list of fields at explicit offsets.
#[derive(Debug, Clone)]
pub struct StructLayout {
    size: usize,
    alignment: Option<usize>,
    fields: Vec<Field>,
}

impl StructLayout {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            alignment: None,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, offset: usize, ty: &TypeRef) -> Self {
        self.fields.push(Field {
            name: name.to_string(),
            offset,
            ty: ty.clone(),
        });
        self
    }

    /// Override the alignment, which otherwise is the largest field alignment
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = Some(alignment);
        self
    }

    /// Validate the layout and turn it into a descriptor named `name`
    pub(crate) fn into_descriptor(self, name: &str) -> HeapResult<TypeDescriptor> {
        let invalid = |msg: String| HeapError::InvalidLayout(format!("{}: {}", name, msg));

        if self.size == 0 {
            return Err(invalid("size must be non-zero".to_string()));
        }
        let alignment = self
            .alignment
            .unwrap_or_else(|| self.fields.iter().map(|f| f.ty.alignment).max().unwrap_or(1));
        if !alignment.is_power_of_two() {
            return Err(invalid(format!("alignment {} is not a power of two", alignment)));
        }
        // Every element of an array must start aligned
        if self.size % alignment != 0 {
            return Err(invalid(format!(
                "size {} is not a multiple of alignment {}",
                self.size, alignment
            )));
        }

        let mut by_offset: Vec<&Field> = self.fields.iter().collect();
        by_offset.sort_by_key(|f| f.offset);
        let mut covered_to = 0;
        for field in &by_offset {
            let end = field
                .offset
                .checked_add(field.ty.size)
                .filter(|&end| end <= self.size)
                .ok_or_else(|| invalid(format!("field {} does not fit in {} bytes", field.name, self.size)))?;
            if field.offset < covered_to {
                return Err(invalid(format!("field {} overlaps the previous field", field.name)));
            }
            covered_to = end;
        }

        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(invalid(format!("duplicate field {}", field.name)));
            }
        }

        Ok(TypeDescriptor {
            name: name.to_string(),
            size: self.size,
            alignment,
            kind: TypeKind::Struct(self.fields),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(s: Scalar) -> TypeRef {
        Arc::new(TypeDescriptor::scalar(s))
    }

    #[test]
    fn test_scalar_descriptors() {
        for s in Scalar::ALL {
            let ty = TypeDescriptor::scalar(s);
            assert_eq!(ty.name(), s.name());
            assert_eq!(ty.size(), s.size());
            assert_eq!(ty.alignment(), s.size());
            assert_eq!(ty.as_scalar(), Some(s));
        }
    }

    #[test]
    fn test_struct_layout_alignment_defaults_to_widest_field() {
        let layout = StructLayout::new(16)
            .field("tag", 0, &scalar(Scalar::U8))
            .field("value", 8, &scalar(Scalar::F64));

        let ty = layout.into_descriptor("tagged").unwrap();

        assert_eq!(ty.size(), 16);
        assert_eq!(ty.alignment(), 8);
        assert_eq!(ty.field("value").unwrap().offset, 8);
        assert!(ty.field("missing").is_none());
        assert_eq!(ty.as_scalar(), None);
    }

    #[test]
    fn test_struct_layout_rejects_overlap() {
        let layout = StructLayout::new(8)
            .field("a", 0, &scalar(Scalar::I32))
            .field("b", 2, &scalar(Scalar::I32));

        match layout.into_descriptor("bad").unwrap_err() {
            HeapError::InvalidLayout(msg) => assert!(msg.contains("overlaps")),
            other => panic!("Expected InvalidLayout, got {:?}", other),
        }
    }

    #[test]
    fn test_struct_layout_rejects_field_past_end() {
        let layout = StructLayout::new(6).field("a", 4, &scalar(Scalar::I32));
        match layout.into_descriptor("short").unwrap_err() {
            HeapError::InvalidLayout(msg) => assert!(msg.contains("does not fit")),
            other => panic!("Expected InvalidLayout, got {:?}", other),
        }
    }

    #[test]
    fn test_struct_layout_rejects_duplicate_names_and_bad_alignment() {
        let dup = StructLayout::new(8)
            .field("x", 0, &scalar(Scalar::I32))
            .field("x", 4, &scalar(Scalar::I32));
        assert!(matches!(dup.into_descriptor("dup"), Err(HeapError::InvalidLayout(_))));

        let odd = StructLayout::new(8).with_alignment(3);
        assert!(matches!(odd.into_descriptor("odd"), Err(HeapError::InvalidLayout(_))));

        let empty = StructLayout::new(0);
        assert!(matches!(empty.into_descriptor("empty"), Err(HeapError::InvalidLayout(_))));
    }

    #[test]
    fn test_struct_layout_rejects_size_not_multiple_of_alignment() {
        let layout = StructLayout::new(5)
            .field("count", 0, &scalar(Scalar::U32))
            .field("flag", 4, &scalar(Scalar::Bool));
        match layout.into_descriptor("packed").unwrap_err() {
            HeapError::InvalidLayout(msg) => assert!(msg.contains("not a multiple of alignment 4")),
            other => panic!("Expected InvalidLayout, got {:?}", other),
        }

        let explicit = StructLayout::new(6).with_alignment(4);
        assert!(matches!(explicit.into_descriptor("wide"), Err(HeapError::InvalidLayout(_))));

        let padded = StructLayout::new(8)
            .field("count", 0, &scalar(Scalar::U32))
            .field("flag", 4, &scalar(Scalar::Bool))
            .into_descriptor("padded")
            .unwrap();
        assert_eq!(padded.size(), 8);
        assert_eq!(padded.alignment(), 4);
    }

    #[test]
    fn test_struct_layout_allows_padding_between_fields() {
        let ty = StructLayout::new(12)
            .field("a", 0, &scalar(Scalar::U8))
            .field("b", 4, &scalar(Scalar::I32))
            .field("c", 8, &scalar(Scalar::U16))
            .into_descriptor("padded")
            .unwrap();
        assert_eq!(ty.alignment(), 4);
    }

    #[test]
    fn test_array_descriptor() {
        let bytes = TypeDescriptor::array("byte4", &scalar(Scalar::Byte), 4).unwrap();
        assert_eq!(bytes.size(), 4);
        assert_eq!(bytes.alignment(), 1);

        let empty = TypeDescriptor::array("none", &scalar(Scalar::I32), 0);
        assert!(matches!(empty, Err(HeapError::InvalidLayout(_))));
    }

    #[test]
    fn test_type_descriptor_display() {
        assert_eq!(TypeDescriptor::scalar(Scalar::F32).to_string(), "f32");
    }
}
