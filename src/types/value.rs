use std::fmt;
use byteorder::{ByteOrder, LittleEndian};
use crate::heap::{HeapError, HeapResult};
use crate::types::{Scalar, TypeDescriptor};

/// A value read from or written to the heap.
///
/// Scalars are stored little-endian. Struct and array elements travel as raw
/// `Bytes`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Byte(u8),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl Value {
    /// The scalar type this value encodes as, if any
    pub fn scalar(&self) -> Option<Scalar> {
        Some(match self {
            Value::I8(_) => Scalar::I8,
            Value::I16(_) => Scalar::I16,
            Value::I32(_) => Scalar::I32,
            Value::I64(_) => Scalar::I64,
            Value::U8(_) => Scalar::U8,
            Value::U16(_) => Scalar::U16,
            Value::U32(_) => Scalar::U32,
            Value::U64(_) => Scalar::U64,
            Value::F32(_) => Scalar::F32,
            Value::F64(_) => Scalar::F64,
            Value::Byte(_) => Scalar::Byte,
            Value::Bool(_) => Scalar::Bool,
            Value::Bytes(_) => return None,
        })
    }

    fn type_name(&self) -> String {
        match (self.scalar(), self) {
            (Some(scalar), _) => scalar.name().to_string(),
            (None, Value::Bytes(bytes)) => format!("{} raw bytes", bytes.len()),
            (None, _) => "value".to_string(),
        }
    }

    /// Interpret `bytes` as one element of `ty`
    pub fn decode(ty: &TypeDescriptor, bytes: &[u8]) -> HeapResult<Value> {
        if bytes.len() != ty.size() {
            return Err(HeapError::TypeMismatch {
                expected: format!("{} bytes of {}", ty.size(), ty.name()),
                found: format!("{} bytes", bytes.len()),
            });
        }
        let scalar = match ty.as_scalar() {
            Some(scalar) => scalar,
            None => return Ok(Value::Bytes(bytes.to_vec())),
        };
        Ok(match scalar {
            Scalar::I8 => Value::I8(bytes[0] as i8),
            Scalar::I16 => Value::I16(LittleEndian::read_i16(bytes)),
            Scalar::I32 => Value::I32(LittleEndian::read_i32(bytes)),
            Scalar::I64 => Value::I64(LittleEndian::read_i64(bytes)),
            Scalar::U8 => Value::U8(bytes[0]),
            Scalar::U16 => Value::U16(LittleEndian::read_u16(bytes)),
            Scalar::U32 => Value::U32(LittleEndian::read_u32(bytes)),
            Scalar::U64 => Value::U64(LittleEndian::read_u64(bytes)),
            Scalar::F32 => Value::F32(LittleEndian::read_f32(bytes)),
            Scalar::F64 => Value::F64(LittleEndian::read_f64(bytes)),
            Scalar::Byte => Value::Byte(bytes[0]),
            Scalar::Bool => Value::Bool(bytes[0] != 0),
        })
    }

    /// Encode this value as one element of `ty`.
    ///
    /// Scalars must match the element's scalar type exactly; raw bytes only
    /// need the right width.
    pub fn encode(&self, ty: &TypeDescriptor) -> HeapResult<Vec<u8>> {
        let mismatch = || HeapError::TypeMismatch {
            expected: ty.name().to_string(),
            found: self.type_name(),
        };
        if let Value::Bytes(bytes) = self {
            if bytes.len() != ty.size() {
                return Err(mismatch());
            }
            return Ok(bytes.clone());
        }
        if self.scalar() != ty.as_scalar() {
            return Err(mismatch());
        }

        let mut buf = vec![0u8; ty.size()];
        match *self {
            Value::I8(v) => buf[0] = v as u8,
            Value::I16(v) => LittleEndian::write_i16(&mut buf, v),
            Value::I32(v) => LittleEndian::write_i32(&mut buf, v),
            Value::I64(v) => LittleEndian::write_i64(&mut buf, v),
            Value::U8(v) | Value::Byte(v) => buf[0] = v,
            Value::U16(v) => LittleEndian::write_u16(&mut buf, v),
            Value::U32(v) => LittleEndian::write_u32(&mut buf, v),
            Value::U64(v) => LittleEndian::write_u64(&mut buf, v),
            Value::F32(v) => LittleEndian::write_f32(&mut buf, v),
            Value::F64(v) => LittleEndian::write_f64(&mut buf, v),
            Value::Bool(v) => buf[0] = v as u8,
            Value::Bytes(_) => {}
        }
        Ok(buf)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Byte(v) => write!(f, "{:#04x}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Bytes(bytes) => {
                write!(f, "[")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{:02x}", b)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ty(scalar: Scalar) -> TypeDescriptor {
        TypeDescriptor::scalar(scalar)
    }

    #[test]
    fn test_value_encode_is_little_endian() {
        let bytes = Value::I32(0x41424344).encode(&ty(Scalar::I32)).unwrap();
        assert_eq!(bytes, vec![0x44, 0x43, 0x42, 0x41]);

        let bytes = Value::U16(0x0102).encode(&ty(Scalar::U16)).unwrap();
        assert_eq!(bytes, vec![0x02, 0x01]);
    }

    #[test]
    fn test_value_decode_scalars() {
        assert_eq!(Value::decode(&ty(Scalar::I8), &[0xFF]).unwrap(), Value::I8(-1));
        assert_eq!(Value::decode(&ty(Scalar::Bool), &[2]).unwrap(), Value::Bool(true));
        assert_eq!(
            Value::decode(&ty(Scalar::F64), &1.5f64.to_le_bytes()).unwrap(),
            Value::F64(1.5)
        );
        assert_eq!(
            Value::decode(&ty(Scalar::I64), &(-7i64).to_le_bytes()).unwrap(),
            Value::I64(-7)
        );
    }

    #[test]
    fn test_value_decode_width_mismatch() {
        let result = Value::decode(&ty(Scalar::I32), &[1, 2]);
        assert!(matches!(result, Err(HeapError::TypeMismatch { .. })));
    }

    #[test]
    fn test_value_decode_composite_as_bytes() {
        let byte = Arc::new(ty(Scalar::Byte));
        let array = TypeDescriptor::array("byte4", &byte, 4).unwrap();

        let value = Value::decode(&array, &[1, 2, 3, 4]).unwrap();

        assert_eq!(value, Value::Bytes(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_value_encode_rejects_other_scalar_kind() {
        match Value::F32(1.0).encode(&ty(Scalar::I32)).unwrap_err() {
            HeapError::TypeMismatch { expected, found } => {
                assert_eq!(expected, "i32");
                assert_eq!(found, "f32");
            },
            other => panic!("Expected TypeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_value_encode_raw_bytes_checks_width() {
        assert_eq!(
            Value::Bytes(vec![1, 0, 0, 0]).encode(&ty(Scalar::I32)).unwrap(),
            vec![1, 0, 0, 0]
        );
        let result = Value::Bytes(vec![1, 2, 3]).encode(&ty(Scalar::I32));
        assert!(matches!(result, Err(HeapError::TypeMismatch { .. })));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::I32(-3).to_string(), "-3");
        assert_eq!(Value::Byte(0x41).to_string(), "0x41");
        assert_eq!(Value::Bytes(vec![0x44, 0x43]).to_string(), "[44 43]");
    }
}
