// The minimal host shape the engine needs: column type kinds, column
// descriptors, the storage layout mode and a datum representation for
// rows going in and out.

use std::borrow::Cow;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use pax_base::{err, schema_err, Error, Result};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    Bytes,
}

impl TypeKind {
    /// Element width for fixed-width kinds.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            TypeKind::Boolean | TypeKind::Byte => Some(1),
            TypeKind::Short => Some(2),
            TypeKind::Int | TypeKind::Float => Some(4),
            TypeKind::Long | TypeKind::Double => Some(8),
            TypeKind::String | TypeKind::Bytes => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TypeKind::Boolean | TypeKind::Byte | TypeKind::Short | TypeKind::Int | TypeKind::Long
        )
    }

    pub fn default_align(&self) -> usize {
        match self {
            TypeKind::String | TypeKind::Bytes => 1,
            k => k.fixed_width().unwrap_or(1),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct ColumnDesc {
    pub name: String,
    pub kind: TypeKind,
    /// Required start alignment of the column's unencoded data stream.
    pub align: usize,
}

impl ColumnDesc {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        ColumnDesc {
            name: name.into(),
            kind,
            align: kind.default_align(),
        }
    }

    pub fn with_align(mut self, align: usize) -> Self {
        self.align = align;
        self
    }

    pub fn check_align(&self) -> Result<()> {
        match self.align {
            1 | 2 | 4 | 8 => Ok(()),
            a => Err(err(format!("unsupported alignment {a} for column {}", self.name))),
        }
    }
}

/// Layout of null rows in a column's data stream.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Default, Serialize, Deserialize)]
pub enum StorageFormat {
    /// A zero placeholder of element width is kept for every null.
    #[default]
    Porc,
    /// Dense values only; nulls take no space.
    PorcVec,
}

impl StorageFormat {
    pub fn is_vec(&self) -> bool {
        *self == StorageFormat::PorcVec
    }
}

impl std::fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            StorageFormat::Porc => "porc",
            StorageFormat::PorcVec => "porc_vec",
        })
    }
}

impl FromStr for StorageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "porc" => Ok(StorageFormat::Porc),
            "porc_vec" => Ok(StorageFormat::PorcVec),
            _ => Err(err(format!("unknown storage format: {s}"))),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum Datum<'a> {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bytes(Cow<'a, [u8]>),
}

impl<'a> Datum<'a> {
    pub fn str(s: &'a str) -> Self {
        Datum::Bytes(Cow::Borrowed(s.as_bytes()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn into_owned(self) -> Datum<'static> {
        match self {
            Datum::Null => Datum::Null,
            Datum::Bool(v) => Datum::Bool(v),
            Datum::Int8(v) => Datum::Int8(v),
            Datum::Int16(v) => Datum::Int16(v),
            Datum::Int32(v) => Datum::Int32(v),
            Datum::Int64(v) => Datum::Int64(v),
            Datum::Float32(v) => Datum::Float32(v),
            Datum::Float64(v) => Datum::Float64(v),
            Datum::Bytes(b) => Datum::Bytes(Cow::Owned(b.into_owned())),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Bool(v) => Some(*v as i64),
            Datum::Int8(v) => Some(*v as i64),
            Datum::Int16(v) => Some(*v as i64),
            Datum::Int32(v) => Some(*v as i64),
            Datum::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Float32(v) => Some(*v as f64),
            Datum::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Datum::Bytes(b) => Some(b.as_ref()),
            _ => None,
        }
    }

    /// The column representation of a non-null datum of type `kind`:
    /// little-endian for fixed kinds, the raw bytes otherwise.
    pub fn column_bytes(&self, kind: TypeKind) -> Result<Cow<'_, [u8]>> {
        let bytes: Cow<[u8]> = match (kind, self) {
            (TypeKind::Boolean, Datum::Bool(v)) => Cow::Owned(vec![*v as u8]),
            (TypeKind::Byte, Datum::Int8(v)) => Cow::Owned(v.to_le_bytes().to_vec()),
            (TypeKind::Short, Datum::Int16(v)) => Cow::Owned(v.to_le_bytes().to_vec()),
            (TypeKind::Int, Datum::Int32(v)) => Cow::Owned(v.to_le_bytes().to_vec()),
            (TypeKind::Long, Datum::Int64(v)) => Cow::Owned(v.to_le_bytes().to_vec()),
            (TypeKind::Float, Datum::Float32(v)) => Cow::Owned(v.to_le_bytes().to_vec()),
            (TypeKind::Double, Datum::Float64(v)) => Cow::Owned(v.to_le_bytes().to_vec()),
            (TypeKind::String | TypeKind::Bytes, Datum::Bytes(b)) => Cow::Borrowed(b.as_ref()),
            (k, d) => return Err(schema_err(format!("datum {d:?} does not fit column type {k:?}"))),
        };
        Ok(bytes)
    }

    /// Inverse of `column_bytes`.
    pub fn from_column_bytes(kind: TypeKind, bytes: &'a [u8]) -> Result<Datum<'a>> {
        if let Some(w) = kind.fixed_width() {
            if bytes.len() != w {
                return Err(err(format!("{} bytes for a {:?} value", bytes.len(), kind)));
            }
        }
        let le8 = |b: &[u8]| {
            let mut buf = [0u8; 8];
            buf[..b.len()].copy_from_slice(b);
            buf
        };
        let b = le8(if kind.fixed_width().is_some() { bytes } else { &[] });
        Ok(match kind {
            TypeKind::Boolean => Datum::Bool(b[0] != 0),
            TypeKind::Byte => Datum::Int8(b[0] as i8),
            TypeKind::Short => Datum::Int16(i16::from_le_bytes([b[0], b[1]])),
            TypeKind::Int => Datum::Int32(i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            TypeKind::Long => Datum::Int64(i64::from_le_bytes(b)),
            TypeKind::Float => Datum::Float32(f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            TypeKind::Double => Datum::Float64(f64::from_le_bytes(b)),
            TypeKind::String | TypeKind::Bytes => Datum::Bytes(Cow::Borrowed(bytes)),
        })
    }
}

/// Reads the little-endian fixed-width integer in `bytes`, sign-extended.
pub(crate) fn le_to_i64(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    let shift = 64 - 8 * bytes.len() as u32;
    if shift == 64 {
        return 0;
    }
    (i64::from_le_bytes(buf) << shift) >> shift
}

/// Truncates `v` to `width` little-endian bytes.
pub(crate) fn i64_to_le(v: i64, width: usize) -> [u8; 8] {
    let mut buf = v.to_le_bytes();
    buf[width..].fill(0);
    buf
}
