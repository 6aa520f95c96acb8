//! # Directory Values
//!
//! The tagged values stored in directory entries: sub-folder references,
//! file descriptors, and plain typed attributes.
//!
//! ## Encoding
//!
//! One tag byte followed by a little-endian payload:
//!
//! ```text
//! Tag   Variant   Payload
//! ----  --------  ---------------------------------
//! 0x00  Folder    folder id (4B)
//! 0x01  File      first (4B) | last (4B) | size (8B)
//! 0x02  Int       value (8B)
//! 0x03  Double    IEEE-754 bits (8B)
//! 0x04  Str       UTF-8 bytes to the end
//! ```
//!
//! Decoding is strict: unknown tags, short payloads and trailing bytes are
//! errors. The directory layer dispatches on the tag *before* decoding the
//! payload when a replacement policy only needs the type.

use eyre::{bail, ensure, Result};

use crate::free_store::FileDescriptor;

/// Identifies a directory folder. Folder 0 is the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Folder(pub u32);

impl Folder {
    pub const ROOT: Folder = Folder(0);
}

/// The type of a stored directory value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Folder,
    File,
    Int,
    Double,
    Str,
}

impl ValueType {
    fn tag(self) -> u8 {
        match self {
            ValueType::Folder => 0x00,
            ValueType::File => 0x01,
            ValueType::Int => 0x02,
            ValueType::Double => 0x03,
            ValueType::Str => 0x04,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0x00 => ValueType::Folder,
            0x01 => ValueType::File,
            0x02 => ValueType::Int,
            0x03 => ValueType::Double,
            0x04 => ValueType::Str,
            other => bail!("unknown directory value tag 0x{:02x}", other),
        })
    }

    /// Folders and files structure the namespace; everything else is a
    /// plain attribute.
    pub fn is_attribute(self) -> bool {
        !matches!(self, ValueType::Folder | ValueType::File)
    }
}

/// A decoded directory value.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeValue {
    Folder(Folder),
    File(FileDescriptor),
    Int(u64),
    Double(f64),
    Str(String),
}

impl TreeValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            TreeValue::Folder(_) => ValueType::Folder,
            TreeValue::File(_) => ValueType::File,
            TreeValue::Int(_) => ValueType::Int,
            TreeValue::Double(_) => ValueType::Double,
            TreeValue::Str(_) => ValueType::Str,
        }
    }

    /// Peeks the type without decoding the payload.
    pub fn type_of(bytes: &[u8]) -> Result<ValueType> {
        ensure!(!bytes.is_empty(), "empty directory value");
        ValueType::from_tag(bytes[0])
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.value_type().tag()];
        match self {
            TreeValue::Folder(folder) => out.extend_from_slice(&folder.0.to_le_bytes()),
            TreeValue::File(desc) => {
                out.extend_from_slice(&desc.first.to_le_bytes());
                out.extend_from_slice(&desc.last.to_le_bytes());
                out.extend_from_slice(&desc.size.to_le_bytes());
            }
            TreeValue::Int(value) => out.extend_from_slice(&value.to_le_bytes()),
            TreeValue::Double(value) => out.extend_from_slice(&value.to_bits().to_le_bytes()),
            TreeValue::Str(value) => out.extend_from_slice(value.as_bytes()),
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value_type = Self::type_of(bytes)?;
        let payload = &bytes[1..];

        Ok(match value_type {
            ValueType::Folder => {
                ensure!(payload.len() == 4, "folder payload must be 4 bytes");
                TreeValue::Folder(Folder(u32::from_le_bytes(payload.try_into()?)))
            }
            ValueType::File => {
                ensure!(payload.len() == 16, "file payload must be 16 bytes");
                TreeValue::File(FileDescriptor {
                    first: u32::from_le_bytes(payload[0..4].try_into()?),
                    last: u32::from_le_bytes(payload[4..8].try_into()?),
                    size: u64::from_le_bytes(payload[8..16].try_into()?),
                })
            }
            ValueType::Int => {
                ensure!(payload.len() == 8, "int payload must be 8 bytes");
                TreeValue::Int(u64::from_le_bytes(payload.try_into()?))
            }
            ValueType::Double => {
                ensure!(payload.len() == 8, "double payload must be 8 bytes");
                TreeValue::Double(f64::from_bits(u64::from_le_bytes(payload.try_into()?)))
            }
            ValueType::Str => TreeValue::Str(String::from_utf8(payload.to_vec())?),
        })
    }
}

impl From<u64> for TreeValue {
    fn from(value: u64) -> Self {
        TreeValue::Int(value)
    }
}

impl From<f64> for TreeValue {
    fn from(value: f64) -> Self {
        TreeValue::Double(value)
    }
}

impl From<&str> for TreeValue {
    fn from(value: &str) -> Self {
        TreeValue::Str(value.to_string())
    }
}

impl From<FileDescriptor> for TreeValue {
    fn from(desc: FileDescriptor) -> Self {
        TreeValue::File(desc)
    }
}
