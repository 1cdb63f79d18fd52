//! Self-describing binary container for n-dimensional datasets.
//!
//! Layout:
//!
//! ```text
//! [8]  magic "RSDSET01"
//! [8]  header length, u64 little-endian
//! [n]  JSON header: format version, attributes, dataset descriptors
//! pad  to a multiple of 8
//! ...  dataset payloads, little-endian, each starting 8-byte aligned
//! ```
//!
//! Dataset offsets in the header are relative to the start of the payload
//! section.

use super::{StorageError, StorageResult};
use memmap2::Mmap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

pub const MAGIC: &[u8; 8] = b"RSDSET01";
pub const FORMAT_VERSION: u32 = 1;
const ALIGN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    U8,
    U16,
    I32,
    I64,
    F32,
    F64,
}

impl DType {
    pub fn size(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }
}

/// Scalar types storable in a container
pub trait Element: Copy + Sized {
    const DTYPE: DType;
    fn write_le(&self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: DType = $dtype;

            fn write_le(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_le_bytes(raw)
            }
        }
    };
}

impl_element!(u8, DType::U8);
impl_element!(u16, DType::U16);
impl_element!(i32, DType::I32);
impl_element!(i64, DType::I64);
impl_element!(f32, DType::F32);
impl_element!(f64, DType::F64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub name: String,
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub offset: u64,
}

impl DatasetDescriptor {
    /// `None` when the shape overflows `usize`
    pub fn element_count(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |count, &dim| count.checked_mul(dim))
    }

    pub fn byte_len(&self) -> Option<usize> {
        self.element_count()?.checked_mul(self.dtype.size())
    }

    /// Byte range of the values relative to the start of the file
    fn span(&self, data_start: usize) -> Option<Range<usize>> {
        let start = data_start.checked_add(usize::try_from(self.offset).ok()?)?;
        let end = start.checked_add(self.byte_len()?)?;
        Some(start..end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerHeader {
    pub format_version: u32,
    pub attributes: BTreeMap<String, Value>,
    pub datasets: Vec<DatasetDescriptor>,
}

fn pad_to_alignment(buffer: &mut Vec<u8>) {
    let rem = buffer.len() % ALIGN;
    if rem != 0 {
        buffer.resize(buffer.len() + ALIGN - rem, 0);
    }
}

/// Builds a container in memory and writes it in one pass
pub struct ContainerWriter {
    header: ContainerHeader,
    payload: Vec<u8>,
}

impl ContainerWriter {
    pub fn new() -> Self {
        Self {
            header: ContainerHeader {
                format_version: FORMAT_VERSION,
                attributes: BTreeMap::new(),
                datasets: Vec::new(),
            },
            payload: Vec::new(),
        }
    }

    pub fn set_attribute(&mut self, key: &str, value: impl Serialize) -> StorageResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| StorageError::Format(format!("attribute {}: {}", key, e)))?;
        self.header.attributes.insert(key.to_string(), value);
        Ok(())
    }

    pub fn extend_attributes(&mut self, attributes: BTreeMap<String, Value>) {
        self.header.attributes.extend(attributes);
    }

    /// Append a dataset; `data` is in row-major order of `shape`
    pub fn add_dataset<T: Element>(&mut self, name: &str, shape: &[usize], data: &[T]) -> StorageResult<()> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(StorageError::Format(format!(
                "dataset {}: shape {:?} needs {} elements, got {}",
                name,
                shape,
                expected,
                data.len()
            )));
        }
        if self.header.datasets.iter().any(|d| d.name == name) {
            return Err(StorageError::Format(format!("duplicate dataset {}", name)));
        }

        pad_to_alignment(&mut self.payload);
        let offset = self.payload.len() as u64;
        self.payload.reserve(data.len() * T::DTYPE.size());
        for value in data {
            value.write_le(&mut self.payload);
        }
        self.header.datasets.push(DatasetDescriptor {
            name: name.to_string(),
            dtype: T::DTYPE,
            shape: shape.to_vec(),
            offset,
        });
        Ok(())
    }

    pub fn write_to(&self, path: &Path) -> StorageResult<()> {
        let io_err = |source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        };

        let header = serde_json::to_vec(&self.header)
            .map_err(|e| StorageError::Format(format!("header: {}", e)))?;
        let mut preamble = Vec::with_capacity(16 + header.len() + ALIGN);
        preamble.extend_from_slice(MAGIC);
        preamble.extend_from_slice(&(header.len() as u64).to_le_bytes());
        preamble.extend_from_slice(&header);
        pad_to_alignment(&mut preamble);

        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&preamble).map_err(io_err)?;
        writer.write_all(&self.payload).map_err(io_err)?;
        let file = writer
            .into_inner()
            .map_err(|e| io_err(e.into_error()))?;
        file.sync_all().map_err(io_err)?;
        Ok(())
    }
}

impl Default for ContainerWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Memory-mapped read access to a container file
pub struct ContainerReader {
    path: PathBuf,
    mmap: Mmap,
    header: ContainerHeader,
    data_start: usize,
}

impl ContainerReader {
    pub fn open(path: &Path) -> StorageResult<Self> {
        let io_err = |source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        // Safety: the file is opened read-only and never truncated while mapped
        let mmap = unsafe { Mmap::map(&file) }.map_err(io_err)?;

        let corrupt = |reason: &str| StorageError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if mmap.len() < 16 || &mmap[..8] != MAGIC {
            return Err(corrupt("missing container magic"));
        }
        let header_len = u64::from_le_bytes(
            mmap[8..16]
                .try_into()
                .map_err(|_| corrupt("truncated header length"))?,
        ) as usize;
        let header_end = 16usize
            .checked_add(header_len)
            .filter(|&end| end <= mmap.len())
            .ok_or_else(|| corrupt("header extends past end of file"))?;
        let header: ContainerHeader = serde_json::from_slice(&mmap[16..header_end])
            .map_err(|e| corrupt(&format!("header JSON: {}", e)))?;
        if header.format_version != FORMAT_VERSION {
            return Err(corrupt(&format!(
                "unsupported format version {}",
                header.format_version
            )));
        }

        let data_start = (header_end + ALIGN - 1) / ALIGN * ALIGN;
        for dataset in &header.datasets {
            match dataset.span(data_start) {
                Some(span) if span.end <= mmap.len() => {}
                Some(_) => {
                    return Err(corrupt(&format!("dataset {} is truncated", dataset.name)));
                }
                None => {
                    return Err(corrupt(&format!(
                        "dataset {} has an impossible size",
                        dataset.name
                    )));
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            header,
            data_start,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.header.attributes
    }

    pub fn attribute<T: DeserializeOwned>(&self, key: &str) -> StorageResult<T> {
        let value = self
            .header
            .attributes
            .get(key)
            .ok_or_else(|| StorageError::MissingAttribute {
                path: self.path.clone(),
                key: key.to_string(),
            })?;
        serde_json::from_value(value.clone()).map_err(|e| StorageError::Corrupt {
            path: self.path.clone(),
            reason: format!("attribute {}: {}", key, e),
        })
    }

    pub fn descriptor(&self, name: &str) -> StorageResult<&DatasetDescriptor> {
        self.header
            .datasets
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| StorageError::MissingDataset {
                path: self.path.clone(),
                name: name.to_string(),
            })
    }

    /// Decode a dataset into its shape and row-major values
    pub fn read<T: Element>(&self, name: &str) -> StorageResult<(Vec<usize>, Vec<T>)> {
        let descriptor = self.descriptor(name)?;
        if descriptor.dtype != T::DTYPE {
            return Err(StorageError::TypeMismatch {
                name: name.to_string(),
                stored: descriptor.dtype,
                requested: T::DTYPE,
            });
        }
        let bytes = descriptor
            .span(self.data_start)
            .and_then(|span| self.mmap.get(span))
            .ok_or_else(|| StorageError::Corrupt {
                path: self.path.clone(),
                reason: format!("dataset {} is out of bounds", name),
            })?;
        let values = bytes
            .chunks_exact(T::DTYPE.size())
            .map(T::read_le)
            .collect();
        Ok((descriptor.shape.clone(), values))
    }
}
