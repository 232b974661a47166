//! Model artifact container with memory-mapped access
//!
//! The artifact is a single file: an 8-byte little-endian header length,
//! a JSON header describing the tensors, then the raw tensor bytes. The
//! file is memory-mapped so only accessed pages are loaded by the OS.

use finserve_common::{FinserveError, Result};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// Data type of a stored tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TensorDType {
    /// Float32
    F32,
    /// Float16
    F16,
}

impl TensorDType {
    /// Get the size in bytes for this dtype
    pub fn size(&self) -> usize {
        match self {
            TensorDType::F32 => 4,
            TensorDType::F16 => 2,
        }
    }

    /// Parse from the header string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "F32" => Some(TensorDType::F32),
            "F16" => Some(TensorDType::F16),
            _ => None,
        }
    }

    /// Convert to the header string
    pub fn as_str(&self) -> &'static str {
        match self {
            TensorDType::F32 => "F32",
            TensorDType::F16 => "F16",
        }
    }
}

/// Artifact metadata header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Map of tensor name to tensor info
    #[serde(rename = "tensors")]
    pub tensors: HashMap<String, TensorInfo>,
}

/// Information about a single tensor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorInfo {
    /// Tensor dtype
    #[serde(rename = "dtype")]
    pub dtype: String,

    /// Tensor shape
    #[serde(rename = "shape")]
    pub shape: Vec<usize>,

    /// Data offsets (start, end) in bytes, relative to the data section
    #[serde(rename = "data_offsets")]
    pub data_offsets: Vec<usize>,
}

impl TensorInfo {
    /// Get the dtype
    pub fn get_dtype(&self) -> Option<TensorDType> {
        TensorDType::from_str(&self.dtype)
    }

    /// Get the number of elements
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Memory-mapped model artifact
///
/// Provides zero-copy access to the tensor bytes of a serialized model.
#[derive(Debug)]
pub struct ArtifactBuffer {
    /// Memory-mapped file
    mmap: Mmap,

    /// Parsed header
    header: ArtifactHeader,

    /// Length of header in bytes
    header_len: usize,
}

impl ArtifactBuffer {
    /// Open a model artifact with memory mapping
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = File::open(path).map_err(|e| {
            FinserveError::memory_map(format!("Failed to open file {}: {}", path.display(), e))
        })?;

        let mmap = unsafe {
            Mmap::map(&file).map_err(|e| {
                FinserveError::memory_map(format!("Failed to mmap file {}: {}", path.display(), e))
            })?
        };

        // First 8 bytes hold the header length
        if mmap.len() < 8 {
            return Err(FinserveError::memory_map(
                "File too small to contain header",
            ));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&mmap[..8]);
        let header_len = u64::from_le_bytes(len_bytes) as usize;

        if mmap.len() < 8 + header_len {
            return Err(FinserveError::memory_map(
                "File truncated: header length exceeds file size",
            ));
        }

        let header_json = std::str::from_utf8(&mmap[8..8 + header_len])
            .map_err(|e| FinserveError::memory_map(format!("Invalid UTF-8 in header: {}", e)))?;

        let header: ArtifactHeader = serde_json::from_str(header_json)
            .map_err(|e| FinserveError::memory_map(format!("Failed to parse header JSON: {}", e)))?;

        let buffer = Self {
            mmap,
            header,
            header_len,
        };
        buffer.check_offsets()?;

        Ok(buffer)
    }

    /// Verify every declared tensor fits inside the data section and its
    /// byte span matches dtype * element count.
    fn check_offsets(&self) -> Result<()> {
        let data_len = self.mmap.len() - 8 - self.header_len;

        for (name, info) in self.header.tensors.iter() {
            let dtype = info.get_dtype().ok_or_else(|| {
                FinserveError::model_load(format!("Tensor {}: unsupported dtype {}", name, info.dtype))
            })?;

            if info.data_offsets.len() != 2 || info.data_offsets[1] < info.data_offsets[0] {
                return Err(FinserveError::model_load(format!(
                    "Tensor {}: invalid data offsets",
                    name
                )));
            }

            let span = info.data_offsets[1] - info.data_offsets[0];
            if span != info.num_elements() * dtype.size() {
                return Err(FinserveError::model_load(format!(
                    "Tensor {}: byte span {} does not match shape {:?} ({})",
                    name,
                    span,
                    info.shape,
                    info.dtype
                )));
            }

            if info.data_offsets[1] > data_len {
                return Err(FinserveError::model_load(format!(
                    "Tensor {}: data offsets exceed file size",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Get the header
    pub fn header(&self) -> &ArtifactHeader {
        &self.header
    }

    /// Get tensor names
    pub fn tensor_names(&self) -> impl Iterator<Item = &String> {
        self.header.tensors.keys()
    }

    /// Get a zero-copy view of a tensor
    pub fn get_tensor(&self, name: &str) -> Option<TensorView<'_>> {
        let info = self.header.tensors.get(name)?;
        let dtype = info.get_dtype()?;

        let data_start = 8 + self.header_len + info.data_offsets[0];
        let data_end = 8 + self.header_len + info.data_offsets[1];
        let data = &self.mmap[data_start..data_end];

        Some(TensorView {
            data,
            shape: info.shape.clone(),
            dtype,
        })
    }
}

/// Zero-copy view into an artifact tensor
pub struct TensorView<'a> {
    data: &'a [u8],
    shape: Vec<usize>,
    dtype: TensorDType,
}

impl<'a> TensorView<'a> {
    /// Get the tensor shape
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the tensor dtype
    pub fn dtype(&self) -> TensorDType {
        self.dtype
    }

    /// Get the number of elements
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Check if the tensor is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode the tensor into an owned f32 vector.
    ///
    /// The mmap'd bytes are not guaranteed to be 4-byte aligned, so values
    /// are decoded element-wise rather than reinterpreted in place.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self.dtype {
            TensorDType::F32 => self
                .data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            TensorDType::F16 => self
                .data
                .chunks_exact(2)
                .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_artifact() -> NamedTempFile {
        let header = json!({
            "tensors": {
                "weight": {
                    "dtype": "F32",
                    "shape": [2, 2],
                    "data_offsets": [0, 16]
                }
            }
        });

        let header_json = serde_json::to_string(&header).unwrap();
        let header_len = header_json.len() as u64;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&header_len.to_le_bytes()).unwrap();
        file.write_all(header_json.as_bytes()).unwrap();

        for v in [1.0f32, 2.0, 3.0, 4.0] {
            file.write_all(&v.to_le_bytes()).unwrap();
        }
        file.flush().unwrap();

        file
    }

    #[test]
    fn test_artifact_open() {
        let file = create_test_artifact();
        let buffer = ArtifactBuffer::open(file.path()).unwrap();

        assert_eq!(buffer.tensor_names().count(), 1);

        let tensor = buffer.get_tensor("weight").unwrap();
        assert_eq!(tensor.shape(), &[2, 2]);
        assert_eq!(tensor.dtype(), TensorDType::F32);
        assert_eq!(tensor.len(), 4);
        assert_eq!(tensor.to_f32_vec(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_artifact_missing_tensor() {
        let file = create_test_artifact();
        let buffer = ArtifactBuffer::open(file.path()).unwrap();
        assert!(buffer.get_tensor("bias").is_none());
    }

    #[test]
    fn test_artifact_truncated_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        file.flush().unwrap();

        let err = ArtifactBuffer::open(file.path()).unwrap_err();
        assert!(matches!(err, FinserveError::MemoryMap(_)));
    }

    #[test]
    fn test_artifact_header_overruns_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&(1024u64).to_le_bytes()).unwrap();
        file.write_all(b"{}").unwrap();
        file.flush().unwrap();

        let err = ArtifactBuffer::open(file.path()).unwrap_err();
        assert!(matches!(err, FinserveError::MemoryMap(_)));
    }

    #[test]
    fn test_artifact_bad_offsets_rejected() {
        let header = json!({
            "tensors": {
                "weight": {
                    "dtype": "F32",
                    "shape": [2, 2],
                    "data_offsets": [0, 12]
                }
            }
        });

        let header_json = serde_json::to_string(&header).unwrap();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&(header_json.len() as u64).to_le_bytes()).unwrap();
        file.write_all(header_json.as_bytes()).unwrap();
        file.write_all(&[0u8; 16]).unwrap();
        file.flush().unwrap();

        let err = ArtifactBuffer::open(file.path()).unwrap_err();
        assert!(matches!(err, FinserveError::ModelLoad(_)));
    }

    #[test]
    fn test_f16_tensor_decodes() {
        let header = json!({
            "tensors": {
                "weight": {
                    "dtype": "F16",
                    "shape": [2],
                    "data_offsets": [0, 4]
                }
            }
        });

        let header_json = serde_json::to_string(&header).unwrap();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&(header_json.len() as u64).to_le_bytes()).unwrap();
        file.write_all(header_json.as_bytes()).unwrap();
        for v in [1.5f32, -0.25] {
            file.write_all(&half::f16::from_f32(v).to_le_bytes()).unwrap();
        }
        file.flush().unwrap();

        let buffer = ArtifactBuffer::open(file.path()).unwrap();
        let tensor = buffer.get_tensor("weight").unwrap();
        assert_eq!(tensor.to_f32_vec(), vec![1.5, -0.25]);
    }
}
