//! On-disk session and results files.

pub mod container;
pub mod results;
pub mod session_files;
pub mod staging;

use crate::error::AcquisitionError;
use container::DType;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use container::{ContainerReader, ContainerWriter};
pub use results::{read_results, write_results, ResultsProvenance, StoredResults, RESULTS_FILE_NAME};
pub use session_files::{
    camera_file_path, read_camera_file, read_stimulus_file, stimulus_file_path, write_camera_file,
    write_stimulus_file, CameraRecording, FileAttributes, StimulusRecording,
};
pub use staging::StagedFileSet;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not a valid container: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("{} has no dataset {name}", path.display())]
    MissingDataset { path: PathBuf, name: String },

    #[error("{} has no attribute {key}", path.display())]
    MissingAttribute { path: PathBuf, key: String },

    #[error("dataset {name} holds {stored:?}, not {requested:?}")]
    TypeMismatch {
        name: String,
        stored: DType,
        requested: DType,
    },

    #[error("{0}")]
    Format(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Classify a failure that happened while writing `target`
    pub fn into_write_error(self, target: &Path) -> AcquisitionError {
        match self {
            StorageError::Io { path, source } => AcquisitionError::DiskWriteError {
                path,
                message: source.to_string(),
            },
            other => AcquisitionError::DiskWriteError {
                path: target.to_path_buf(),
                message: other.to_string(),
            },
        }
    }
}

impl From<StorageError> for AcquisitionError {
    fn from(error: StorageError) -> Self {
        AcquisitionError::Storage(error.to_string())
    }
}
