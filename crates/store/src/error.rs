use std::path::PathBuf;

use thiserror::Error;

use storelens_core::errors::InputError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("could not read `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not write artifact `{name}`: {message}")]
    Write { name: String, message: String },
    #[error("could not encode artifact `{name}`: {message}")]
    Encode { name: String, message: String },
    #[error("no run manifest found in `{location}`")]
    ManifestMissing { location: String },
    #[error("run manifest could not be decoded: {0}")]
    ManifestDecode(String),
    #[error("in-memory artifact store lock is poisoned")]
    Poisoned,
}

impl StoreError {
    /// Stable machine-readable class for command output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Input(_) => "input_validation",
            Self::Read { .. } => "input_read",
            Self::Write { .. } | Self::Encode { .. } | Self::Poisoned => "artifact_write",
            Self::ManifestMissing { .. } | Self::ManifestDecode(_) => "manifest",
        }
    }
}
