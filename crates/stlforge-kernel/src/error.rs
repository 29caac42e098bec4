//! Error types for kernel operations.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while importing, meshing or exporting geometry.
#[derive(Error, Debug)]
pub enum KernelError {
    /// The STEP file does not exist.
    #[error("STEP file not found: {}", path.display())]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The STEP file could not be read, parsed or converted to B-rep shells.
    #[error("failed to import {}: {message}", path.display())]
    Import {
        /// Source file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Tessellation produced no usable triangles.
    #[error("tessellation of solid {solid} in {} failed: {message}", path.display())]
    Mesh {
        /// Source file.
        path: PathBuf,
        /// Document index of the solid.
        solid: usize,
        /// What went wrong.
        message: String,
    },

    /// Deflection parameters were rejected before reaching the kernel.
    #[error("invalid deflection: {0}")]
    InvalidDeflection(String),

    /// STL encoding failed.
    #[error("STL encoding failed: {0}")]
    Encode(String),

    /// Writing an output file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl KernelError {
    /// Create an import error.
    pub fn import(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Import {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Create a tessellation error.
    pub fn mesh(path: impl AsRef<Path>, solid: usize, message: impl Into<String>) -> Self {
        Self::Mesh {
            path: path.as_ref().to_path_buf(),
            solid,
            message: message.into(),
        }
    }

    /// Create an I/O error tied to a path.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Result type for kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
