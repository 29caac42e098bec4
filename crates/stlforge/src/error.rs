//! Error types for the converter.

use std::path::PathBuf;

use stlforge_kernel::KernelError;
use thiserror::Error;

/// A selection rule does not fit the document's actual structure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// The document has no solids at all.
    #[error("document contains no solids")]
    EmptyDocument,

    /// The task pinned a solid count and the file disagrees.
    #[error("expected {expected} solid(s), found {actual}")]
    CountMismatch {
        /// Count from the task table.
        expected: usize,
        /// Count in the file.
        actual: usize,
    },

    /// A rule names a solid index past the end of the document.
    #[error("solid index {index} out of range (document has {count})")]
    IndexOutOfRange {
        /// Offending index.
        index: usize,
        /// Number of solids.
        count: usize,
    },

    /// A group table lists the same solid twice.
    #[error("solid index {0} assigned to more than one output")]
    DuplicateIndex(usize),

    /// A group table without a rest label leaves solids unassigned.
    #[error("solid(s) {0:?} not assigned to any output")]
    Unassigned(Vec<usize>),

    /// An output would receive no solids.
    #[error("output '{label}' would be empty")]
    EmptyOutput {
        /// Label of the empty output.
        label: String,
    },
}

/// Configuration is unreadable or inconsistent.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("cannot parse config {}: {source}", path.display())]
    Parse {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// Deflection limits are not usable.
    #[error("invalid deflection: {0}")]
    InvalidDeflection(String),

    /// The task table is empty.
    #[error("no conversion tasks configured")]
    NoTasks,

    /// A task entry is malformed.
    #[error("task {}: {message}", input.display())]
    InvalidTask {
        /// Task input file.
        input: PathBuf,
        /// What is wrong.
        message: String,
    },

    /// Two outputs map to the same file.
    #[error("output {} produced by more than one task", .0.display())]
    DuplicateOutput(PathBuf),

    /// Repair hook settings are unusable.
    #[error("invalid repair settings: {0}")]
    InvalidRepair(String),
}

/// Errors from running a conversion task.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Bad configuration, including deflection limits rejected at mesh time.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The STEP input is missing, malformed or rejected by the kernel.
    #[error(transparent)]
    Import(KernelError),

    /// The selection rule does not match the file.
    #[error("selection failed for {}: {source}", path.display())]
    Selection {
        /// STEP input.
        path: PathBuf,
        /// Mismatch detail.
        #[source]
        source: SelectionError,
    },

    /// Tessellation or STL encoding failed.
    #[error(transparent)]
    Mesh(KernelError),

    /// An output could not be written.
    #[error(transparent)]
    Io(KernelError),
}

impl From<KernelError> for ConvertError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::NotFound { .. } | KernelError::Import { .. } => Self::Import(err),
            KernelError::Mesh { .. } | KernelError::Encode(_) => Self::Mesh(err),
            KernelError::Io { .. } => Self::Io(err),
            KernelError::InvalidDeflection(msg) => Self::Config(ConfigError::InvalidDeflection(msg)),
        }
    }
}

impl ConvertError {
    /// Short category name for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ConvertError::Config(_) => "config",
            ConvertError::Import(_) => "import",
            ConvertError::Selection { .. } => "selection",
            ConvertError::Mesh(_) => "mesh",
            ConvertError::Io(_) => "io",
        }
    }
}

/// Result type for converter operations.
pub type Result<T> = std::result::Result<T, ConvertError>;
