use thiserror::Error;

/// Conditions that stop a validation run before any dataset is evaluated.
///
/// These mean "the archive could not be checked", never "the archive was
/// checked and failed"; the latter is carried by findings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("Not a valid ZIP archive: {0}")]
    InvalidArchive(String),

    #[error("Archive contains no members")]
    EmptyArchive,

    #[error("Archive produced no extractable files")]
    NoFiles,

    #[error("Unsafe member path rejected: {0}")]
    UnsafePath(String),

    #[error("Archive too large: {0}")]
    TooLarge(String),

    #[error("Workspace I/O failed: {0}")]
    Io(String),
}

impl ArchiveError {
    pub fn category(&self) -> &'static str {
        match self {
            ArchiveError::InvalidArchive(_) => "invalid-archive",
            ArchiveError::EmptyArchive => "empty-archive",
            ArchiveError::NoFiles => "no-files",
            ArchiveError::UnsafePath(_) => "unsafe-path",
            ArchiveError::TooLarge(_) => "too-large",
            ArchiveError::Io(_) => "io",
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError::Io(err.to_string())
    }
}

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("File upload error: {0}")]
    FileUpload(String),

    #[error("Validation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> u16 {
        match self {
            AppError::Archive(ArchiveError::TooLarge(_)) => 4013,
            AppError::Archive(_) => 4000,
            AppError::FileUpload(_) => 4001,
            AppError::Io(_) => 5001,
            AppError::Configuration(_) => 5003,
            AppError::Timeout(_) => 5004,
            AppError::Internal(_) => 5006,
        }
    }

    pub fn message(&self) -> String {
        match self {
            AppError::Archive(err) => err.message(),
            AppError::Io(msg)
            | AppError::Configuration(msg)
            | AppError::FileUpload(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::Timeout(_) => self.to_string(),
        }
    }

    /// Short machine tag; archive failures reuse their own taxonomy.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Archive(err) => err.category(),
            AppError::Io(_) => "io",
            AppError::Configuration(_) => "configuration",
            AppError::FileUpload(_) => "upload",
            AppError::Timeout(_) => "timeout",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Archive(ArchiveError::TooLarge(_)) => 413,
            AppError::Archive(ArchiveError::Io(_)) => 500,
            AppError::Archive(_) | AppError::FileUpload(_) => 400,
            AppError::Timeout(_) => 504,
            AppError::Io(_) | AppError::Configuration(_) | AppError::Internal(_) => 500,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
