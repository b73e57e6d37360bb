use crate::{remappings::RemappingError, version::VersionConstraint};
use semver::Version;
use std::{
    fmt, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolcError>;

/// Various error types
#[derive(Debug, Error)]
pub enum SolcError {
    /// An import could not be resolved to a file on disk
    #[error("failed to resolve import \"{}\" of \"{}\": {reason}", .import.display(), .file.display())]
    ImportResolution { file: PathBuf, import: PathBuf, reason: ImportFailureReason },
    /// The files of a single compilation unit declare version pragmas without a common version
    #[error("discovered incompatible solidity versions in the following files:\n{}", DisplayConflict(.files))]
    VersionConflict { files: Vec<(PathBuf, String)> },
    /// No known compiler version satisfies the version pragma of a single file
    #[error("no solc version satisfies the version requirement \"{constraint}\" of \"{}\"", .file.display())]
    UnsatisfiableVersion { file: PathBuf, constraint: VersionConstraint },
    #[error("invalid version pragma \"{pragma}\" in \"{}\": {error}", .file.display())]
    InvalidVersionPragma { file: PathBuf, pragma: String, error: semver::Error },
    /// The compiler invocation failed for the unit compiling the given targets
    #[error("{error} (targets: {})", DisplayPaths(.targets))]
    Compiler { targets: Vec<PathBuf>, error: CompilerError },
    #[error("target \"{0}\" does not match any source file of the project")]
    TargetNotFound(String),
    /// The cache file could not be used, always recovered as an empty cache
    #[error("corrupted cache file \"{}\": {reason}", .path.display())]
    CacheCorruption { path: PathBuf, reason: String },
    #[error(transparent)]
    Remapping(#[from] RemappingError),
    #[error(transparent)]
    SemverError(#[from] semver::Error),
    /// Deserialization error
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    /// Filesystem IO error
    #[error(transparent)]
    Io(#[from] SolcIoError),
    #[error(transparent)]
    PatternError(#[from] glob::PatternError),
    /// General purpose message
    #[error("{0}")]
    Message(String),
}

impl SolcError {
    pub(crate) fn io(err: io::Error, path: impl Into<PathBuf>) -> Self {
        SolcIoError::new(err, path).into()
    }

    pub fn msg(msg: impl Into<String>) -> Self {
        SolcError::Message(msg.into())
    }

    /// Whether this error was caused by the external compiler rather than the project layout
    pub fn is_compiler_error(&self) -> bool {
        matches!(self, SolcError::Compiler { .. })
    }
}

/// Why an import specifier could not be turned into an edge of the graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportFailureReason {
    /// none of the resolution strategies found an existing file
    NotFound,
    /// the file imports itself
    SelfImport,
    /// a file exists, but with a different case, which the compiler would reject
    CaseMismatch { existing: PathBuf },
    /// the target exists but could not be read
    Unreadable(String),
}

impl fmt::Display for ImportFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportFailureReason::NotFound => f.write_str("file not found"),
            ImportFailureReason::SelfImport => f.write_str("a file cannot import itself"),
            ImportFailureReason::CaseMismatch { existing } => {
                write!(f, "file name case mismatch, found \"{}\"", existing.display())
            }
            ImportFailureReason::Unreadable(err) => write!(f, "unreadable: {err}"),
        }
    }
}

/// Failures reported by a [`crate::compile::Compiler`] implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompilerError {
    #[error("solc failed: {message}")]
    Failed { message: String },
    #[error("solc {version} is not installed")]
    NotInstalled { version: Version },
    #[error("solc io error: {0}")]
    Io(String),
    #[error("solc timed out")]
    Timeout,
}

impl CompilerError {
    pub fn failed(message: impl Into<String>) -> Self {
        CompilerError::Failed { message: message.into() }
    }
}

impl From<SolcIoError> for CompilerError {
    fn from(err: SolcIoError) -> Self {
        CompilerError::Io(err.to_string())
    }
}

#[derive(Debug, Error)]
#[error("\"{}\": {io}", self.path.display())]
pub struct SolcIoError {
    io: io::Error,
    path: PathBuf,
}

impl SolcIoError {
    pub fn new(io: io::Error, path: impl Into<PathBuf>) -> Self {
        Self { io, path: path.into() }
    }

    /// The path at which the error occurred
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying io error
    pub fn io_error(&self) -> &io::Error {
        &self.io
    }
}

impl From<SolcIoError> for io::Error {
    fn from(err: SolcIoError) -> Self {
        err.io
    }
}

struct DisplayPaths<'a>(&'a [PathBuf]);

impl<'a> fmt::Display for DisplayPaths<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, path) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", path.display())?;
        }
        Ok(())
    }
}

struct DisplayConflict<'a>(&'a [(PathBuf, String)]);

impl<'a> fmt::Display for DisplayConflict<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (path, pragma)) in self.0.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "    {} {pragma}", path.display())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_error_names_file_and_specifier() {
        let err = SolcError::ImportResolution {
            file: "contracts/A.sol".into(),
            import: "./Missing.sol".into(),
            reason: ImportFailureReason::NotFound,
        };
        let msg = err.to_string();
        assert!(msg.contains("contracts/A.sol"));
        assert!(msg.contains("./Missing.sol"));
    }

    #[test]
    fn conflict_lists_all_files() {
        let err = SolcError::VersionConflict {
            files: vec![
                ("contracts/A.sol".into(), ">=0.8.0".to_string()),
                ("contracts/B.sol".into(), "<0.7.0".to_string()),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("contracts/A.sol >=0.8.0"));
        assert!(msg.contains("contracts/B.sol <0.7.0"));
    }
}
