//! Source files and their content fingerprints

use crate::{error::SolcIoError, utils};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// An ordered list of files and their source
pub type Sources = BTreeMap<PathBuf, Source>;

/// Content of a solidity file
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    /// Content of the file
    ///
    /// This is an `Arc` because it may be cloned into several compilation units, which can
    /// include the same library file when they are compiled with different versions.
    pub content: Arc<String>,
}

impl Source {
    /// this is a heuristically measured threshold at which we can generally expect a speedup by
    /// using rayon's `par_iter`, See `Self::read_all_files`
    pub const NUM_READ_PAR: usize = 8;

    /// Creates a new instance of [Source] with the given content.
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: Arc::new(content.into()) }
    }

    /// Reads the file's content
    #[tracing::instrument(name = "read_source", level = "trace", skip_all, err)]
    pub fn read(file: impl AsRef<Path>) -> Result<Self, SolcIoError> {
        let file = file.as_ref();
        tracing::trace!(file=%file.display());
        let content = fs::read_to_string(file).map_err(|err| SolcIoError::new(err, file))?;

        // Normalize line endings to ensure deterministic fingerprints across platforms
        let content = if content.contains('\r') { content.replace("\r\n", "\n") } else { content };

        Ok(Self::new(content))
    }

    /// Recursively finds all source files under the given dir path and reads them all
    pub fn read_all_from(dir: impl AsRef<Path>) -> Result<Sources, SolcIoError> {
        Self::read_all_files(utils::source_files(dir))
    }

    /// Reads all source files of the given vec
    ///
    /// Depending on the len of the vec it will try to read the files in parallel
    pub fn read_all_files(files: Vec<PathBuf>) -> Result<Sources, SolcIoError> {
        Self::read_all(files)
    }

    /// Reads all files
    pub fn read_all<T, I>(files: I) -> Result<Sources, SolcIoError>
    where
        I: IntoIterator<Item = T>,
        T: Into<PathBuf>,
    {
        let files: Vec<PathBuf> = files.into_iter().map(Into::into).collect();
        if files.len() < Self::NUM_READ_PAR {
            files.into_iter().map(|file| Self::read(&file).map(|source| (file, source))).collect()
        } else {
            use rayon::prelude::*;
            files
                .into_par_iter()
                .map(|file| Self::read(&file).map(|source| (file, source)))
                .collect()
        }
    }

    /// Generate a non-cryptographically secure checksum of the file's content
    pub fn content_hash(&self) -> String {
        utils::content_hash(self.content.as_bytes())
    }
}

impl AsRef<str> for Source {
    fn as_ref(&self) -> &str {
        &self.content
    }
}
