//! Utility functions

use crate::error::{SolcError, SolcIoError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    io::{BufWriter, Write},
    path::{Component, Path, PathBuf},
};
use walkdir::WalkDir;

/// A regex that matches the import path of a solidity import statement with the named groups
/// "p1" (`import "x";`, `import "x" as Y;`), "p2" (`import 'x';`), "p3" and "p4" (`from "x";`)
pub static RE_SOL_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import\s+(?:(?:"(?P<p1>[^;"]*)"|'(?P<p2>[^;']*)')(?:\s+as\s+(?P<alias>\w+))?\s*;|(?P<symbols>[^;]*?)\s*from\s+(?:"(?P<p3>[^;"]*)"|'(?P<p4>[^;']*)')\s*;)"#).unwrap()
});

/// A regex that matches the version part of a solidity pragma
/// as follows: `pragma solidity ^0.5.2;` => `^0.5.2`
pub static RE_SOL_PRAGMA_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pragma\s+solidity\s+(?P<version>.+?);").unwrap());

/// A regex that matches the SPDX license identifier
/// as follows: `// SPDX-License-Identifier: MIT` => `MIT`
pub static RE_SOL_SDPX_LICENSE_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"///?\s*SPDX-License-Identifier:\s*(?P<license>.+)").unwrap());

/// Returns all path parts from any solidity import statement in a string,
/// `import "./contracts/Contract.sol";` -> `"./contracts/Contract.sol"`.
///
/// See also https://docs.soliditylang.org/en/v0.8.9/grammar.html
pub fn find_import_paths(contract: &str) -> impl Iterator<Item = regex::Match> {
    RE_SOL_IMPORT.captures_iter(contract).filter_map(|cap| {
        cap.name("p1").or_else(|| cap.name("p2")).or_else(|| cap.name("p3")).or_else(|| cap.name("p4"))
    })
}

/// Returns an iterator that yields all solidity file paths under the given root
pub fn source_files_iter(root: impl AsRef<Path>) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map(|ext| ext == "sol").unwrap_or_default())
        .map(|e| e.path().into())
}

/// Returns a list of absolute paths to all the solidity files under the root, sorted
///
/// NOTE: this does not resolve imports from other locations
///
/// # Example
///
/// ```no_run
/// use solbuild_solc::utils;
/// let sources = utils::source_files("./contracts");
/// ```
pub fn source_files(root: impl AsRef<Path>) -> Vec<PathBuf> {
    let mut files: Vec<_> = source_files_iter(root).collect();
    files.sort_unstable();
    files
}

/// Canonicalize the path, platform-agnostic
///
/// On windows this will ensure the path only consists of `/` separators
pub fn canonicalize(path: impl AsRef<Path>) -> Result<PathBuf, SolcIoError> {
    let path = path.as_ref();
    cfg_if_windows(dunce::canonicalize(path).map_err(|err| SolcIoError::new(err, path))?)
}

#[cfg(windows)]
fn cfg_if_windows(path: PathBuf) -> Result<PathBuf, SolcIoError> {
    use path_slash::{PathBufExt, PathExt};
    Ok(PathBuf::from_slash(path.to_slash_lossy().as_ref()))
}

#[cfg(not(windows))]
fn cfg_if_windows(path: PathBuf) -> Result<PathBuf, SolcIoError> {
    Ok(path)
}

/// Returns the same path config but with canonicalized paths.
///
/// This will take care of potential symbolic linked directories.
/// For example, the tempdir library is creating directories hosted under `/var/`, which in OS X
/// is a symbolic link to `/private/var/`. So if when we try to resolve imports and a path is
/// rooted in a symbolic directory we might end up with different paths for the same file, like
/// `private/var/.../Dapp.sol` and `/var/.../Dapp.sol`
///
/// This canonicalizes all the paths but does not treat non existing dirs as an error
pub fn canonicalized(path: impl Into<PathBuf>) -> PathBuf {
    let path = path.into();
    canonicalize(&path).unwrap_or(path)
}

/// Collapses `.` and `..` components without touching the file system
///
/// `a/b/../c/./d.sol` -> `a/c/d.sol`
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            c => normalized.push(c.as_os_str()),
        }
    }
    normalized
}

/// Returns the source name for the given source path, the ancestors of the root path
/// `/Users/project/sources/contract.sol` -> `sources/contracts.sol`
pub fn source_name(source: &Path, root: impl AsRef<Path>) -> &Path {
    source.strip_prefix(root.as_ref()).unwrap_or(source)
}

/// Formats the path as a slash separated string, used for solc source unit names
pub fn slash_path(path: &Path) -> String {
    use path_slash::PathExt;
    path.to_slash_lossy().to_string()
}

/// Checks if there exists a file with the same name but a different case
///
/// This is a workaround for case insensitive file systems, where `a.sol` and `A.sol` would be the
/// same file, but solc treats them as different source units
pub fn find_case_sensitive_existing_file(non_existing: &Path) -> Option<PathBuf> {
    let file_name = non_existing.file_name()?.to_str()?.to_lowercase();
    let parent = non_existing.parent()?;
    WalkDir::new(parent)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .find_map(|e| {
            let name = e.file_name().to_str()?;
            (name.to_lowercase() == file_name && e.path() != non_existing)
                .then(|| e.path().to_path_buf())
        })
}

/// Returns the lowercase hex encoded md5 hash of the content
pub fn content_hash(content: impl AsRef<[u8]>) -> String {
    use md5::Digest;
    let mut hasher = md5::Md5::new();
    hasher.update(content.as_ref());
    hex::encode(hasher.finalize())
}

/// Reads the json file and deserialize it into the provided type
pub fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, SolcError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|err| SolcError::io(err, path))?;
    serde_json::from_str(&contents).map_err(Into::into)
}

/// Writes serializes the provided value to JSON and writes it to a file atomically
///
/// The content is first written to a temporary file in the same directory which is then renamed
/// to `path`, so readers never observe a partially written file.
pub fn write_json_file_atomic<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), SolcError> {
    let path = path.as_ref();
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    create_parent_dir_all(path)?;
    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|err| SolcError::io(err, dir))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush().map_err(|err| SolcError::io(err, tmp.path()))?;
    }
    tmp.as_file().sync_all().map_err(|err| SolcError::io(err, tmp.path()))?;
    tmp.persist(path).map_err(|err| SolcError::io(err.error, path))?;
    Ok(())
}

/// Creates the parent directory of the `file` and all its ancestors if it does not exist
/// See [`std::fs::create_dir_all()`]
pub fn create_parent_dir_all(file: impl AsRef<Path>) -> Result<(), SolcError> {
    let file = file.as_ref();
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            SolcError::msg(format!(
                "Failed to create artifact parent folder \"{}\": {}",
                parent.display(),
                err
            ))
        })?;
    }
    Ok(())
}

/// Creates a new named tempdir
#[cfg(any(test, feature = "project-util"))]
pub fn tempdir(name: &str) -> Result<tempfile::TempDir, SolcIoError> {
    tempfile::Builder::new().prefix(name).tempdir().map_err(|err| SolcIoError::new(err, name))
}
