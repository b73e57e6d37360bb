//! Support for incremental compilation
use crate::{
    error::{Result, SolcError},
    utils,
};
use parking_lot::{Mutex, RwLock};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    fmt, fs,
    path::{Path, PathBuf},
    time::{Duration, UNIX_EPOCH},
};

/// solbuild cache format version
///
/// Cache files with a different format id were written by another tool or an incompatible version
/// and are discarded.
const SOLBUILD_FORMAT_VERSION: &str = "solbuild-sol-cache-1";

/// The file name of the default cache file
pub const SOLIDITY_FILES_CACHE_FILENAME: &str = "solidity-files-cache.json";

/// An opaque reference to the compiler output of a file
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(pub String);

impl ArtifactRef {
    pub fn new(artifact: impl Into<String>) -> Self {
        Self(artifact.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The on disk representation of the cache
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SolFilesCache {
    #[serde(rename = "_format")]
    pub format: String,
    pub files: BTreeMap<PathBuf, CacheEntry>,
}

impl SolFilesCache {
    /// Create a new cache instance with the given files
    pub fn new(files: BTreeMap<PathBuf, CacheEntry>) -> Self {
        Self { format: SOLBUILD_FORMAT_VERSION.to_string(), files }
    }

    /// Reads the cache json file from the given path
    #[tracing::instrument(skip_all, name = "sol-files-cache::read")]
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::trace!("reading solfiles cache at {}", path.display());
        let cache: SolFilesCache = utils::read_json_file(path)?;
        tracing::trace!("read cache \"{}\" with {} entries", cache.format, cache.files.len());
        Ok(cache)
    }

    /// Write the cache to json file, atomically
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        tracing::trace!("writing cache to json file: \"{}\"", path.display());
        utils::write_json_file_atomic(self, path)?;
        tracing::trace!("cache file located: \"{}\"", path.display());
        Ok(())
    }

    /// Drops the artifacts of `file` and of every file that imports it, transitively
    ///
    /// Returns all files that were invalidated.
    fn invalidate_dependents(&mut self, file: &Path) -> BTreeSet<PathBuf> {
        let mut dependents: HashMap<&Path, Vec<&Path>> = HashMap::new();
        for (importer, entry) in self.files.iter() {
            for import in entry.imports.iter() {
                dependents.entry(import.as_path()).or_default().push(importer.as_path());
            }
        }

        let mut invalidated = BTreeSet::new();
        let mut queue = VecDeque::from([file.to_path_buf()]);
        while let Some(next) = queue.pop_front() {
            if let Some(importers) = dependents.get(next.as_path()) {
                queue.extend(
                    importers
                        .iter()
                        .filter(|importer| !invalidated.contains(**importer))
                        .map(|importer| importer.to_path_buf()),
                );
            }
            invalidated.insert(next);
        }

        for file in invalidated.iter() {
            if let Some(entry) = self.files.get_mut(file) {
                entry.artifacts.clear();
            }
        }
        invalidated
    }
}

impl Default for SolFilesCache {
    fn default() -> Self {
        SolFilesCache { format: SOLBUILD_FORMAT_VERSION.to_string(), files: Default::default() }
    }
}

/// A `CacheEntry` in the cache file represents a solidity file
///
/// A file can be compiled with multiple `solc` versions and settings, each combination produces a
/// separate artifact, tracked as `version -> settings fingerprint -> artifact`. All artifacts
/// belong to the content identified by `content_hash`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// the last modification time of this file
    pub last_modification_date: u64,
    /// hash to identify whether the content of the file changed
    pub content_hash: String,
    /// identifier name see [`crate::utils::source_name()`]
    pub source_name: PathBuf,
    /// the direct, fully resolved imports of the file
    ///
    /// all paths start relative from the project's root: `src/importedFile.sol`
    pub imports: Vec<PathBuf>,
    /// The solidity version pragma
    pub version_requirement: Option<String>,
    /// all artifacts produced for this file
    pub artifacts: BTreeMap<Version, BTreeMap<String, ArtifactRef>>,
}

impl CacheEntry {
    fn new(source_name: PathBuf, content_hash: String) -> Self {
        Self {
            last_modification_date: 0,
            content_hash,
            source_name,
            imports: Vec::new(),
            version_requirement: None,
            artifacts: BTreeMap::new(),
        }
    }

    /// Returns the last modified timestamp `Duration`
    pub fn last_modified(&self) -> Duration {
        Duration::from_millis(self.last_modification_date)
    }

    /// Reads the last modification date from the file's metadata
    pub fn read_last_modification_date(file: impl AsRef<Path>) -> Result<u64> {
        let file = file.as_ref();
        let last_modification_date = fs::metadata(file)
            .map_err(|err| SolcError::io(err, file.to_path_buf()))?
            .modified()
            .map_err(|err| SolcError::io(err, file.to_path_buf()))?
            .duration_since(UNIX_EPOCH)
            .map_err(|err| SolcError::msg(err.to_string()))?
            .as_millis() as u64;
        Ok(last_modification_date)
    }

    /// Returns the artifact for the version and settings
    pub fn artifact(&self, version: &Version, settings: &str) -> Option<&ArtifactRef> {
        self.artifacts.get(version)?.get(settings)
    }

    /// Returns `true` if the artifacts set contains the given version
    pub fn contains_version(&self, version: &Version) -> bool {
        self.artifacts.contains_key(version)
    }

    /// Iterator that yields all artifacts
    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactRef> {
        self.artifacts.values().flat_map(|artifacts| artifacts.values())
    }
}

/// The persisted compilation cache of a project
///
/// This is the only place that knows whether a file needs to be compiled again. Lookups may happen
/// concurrently, updates are serialized and [`Self::persist`] replaces the cache file atomically.
#[derive(Debug)]
pub struct CacheStore {
    /// location of the cache file
    path: PathBuf,
    /// project root, entries are keyed relative to it
    root: PathBuf,
    inner: RwLock<SolFilesCache>,
    /// serializes writes of the cache file
    persist_lock: Mutex<()>,
}

impl CacheStore {
    /// Creates an empty cache that will be written to `path`
    pub fn empty(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self::with_cache(path.into(), root.into(), SolFilesCache::default())
    }

    fn with_cache(path: PathBuf, root: PathBuf, cache: SolFilesCache) -> Self {
        Self { path, root, inner: RwLock::new(cache), persist_lock: Mutex::new(()) }
    }

    /// Opens the cache file at `path`
    ///
    /// A missing file is an empty cache. A file that can't be read, isn't valid json or was written
    /// in another format is discarded with a warning and also results in an empty cache.
    #[tracing::instrument(name = "CacheStore::open", skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, root: impl Into<PathBuf>) -> Self {
        let path = path.as_ref();
        let root = root.into();
        if !path.exists() {
            tracing::trace!("no cache file found");
            return Self::empty(path, root)
        }

        let cache = match SolFilesCache::read(path) {
            Ok(cache) if cache.format == SOLBUILD_FORMAT_VERSION => cache,
            Ok(cache) => {
                let err = SolcError::CacheCorruption {
                    path: path.to_path_buf(),
                    reason: format!("unsupported format \"{}\"", cache.format),
                };
                tracing::warn!("{}, starting with an empty cache", err);
                SolFilesCache::default()
            }
            Err(err) => {
                let err =
                    SolcError::CacheCorruption { path: path.to_path_buf(), reason: err.to_string() };
                tracing::warn!("{}, starting with an empty cache", err);
                SolFilesCache::default()
            }
        };
        tracing::debug!("opened cache with {} entries", cache.files.len());
        Self::with_cache(path.to_path_buf(), root, cache)
    }

    /// The location of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn key(&self, file: &Path) -> PathBuf {
        utils::source_name(file, &self.root).to_path_buf()
    }

    /// Returns the artifact for the exact combination of content, compiler version and settings
    pub fn get(
        &self,
        file: &Path,
        fingerprint: &str,
        version: &Version,
        settings: &str,
    ) -> Option<ArtifactRef> {
        let cache = self.inner.read();
        let entry = cache.files.get(&self.key(file))?;
        if entry.content_hash != fingerprint {
            return None
        }
        entry.artifact(version, settings).cloned()
    }

    /// Records the artifact of a file
    ///
    /// If the file's content changed, the artifacts of the previous content are dropped.
    #[allow(clippy::too_many_arguments)]
    pub fn put(
        &self,
        file: &Path,
        fingerprint: &str,
        version: &Version,
        settings: &str,
        artifact: ArtifactRef,
        imports: impl IntoIterator<Item = PathBuf>,
        pragma: Option<String>,
    ) {
        let key = self.key(file);
        let imports = imports.into_iter().map(|import| self.key(&import)).collect();
        let last_modification_date = CacheEntry::read_last_modification_date(file).unwrap_or_default();

        let mut cache = self.inner.write();
        let entry = cache
            .files
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(key, fingerprint.to_string()));
        if entry.content_hash != fingerprint {
            tracing::trace!("content of \"{}\" changed, dropping old artifacts", file.display());
            entry.artifacts.clear();
            entry.content_hash = fingerprint.to_string();
        }
        entry.last_modification_date = last_modification_date;
        entry.imports = imports;
        entry.version_requirement = pragma;
        entry
            .artifacts
            .entry(version.clone())
            .or_default()
            .insert(settings.to_string(), artifact);
    }

    /// Returns `true` if the cache knows no content for the file or different content
    pub fn fingerprint_changed(&self, file: &Path, fingerprint: &str) -> bool {
        self.inner
            .read()
            .files
            .get(&self.key(file))
            .map(|entry| entry.content_hash != fingerprint)
            .unwrap_or(true)
    }

    /// Drops the artifacts of the file and of all files that import it, directly or transitively,
    /// according to the imports recorded in the cache
    ///
    /// Returns the invalidated files, relative to the root.
    pub fn invalidate_dependents(&self, file: &Path) -> BTreeSet<PathBuf> {
        let key = self.key(file);
        let invalidated = self.inner.write().invalidate_dependents(&key);
        tracing::trace!("invalidated {} cache entries for \"{}\"", invalidated.len(), key.display());
        invalidated
    }

    /// Removes all entries whose source file no longer exists
    pub fn retain_existing(&self) {
        let root = self.root.clone();
        self.inner.write().files.retain(|file, _| root.join(file).exists());
    }

    /// Returns a copy of the entry for the file
    pub fn entry(&self, file: &Path) -> Option<CacheEntry> {
        self.inner.read().files.get(&self.key(file)).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().files.is_empty()
    }

    /// Writes the current state to the cache file
    pub fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock();
        let snapshot = self.inner.read().clone();
        snapshot.write(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn store(root: &Path) -> CacheStore {
        CacheStore::open(root.join("cache").join(SOLIDITY_FILES_CACHE_FILENAME), root)
    }

    #[test]
    fn missing_or_corrupt_cache_is_empty() {
        let tmp = utils::tempdir("cache").unwrap();
        let cache = store(tmp.path());
        assert!(cache.is_empty());

        fs::create_dir_all(tmp.path().join("cache")).unwrap();
        fs::write(cache.path(), "{ not json").unwrap();
        assert!(store(tmp.path()).is_empty());

        fs::write(cache.path(), r#"{"_format":"hh-sol-cache-2","files":{}}"#).unwrap();
        assert!(store(tmp.path()).is_empty());
    }

    #[test]
    fn new_content_drops_old_artifacts() {
        let tmp = utils::tempdir("cache").unwrap();
        let root = tmp.path();
        let file = root.join("contracts/A.sol");
        let cache = store(root);

        cache.put(&file, "aaa", &v("0.8.19"), "s1", ArtifactRef::new("a1"), vec![], None);
        cache.put(&file, "aaa", &v("0.8.19"), "s2", ArtifactRef::new("a2"), vec![], None);
        assert_eq!(cache.get(&file, "aaa", &v("0.8.19"), "s1"), Some(ArtifactRef::new("a1")));
        assert_eq!(cache.get(&file, "aaa", &v("0.8.19"), "s2"), Some(ArtifactRef::new("a2")));
        assert_eq!(cache.get(&file, "aaa", &v("0.8.20"), "s1"), None);
        assert!(!cache.fingerprint_changed(&file, "aaa"));
        assert!(cache.fingerprint_changed(&file, "bbb"));

        cache.put(&file, "bbb", &v("0.8.19"), "s1", ArtifactRef::new("b1"), vec![], None);
        assert_eq!(cache.get(&file, "aaa", &v("0.8.19"), "s2"), None);
        assert_eq!(cache.entry(&file).unwrap().artifacts().count(), 1);
        assert_eq!(cache.entry(&file).unwrap().source_name, PathBuf::from("contracts/A.sol"));
    }

    #[test]
    fn invalidates_dependents_transitively() {
        let tmp = utils::tempdir("cache").unwrap();
        let root = tmp.path();
        let (a, b, c, d) = (
            root.join("contracts/A.sol"),
            root.join("contracts/B.sol"),
            root.join("contracts/C.sol"),
            root.join("contracts/D.sol"),
        );
        let cache = store(root);
        let put = |file: &Path, imports: Vec<PathBuf>| {
            cache.put(file, "x", &v("0.8.19"), "s", ArtifactRef::new("r"), imports, None)
        };
        put(&a, vec![b.clone()]);
        put(&b, vec![c.clone()]);
        put(&c, vec![]);
        put(&d, vec![]);

        let invalidated = cache.invalidate_dependents(&c);
        assert_eq!(
            invalidated,
            BTreeSet::from([
                PathBuf::from("contracts/A.sol"),
                PathBuf::from("contracts/B.sol"),
                PathBuf::from("contracts/C.sol")
            ])
        );
        assert_eq!(cache.get(&a, "x", &v("0.8.19"), "s"), None);
        assert_eq!(cache.get(&d, "x", &v("0.8.19"), "s"), Some(ArtifactRef::new("r")));
    }

    #[test]
    fn persists_atomically() {
        let tmp = utils::tempdir("cache").unwrap();
        let root = tmp.path();
        let file = root.join("contracts/A.sol");
        let cache = store(root);
        cache.put(
            &file,
            "x",
            &v("0.8.19"),
            "s",
            ArtifactRef::new("r"),
            vec![root.join("contracts/B.sol")],
            Some("^0.8.0".to_string()),
        );
        cache.persist().unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(cache.path()).unwrap()).unwrap();
        assert_eq!(json["_format"], SOLBUILD_FORMAT_VERSION);
        let entry = &json["files"]["contracts/A.sol"];
        assert_eq!(entry["imports"][0], "contracts/B.sol");
        assert_eq!(entry["versionRequirement"], "^0.8.0");
        assert_eq!(entry["artifacts"]["0.8.19"]["s"], "r");

        let reopened = store(root);
        assert_eq!(reopened.get(&file, "x", &v("0.8.19"), "s"), Some(ArtifactRef::new("r")));

        // the file doesn't exist on disk
        reopened.retain_existing();
        assert!(reopened.is_empty());
    }
}
