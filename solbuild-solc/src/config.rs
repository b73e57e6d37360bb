use crate::{
    cache::SOLIDITY_FILES_CACHE_FILENAME,
    compile::{
        BERLIN_SOLC, CONSTANTINOPLE_SOLC, ISTANBUL_SOLC, LONDON_SOLC, PARIS_SOLC, PETERSBURG_SOLC,
        SHANGHAI_SOLC, VIA_IR_SOLC,
    },
    error::{ImportFailureReason, Result, SolcError},
    remappings::Remapping,
    resolver::{packages::PackageIndex, Graph, ResolutionMethod},
    source::{Source, Sources},
    utils,
};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Where to find all files or where to write them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPathsConfig {
    /// Project root
    pub root: PathBuf,
    /// Path to the cache file
    pub cache: PathBuf,
    /// Where to store build artifacts
    pub artifacts: PathBuf,
    /// Where to find sources
    pub sources: PathBuf,
    /// Package roots scanned for implicit package imports
    pub libraries: Vec<PathBuf>,
    /// Additional directories absolute imports are looked up in, after the root
    pub include_paths: Vec<PathBuf>,
    /// Configured remappings
    pub remappings: Vec<Remapping>,
}

impl ProjectPathsConfig {
    pub fn builder() -> ProjectPathsConfigBuilder {
        ProjectPathsConfigBuilder::default()
    }

    /// Creates a new config with the default layout for the given root
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::builder().build_with_root(root)
    }

    /// Returns all sources found under the project's configured `sources` path
    #[tracing::instrument(skip_all, fields(sources = %self.sources.display()))]
    pub fn read_input_files(&self) -> Result<Sources> {
        Ok(Source::read_all_from(&self.sources)?)
    }

    /// Flattens the target file and its imports into a single source, see [`Graph::flatten`]
    pub fn flatten(&self, target: &Path) -> Result<String> {
        let target = utils::canonicalize(target)?;
        let sources = Sources::from([(target.clone(), Source::read(&target)?)]);
        let graph = Graph::resolve_sources(self, &self.package_index(), sources)?;
        let id = graph
            .files()
            .get(&target)
            .copied()
            .ok_or_else(|| SolcError::TargetNotFound(target.display().to_string()))?;
        graph.flatten(id)
    }

    /// Returns the index over all packages installed in the configured package roots
    pub fn package_index(&self) -> PackageIndex {
        PackageIndex::new(&self.libraries)
    }

    /// Returns the source name of the file: relative to the root if it's inside the root,
    /// slash separated
    pub fn source_name(&self, file: &Path) -> String {
        utils::slash_path(utils::source_name(file, &self.root))
    }

    /// Resolves an import of the `importer` file to a file on disk
    ///
    /// Tried in order:
    ///   1. `./` and `../` imports relative to the importing file
    ///   2. the longest configured remapping that applies to the importer
    ///   3. the import relative to the root, then to the sources dir and each include path
    ///   4. an installed package named by the first segment(s) of the import
    pub fn resolve_import(
        &self,
        packages: &PackageIndex,
        importer: &Path,
        import: &Path,
    ) -> std::result::Result<(PathBuf, ResolutionMethod), ImportFailureReason> {
        let import_str = utils::slash_path(import);

        if import_str.starts_with("./") || import_str.starts_with("../") {
            let cwd = importer.parent().unwrap_or(&self.root);
            let candidate = utils::normalize_path(cwd.join(import));
            return existing_file(candidate).map(|path| (path, ResolutionMethod::Relative))
        }

        let importer_name = self.source_name(importer);
        if let Some(remapping) = Remapping::find_best(&self.remappings, &importer_name, &import_str)
        {
            tracing::trace!("applying remapping \"{}\" to \"{}\"", remapping, import_str);
            let remapped = remapping.apply(&import_str).unwrap_or_else(|| import_str.clone());
            let candidate = utils::normalize_path(
                if Path::new(&remapped).is_absolute() {
                    PathBuf::from(remapped)
                } else {
                    self.root.join(remapped)
                },
            );
            return existing_file(candidate)
                .map(|path| (path, ResolutionMethod::Remapped(remapping.clone())))
        }

        let candidate = utils::normalize_path(self.root.join(import));
        if candidate.is_file() {
            return existing_file(candidate).map(|path| (path, ResolutionMethod::ProjectRelative))
        }

        for include in std::iter::once(&self.sources).chain(&self.include_paths) {
            let file = utils::normalize_path(include.join(import));
            if file.is_file() {
                let file = utils::canonicalized(file);
                // the compiler only knows the file by its source name
                let remapping = Remapping {
                    context: None,
                    name: import_str.clone(),
                    path: utils::slash_path(&file),
                };
                return Ok((file, ResolutionMethod::IncludePath(remapping)))
            }
        }

        if let Some(package) = packages.resolve_import(&import_str) {
            let version = package.package.version.clone();
            let name = package.package.name.clone();
            return Ok((
                utils::canonicalized(package.file),
                ResolutionMethod::Package { name, version, remapping: package.remapping },
            ))
        }

        // report a file that only differs in case before giving up
        existing_file(candidate).map(|path| (path, ResolutionMethod::ProjectRelative))
    }
}

/// Returns the canonicalized path if the file exists
fn existing_file(candidate: PathBuf) -> std::result::Result<PathBuf, ImportFailureReason> {
    if candidate.is_file() {
        return Ok(utils::canonicalized(candidate))
    }
    match utils::find_case_sensitive_existing_file(&candidate) {
        Some(existing) => Err(ImportFailureReason::CaseMismatch { existing }),
        None => Err(ImportFailureReason::NotFound),
    }
}

impl fmt::Display for ProjectPathsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "root: {}", self.root.display())?;
        writeln!(f, "contracts: {}", self.sources.display())?;
        writeln!(f, "artifacts: {}", self.artifacts.display())?;
        writeln!(f, "cache: {}", self.cache.display())?;
        writeln!(f, "libs:")?;
        for lib in &self.libraries {
            writeln!(f, "    {}", lib.display())?;
        }
        writeln!(f, "remappings:")?;
        for remapping in &self.remappings {
            writeln!(f, "    {remapping}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectPathsConfigBuilder {
    root: Option<PathBuf>,
    cache: Option<PathBuf>,
    artifacts: Option<PathBuf>,
    sources: Option<PathBuf>,
    libraries: Option<Vec<PathBuf>>,
    include_paths: Vec<PathBuf>,
    remappings: Option<Vec<Remapping>>,
}

impl ProjectPathsConfigBuilder {
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn cache(mut self, cache: impl Into<PathBuf>) -> Self {
        self.cache = Some(cache.into());
        self
    }

    pub fn artifacts(mut self, artifacts: impl Into<PathBuf>) -> Self {
        self.artifacts = Some(artifacts.into());
        self
    }

    pub fn sources(mut self, sources: impl Into<PathBuf>) -> Self {
        self.sources = Some(sources.into());
        self
    }

    /// Specifically disallow additional package roots
    pub fn no_libs(mut self) -> Self {
        self.libraries = Some(Vec::new());
        self
    }

    pub fn lib(mut self, lib: impl Into<PathBuf>) -> Self {
        self.libraries.get_or_insert_with(Vec::new).push(lib.into());
        self
    }

    pub fn libs(mut self, libs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        let libraries = self.libraries.get_or_insert_with(Vec::new);
        for lib in libs.into_iter() {
            libraries.push(lib.into());
        }
        self
    }

    pub fn include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    pub fn include_paths(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.include_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn remapping(mut self, remapping: Remapping) -> Self {
        self.remappings.get_or_insert_with(Vec::new).push(remapping);
        self
    }

    pub fn remappings(mut self, remappings: impl IntoIterator<Item = Remapping>) -> Self {
        let our_remappings = self.remappings.get_or_insert_with(Vec::new);
        for remapping in remappings.into_iter() {
            our_remappings.push(remapping);
        }
        self
    }

    pub fn build_with_root(self, root: impl Into<PathBuf>) -> Result<ProjectPathsConfig> {
        let root = utils::canonicalize(root.into())?;
        let join = |dir: PathBuf| if dir.is_absolute() { dir } else { root.join(dir) };

        let libraries = self
            .libraries
            .unwrap_or_else(|| ["lib", "node_modules", ".cache"].map(PathBuf::from).to_vec())
            .into_iter()
            .map(|lib| utils::canonicalized(join(lib)))
            .collect();

        let mut remappings = self.remappings.unwrap_or_default();
        for remapping in remappings.iter_mut() {
            remapping.slash_path();
        }
        remappings.sort_unstable();
        remappings.dedup();

        Ok(ProjectPathsConfig {
            cache: self
                .cache
                .map(join)
                .unwrap_or_else(|| root.join("cache").join(SOLIDITY_FILES_CACHE_FILENAME)),
            artifacts: self.artifacts.map(join).unwrap_or_else(|| root.join("artifacts")),
            sources: utils::canonicalized(
                self.sources.map(join).unwrap_or_else(|| root.join("contracts")),
            ),
            include_paths: self
                .include_paths
                .into_iter()
                .map(|p| utils::canonicalized(join(p)))
                .collect(),
            libraries,
            remappings,
            root,
        })
    }

    pub fn build(self) -> Result<ProjectPathsConfig> {
        let root = match self.root.clone() {
            Some(root) => root,
            None => std::env::current_dir().map_err(|err| SolcError::io(err, "."))?,
        };
        self.build_with_root(root)
    }
}

/// Compiler settings that apply to every compilation unit, serialized like solc's standard json
/// `settings` object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remappings: Vec<Remapping>,
    pub optimizer: Optimizer,
    /// This field can be used to select desired outputs based
    /// on file and contract names.
    #[serde(default)]
    pub output_selection: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    #[serde(
        default,
        with = "display_from_str_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub evm_version: Option<EvmVersion>,
    /// Change compilation pipeline to go through the Yul intermediate representation. This is
    /// false by default.
    #[serde(rename = "viaIR", default, skip_serializing_if = "Option::is_none")]
    pub via_ir: Option<bool>,
    /// Addresses of the libraries to link, by the source name of the file that uses them
    #[serde(default, skip_serializing_if = "Libraries::is_empty")]
    pub libraries: Libraries,
}

impl Settings {
    /// Returns the settings adjusted to what the given compiler version supports
    ///
    /// The evm version is capped at the latest version the compiler knows about and `viaIR` is
    /// dropped for compilers older than 0.7.5.
    pub fn normalized(&self, version: &Version) -> Settings {
        let mut settings = self.clone();
        settings.evm_version = self.evm_version.and_then(|evm| evm.normalize_version(version));
        if version < &VIA_IR_SOLC {
            settings.via_ir = None;
        }
        settings
    }

    /// Adds the remappings, sorted and without duplicates
    #[must_use]
    pub fn with_remappings(mut self, remappings: impl IntoIterator<Item = Remapping>) -> Self {
        self.remappings.extend(remappings);
        self.remappings.sort_unstable();
        self.remappings.dedup();
        self
    }

    /// Links the library `name` used by the source `file` to `address`
    #[must_use]
    pub fn with_library(
        mut self,
        file: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        self.libraries.libs.entry(file.into()).or_default().insert(name.into(), address.into());
        self
    }

    /// Returns the hex md5 over the json representation of the settings
    pub fn fingerprint(&self) -> Result<String> {
        Ok(utils::content_hash(serde_json::to_vec(self)?))
    }
}

impl Default for Settings {
    fn default() -> Self {
        let selection = ["abi", "evm.bytecode", "evm.deployedBytecode", "evm.methodIdentifiers", "metadata"]
            .map(String::from)
            .to_vec();
        let output_selection = BTreeMap::from([(
            "*".to_string(),
            BTreeMap::from([("*".to_string(), selection), (String::new(), vec!["ast".to_string()])]),
        )]);
        Self {
            remappings: Vec::new(),
            optimizer: Optimizer::default(),
            output_selection,
            evm_version: None,
            via_ir: None,
            libraries: Libraries::default(),
        }
    }
}

/// Deployed libraries in the form of `<file>:<lib>:<addr>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Libraries {
    /// All libraries, `(source name -> (Lib name -> Address))`
    pub libs: BTreeMap<String, BTreeMap<String, String>>,
}

impl Libraries {
    /// Parses all libraries in the form of `<file>:<lib>:<addr>`
    pub fn parse(libs: &[String]) -> Result<Self> {
        let mut libraries: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for lib in libs {
            let mut items = lib.split(':');
            let file = items.next().filter(|s| !s.is_empty()).ok_or_else(|| {
                SolcError::msg(format!("failed to parse path to library file: {lib}"))
            })?;
            let name = items
                .next()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| SolcError::msg(format!("failed to parse library name: {lib}")))?;
            let addr = items
                .next()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| SolcError::msg(format!("failed to parse library address: {lib}")))?;
            if items.next().is_some() {
                return Err(SolcError::msg(format!("failed to parse, too many arguments passed: {lib}")))
            }
            libraries.entry(file.to_string()).or_default().insert(name.to_string(), addr.to_string());
        }
        Ok(Self { libs: libraries })
    }

    pub fn is_empty(&self) -> bool {
        self.libs.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Optimizer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runs: Option<usize>,
}

impl Optimizer {
    pub fn runs(&mut self, runs: usize) {
        self.runs = Some(runs);
    }

    pub fn disable(&mut self) {
        self.enabled = Some(false)
    }

    pub fn enable(&mut self) {
        self.enabled = Some(true)
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self { enabled: Some(true), runs: Some(200) }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EvmVersion {
    Homestead,
    TangerineWhistle,
    SpuriousDragon,
    Byzantium,
    Constantinople,
    Petersburg,
    Istanbul,
    Berlin,
    London,
    Paris,
    Shanghai,
}

impl Default for EvmVersion {
    fn default() -> Self {
        Self::Paris
    }
}

impl EvmVersion {
    /// Checks against the given solidity `semver::Version`
    pub fn normalize_version(self, version: &Version) -> Option<EvmVersion> {
        // the EVM version flag was only added at 0.4.21
        // we work our way backwards
        if version >= &CONSTANTINOPLE_SOLC {
            // If the Solc is at least at shanghai, it supports all EVM versions
            Some(if version >= &SHANGHAI_SOLC {
                self
                // For all other cases, cap at the at-the-time highest possible
                // fork
            } else if version >= &PARIS_SOLC && self >= EvmVersion::Paris {
                EvmVersion::Paris
            } else if version >= &LONDON_SOLC && self >= EvmVersion::London {
                EvmVersion::London
            } else if version >= &BERLIN_SOLC && self >= EvmVersion::Berlin {
                EvmVersion::Berlin
            } else if version >= &ISTANBUL_SOLC && self >= EvmVersion::Istanbul {
                EvmVersion::Istanbul
            } else if version >= &PETERSBURG_SOLC && self >= EvmVersion::Petersburg {
                EvmVersion::Petersburg
            } else if self >= EvmVersion::Constantinople {
                EvmVersion::Constantinople
            } else {
                self
            })
        } else {
            None
        }
    }
}

impl fmt::Display for EvmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = match self {
            EvmVersion::Homestead => "homestead",
            EvmVersion::TangerineWhistle => "tangerineWhistle",
            EvmVersion::SpuriousDragon => "spuriousDragon",
            EvmVersion::Constantinople => "constantinople",
            EvmVersion::Petersburg => "petersburg",
            EvmVersion::Istanbul => "istanbul",
            EvmVersion::Berlin => "berlin",
            EvmVersion::London => "london",
            EvmVersion::Paris => "paris",
            EvmVersion::Shanghai => "shanghai",
            EvmVersion::Byzantium => "byzantium",
        };
        write!(f, "{string}")
    }
}

impl FromStr for EvmVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "homestead" => Ok(EvmVersion::Homestead),
            "tangerineWhistle" => Ok(EvmVersion::TangerineWhistle),
            "spuriousDragon" => Ok(EvmVersion::SpuriousDragon),
            "constantinople" => Ok(EvmVersion::Constantinople),
            "petersburg" => Ok(EvmVersion::Petersburg),
            "istanbul" => Ok(EvmVersion::Istanbul),
            "berlin" => Ok(EvmVersion::Berlin),
            "london" => Ok(EvmVersion::London),
            "paris" => Ok(EvmVersion::Paris),
            "shanghai" => Ok(EvmVersion::Shanghai),
            "byzantium" => Ok(EvmVersion::Byzantium),
            s => Err(format!("Unknown evm version: {s}")),
        }
    }
}

/// (De)serializes an optional value via its `Display` and `FromStr` impls
mod display_from_str_opt {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::{fmt, str::FromStr};

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: fmt::Display,
        S: Serializer,
    {
        if let Some(value) = value {
            serializer.collect_str(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: fmt::Display,
    {
        if let Some(s) = Option::<String>::deserialize(deserializer)? {
            s.parse().map_err(de::Error::custom).map(Some)
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn can_build_default_layout() {
        let tmp = utils::tempdir("root").unwrap();
        let paths = ProjectPathsConfig::new(tmp.path()).unwrap();
        let root = utils::canonicalize(tmp.path()).unwrap();
        assert_eq!(paths.root, root);
        assert_eq!(paths.sources, root.join("contracts"));
        assert_eq!(paths.cache, root.join("cache").join(SOLIDITY_FILES_CACHE_FILENAME));
        assert_eq!(
            paths.libraries,
            vec![root.join("lib"), root.join("node_modules"), root.join(".cache")]
        );
    }

    #[test]
    fn resolves_imports_in_order() {
        let tmp = utils::tempdir("root").unwrap();
        let root = utils::canonicalize(tmp.path()).unwrap();
        touch(&root.join("contracts/A.sol"));
        touch(&root.join("contracts/nested/B.sol"));
        touch(&root.join("vendored/oz/Ownable.sol"));
        touch(&root.join("include/shared/C.sol"));
        touch(&root.join("lib/solmate/src/ERC20.sol"));

        let paths = ProjectPathsConfig::builder()
            .remapping("@oz/=vendored/oz/".parse().unwrap())
            .include_path("include")
            .build_with_root(&root)
            .unwrap();
        let packages = paths.package_index();
        let importer = root.join("contracts/A.sol");

        let (file, method) =
            paths.resolve_import(&packages, &importer, Path::new("./nested/B.sol")).unwrap();
        assert_eq!(file, root.join("contracts/nested/B.sol"));
        assert_eq!(method, ResolutionMethod::Relative);

        let (file, method) =
            paths.resolve_import(&packages, &importer, Path::new("@oz/Ownable.sol")).unwrap();
        assert_eq!(file, root.join("vendored/oz/Ownable.sol"));
        assert!(matches!(method, ResolutionMethod::Remapped(_)));

        let (file, method) =
            paths.resolve_import(&packages, &importer, Path::new("contracts/nested/B.sol")).unwrap();
        assert_eq!(file, root.join("contracts/nested/B.sol"));
        assert_eq!(method, ResolutionMethod::ProjectRelative);

        let (file, method) =
            paths.resolve_import(&packages, &importer, Path::new("shared/C.sol")).unwrap();
        assert_eq!(file, root.join("include/shared/C.sol"));
        assert!(matches!(method, ResolutionMethod::IncludePath(_)));

        let (file, method) =
            paths.resolve_import(&packages, &importer, Path::new("solmate/src/ERC20.sol")).unwrap();
        assert_eq!(file, root.join("lib/solmate/src/ERC20.sol"));
        assert!(matches!(method, ResolutionMethod::Package { .. }));

        // the root takes precedence over the sources dir
        touch(&root.join("Shadow.sol"));
        touch(&root.join("contracts/Shadow.sol"));
        let (file, method) =
            paths.resolve_import(&packages, &importer, Path::new("Shadow.sol")).unwrap();
        assert_eq!(file, root.join("Shadow.sol"));
        assert_eq!(method, ResolutionMethod::ProjectRelative);

        let err =
            paths.resolve_import(&packages, &importer, Path::new("./Missing.sol")).unwrap_err();
        assert_eq!(err, ImportFailureReason::NotFound);
    }

    #[test]
    fn reports_case_mismatch() {
        let tmp = utils::tempdir("root").unwrap();
        let root = utils::canonicalize(tmp.path()).unwrap();
        touch(&root.join("contracts/A.sol"));
        touch(&root.join("contracts/Token.sol"));
        let paths = ProjectPathsConfig::new(&root).unwrap();
        let importer = root.join("contracts/A.sol");
        // on case insensitive file systems the import resolves
        if let Err(err) =
            paths.resolve_import(&PackageIndex::default(), &importer, Path::new("./token.sol"))
        {
            assert_eq!(
                err,
                ImportFailureReason::CaseMismatch { existing: root.join("contracts/Token.sol") }
            );
        }
    }

    #[test]
    fn resolves_imports_relative_to_sources() {
        let tmp = utils::tempdir("root").unwrap();
        let root = utils::canonicalize(tmp.path()).unwrap();
        touch(&root.join("contracts/Lib.sol"));
        touch(&root.join("contracts/sub/A.sol"));

        let paths = ProjectPathsConfig::new(&root).unwrap();
        let packages = paths.package_index();
        let (file, method) = paths
            .resolve_import(&packages, &root.join("contracts/sub/A.sol"), Path::new("Lib.sol"))
            .unwrap();
        assert_eq!(file, root.join("contracts/Lib.sol"));
        match method {
            ResolutionMethod::IncludePath(remapping) => {
                assert_eq!(remapping.name, "Lib.sol");
                assert_eq!(remapping.path, utils::slash_path(&root.join("contracts/Lib.sol")));
            }
            method => panic!("unexpected resolution {method:?}"),
        }
    }

    #[test]
    fn libraries_change_the_fingerprint() {
        let libs = Libraries::parse(&[
            "contracts/Token.sol:Math:0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string()
        ])
        .unwrap();
        assert_eq!(
            libs.libs["contracts/Token.sol"]["Math"],
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        );
        assert!(Libraries::parse(&["contracts/Token.sol:Math".to_string()]).is_err());
        assert!(Libraries::parse(&["a:b:c:d".to_string()]).is_err());

        let settings = Settings::default().with_library(
            "contracts/Token.sol",
            "Math",
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
        );
        assert_eq!(settings.libraries, libs);
        assert_ne!(settings.fingerprint().unwrap(), Settings::default().fingerprint().unwrap());

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(
            json["libraries"]["contracts/Token.sol"]["Math"],
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        );
        assert!(serde_json::to_value(Settings::default()).unwrap().get("libraries").is_none());
    }

    #[test]
    fn normalizes_settings_for_version() {
        let settings = Settings {
            evm_version: Some(EvmVersion::Shanghai),
            via_ir: Some(true),
            ..Default::default()
        };
        let old = settings.normalized(&Version::new(0, 7, 4));
        assert_eq!(old.evm_version, Some(EvmVersion::Istanbul));
        assert_eq!(old.via_ir, None);

        let new = settings.normalized(&Version::new(0, 8, 19));
        assert_eq!(new.evm_version, Some(EvmVersion::Paris));
        assert_eq!(new.via_ir, Some(true));

        assert_ne!(old.fingerprint().unwrap(), new.fingerprint().unwrap());
        assert_eq!(Optimizer::default().runs, Some(200));
        assert_eq!(Optimizer::default().enabled, Some(true));
    }

    #[test]
    fn settings_serialize_like_solc() {
        let settings = Settings {
            evm_version: Some(EvmVersion::London),
            via_ir: Some(true),
            ..Default::default()
        };
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["evmVersion"], "london");
        assert_eq!(json["viaIR"], true);
        assert_eq!(json["optimizer"]["runs"], 200);
        let de: Settings = serde_json::from_value(json).unwrap();
        assert_eq!(de, settings);
    }
}
