use crate::{
    cache::ArtifactRef,
    config::Settings,
    error::CompilerError,
    planner::CompilationUnit,
    source::Source,
    utils,
};
use once_cell::sync::Lazy;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
    sync::Arc,
};

pub mod project;

/// The name of the `solc` binary on the system
pub const SOLC: &str = "solc";

/// Support for configuring the EVM version
/// <https://blog.soliditylang.org/2018/03/08/solidity-0.4.21-release-announcement/>
pub const BYZANTIUM_SOLC: Version = Version::new(0, 4, 21);

/// Bug fix for configuring the EVM version with Constantinople
/// <https://blog.soliditylang.org/2018/03/08/solidity-0.4.21-release-announcement/>
pub const CONSTANTINOPLE_SOLC: Version = Version::new(0, 4, 22);

/// Petersburg support
/// <https://blog.soliditylang.org/2019/03/05/solidity-0.5.5-release-announcement/>
pub const PETERSBURG_SOLC: Version = Version::new(0, 5, 5);

/// Istanbul support
/// <https://blog.soliditylang.org/2019/12/09/solidity-0.5.14-release-announcement/>
pub const ISTANBUL_SOLC: Version = Version::new(0, 5, 14);

/// Berlin support
/// <https://blog.soliditylang.org/2021/06/10/solidity-0.8.5-release-announcement/>
pub const BERLIN_SOLC: Version = Version::new(0, 8, 5);

/// London support
/// <https://blog.soliditylang.org/2021/08/11/solidity-0.8.7-release-announcement/>
pub const LONDON_SOLC: Version = Version::new(0, 8, 7);

/// Paris support
/// <https://blog.soliditylang.org/2023/02/01/solidity-0.8.18-release-announcement/>
pub const PARIS_SOLC: Version = Version::new(0, 8, 18);

/// Shanghai support
/// <https://blog.soliditylang.org/2023/05/10/solidity-0.8.20-release-announcement/>
pub const SHANGHAI_SOLC: Version = Version::new(0, 8, 20);

/// First version that accepts the `viaIR` setting
/// <https://blog.soliditylang.org/2020/11/18/solidity-0.7.5-release-announcement/>
pub const VIA_IR_SOLC: Version = Version::new(0, 7, 5);

/// `--base-path` was introduced in 0.6.9 <https://github.com/ethereum/solidity/releases/tag/v0.6.9>
pub static SUPPORTS_BASE_PATH: Lazy<VersionReq> =
    Lazy::new(|| VersionReq::parse(">=0.6.9").expect("valid version req"));

/// The compiler backend that turns a [`CompilationUnit`] into artifacts
///
/// Implementations must be callable from multiple threads, the project compiler dispatches
/// independent units in parallel.
pub trait Compiler: Send + Sync {
    /// Versions that can be used without installing anything
    fn installed_versions(&self) -> Vec<Version>;

    /// Versions that could be installed, may include installed ones
    fn available_versions(&self) -> Vec<Version>;

    /// Makes `version` available, called before any unit that needs it is compiled
    fn install(&self, version: &Version) -> Result<(), CompilerError>;

    /// Compiles all files of the unit in a single invocation
    fn compile(&self, unit: &CompilationUnit) -> Result<RawOutput, CompilerError>;
}

/// Artifact references produced by a single compiler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    /// Reference to the output of the entire unit
    pub artifact: ArtifactRef,
    /// Per file references, for files the compiler reported output for
    pub artifacts: BTreeMap<PathBuf, ArtifactRef>,
}

impl RawOutput {
    pub fn new(artifact: ArtifactRef) -> Self {
        Self { artifact, artifacts: Default::default() }
    }

    /// Returns the reference for the file, the unit's reference if the file has no own output
    pub fn artifact_of(&self, file: &Path) -> &ArtifactRef {
        self.artifacts.get(file).unwrap_or(&self.artifact)
    }
}

/// Input type `solc` expects
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompilerInput {
    pub language: String,
    /// source unit name -> content
    pub sources: BTreeMap<String, Source>,
    pub settings: Settings,
}

impl CompilerInput {
    /// Creates the input for the unit, with source names relative to `root`
    pub fn new(unit: &CompilationUnit, root: &Path) -> Self {
        let sources = unit
            .sources
            .iter()
            .map(|(file, source)| {
                (utils::slash_path(utils::source_name(file, root)), source.clone())
            })
            .collect();
        Self { language: "Solidity".to_string(), sources, settings: unit.settings.clone() }
    }
}

/// The parts of the `solc` output the adapter inspects
#[derive(Debug, Default, Deserialize)]
struct SolcOutput {
    #[serde(default)]
    errors: Vec<SolcDiagnostic>,
    #[serde(default)]
    sources: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolcDiagnostic {
    severity: String,
    #[serde(default)]
    message: String,
    formatted_message: Option<String>,
}

impl SolcDiagnostic {
    fn is_error(&self) -> bool {
        self.severity.eq_ignore_ascii_case("error")
    }
}

impl fmt::Display for SolcDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.formatted_message {
            Some(ref msg) => f.write_str(msg.trim_end()),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// A `solc` executable
#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Solc {
    /// Path to the `solc` executable
    pub solc: PathBuf,
    /// The base path to set when invoking solc, see also <https://docs.soliditylang.org/en/v0.8.11/path-resolution.html#base-path-and-include-paths>
    pub base_path: Option<PathBuf>,
    /// Additional arguments passed to the `solc` executable
    pub args: Vec<String>,
}

impl fmt::Display for Solc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.solc.display())?;
        if !self.args.is_empty() {
            write!(f, " {}", self.args.join(" "))?;
        }
        Ok(())
    }
}

impl Solc {
    /// A new instance which points to `solc`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Solc { solc: path.into(), base_path: None, args: Vec::new() }
    }

    /// Sets solc's base path
    pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    /// Adds multiple arguments to pass to the `solc`.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Returns the path of an installed version in the [svm](https://github.com/roynalnaruto/svm-rs) layout
    ///
    /// This is `<svm_home>/<version>/solc-<version>`.
    pub fn find_svm_installed_version(svm_home: &Path, version: &Version) -> Option<Self> {
        let solc = svm_home.join(version.to_string()).join(format!("solc-{version}"));
        solc.is_file().then(|| Solc::new(solc))
    }

    /// Runs `solc --standard-json` and returns the raw output
    pub fn compile_output<T: Serialize>(&self, input: &T) -> Result<Vec<u8>, CompilerError> {
        let mut cmd = Command::new(&self.solc);
        if let Some(ref base_path) = self.base_path {
            cmd.current_dir(base_path);
            cmd.arg("--base-path").arg(base_path);
        }
        let mut child = cmd
            .args(&self.args)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|err| CompilerError::Io(format!("{}: {err}", self.solc.display())))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CompilerError::Io(format!("{}: no stdin", self.solc.display())))?;
        serde_json::to_writer(stdin, input)
            .map_err(|err| CompilerError::Io(format!("{}: {err}", self.solc.display())))?;
        compile_output(
            child
                .wait_with_output()
                .map_err(|err| CompilerError::Io(format!("{}: {err}", self.solc.display())))?,
        )
    }
}

fn compile_output(output: Output) -> Result<Vec<u8>, CompilerError> {
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(CompilerError::failed(String::from_utf8_lossy(&output.stderr).trim().to_string()))
    }
}

/// Returns the directory in which [svm](https://github.com/roynalnaruto/svm-rs) stores all versions
///
/// This will be `~/.svm` on unix
#[cfg(not(target_arch = "wasm32"))]
pub fn svm_home() -> Option<PathBuf> {
    home::home_dir().map(|dir| dir.join(".svm"))
}

#[cfg(target_arch = "wasm32")]
pub fn svm_home() -> Option<PathBuf> {
    None
}

/// Returns all versions installed in the svm layout under `svm_home`, sorted
pub fn installed_versions(svm_home: &Path) -> Vec<Version> {
    let Ok(dirs) = std::fs::read_dir(svm_home) else { return Vec::new() };
    let mut versions: Vec<_> = dirs
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str().and_then(|name| Version::parse(name).ok()))
        .filter(|version| Solc::find_svm_installed_version(svm_home, version).is_some())
        .collect();
    versions.sort_unstable();
    versions
}

/// Installs a version into the svm home, like downloading a release
pub type Installer = Arc<dyn Fn(&Version, &Path) -> Result<(), CompilerError> + Send + Sync>;

/// [`Compiler`] that invokes `solc` binaries installed in the svm layout
///
/// Each unit's standard-json output is written to `<artifacts>/<version>/<unit id>.json`, the
/// per file references are `<output file>#<source name>`.
#[derive(Clone)]
pub struct SolcCompiler {
    root: PathBuf,
    artifacts: PathBuf,
    svm_home: Option<PathBuf>,
    available: Vec<Version>,
    installer: Option<Installer>,
    args: Vec<String>,
}

impl fmt::Debug for SolcCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolcCompiler")
            .field("root", &self.root)
            .field("artifacts", &self.artifacts)
            .field("svm_home", &self.svm_home)
            .field("available", &self.available)
            .field("installer", &self.installer.is_some())
            .field("args", &self.args)
            .finish()
    }
}

impl SolcCompiler {
    /// Compiles relative to `root` and writes output to `artifacts`, using the default svm home
    pub fn new(root: impl Into<PathBuf>, artifacts: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            artifacts: artifacts.into(),
            svm_home: svm_home(),
            available: Vec::new(),
            installer: None,
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn svm_home(mut self, svm_home: impl Into<PathBuf>) -> Self {
        self.svm_home = Some(svm_home.into());
        self
    }

    /// Versions that the installer can provide
    #[must_use]
    pub fn available(mut self, versions: impl IntoIterator<Item = Version>) -> Self {
        self.available.extend(versions);
        self
    }

    #[must_use]
    pub fn installer(mut self, installer: Installer) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Extra arguments for every `solc` invocation
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn solc(&self, version: &Version) -> Result<Solc, CompilerError> {
        let solc = self
            .svm_home
            .as_deref()
            .and_then(|home| Solc::find_svm_installed_version(home, version))
            .ok_or_else(|| CompilerError::NotInstalled { version: version.clone() })?;
        let solc = if SUPPORTS_BASE_PATH.matches(version) {
            solc.with_base_path(&self.root)
        } else {
            solc
        };
        Ok(solc.args(self.args.iter().cloned()))
    }

    /// Where the output of the unit is written
    pub fn output_file(&self, unit: &CompilationUnit) -> PathBuf {
        self.artifacts.join(unit.version.to_string()).join(format!("{}.json", unit.id))
    }
}

impl Compiler for SolcCompiler {
    fn installed_versions(&self) -> Vec<Version> {
        self.svm_home.as_deref().map(installed_versions).unwrap_or_default()
    }

    fn available_versions(&self) -> Vec<Version> {
        let mut versions = self.installed_versions();
        versions.extend(self.available.iter().cloned());
        versions.sort_unstable();
        versions.dedup();
        versions
    }

    fn install(&self, version: &Version) -> Result<(), CompilerError> {
        let not_installed = || CompilerError::NotInstalled { version: version.clone() };
        let home = self.svm_home.as_deref().ok_or_else(not_installed)?;
        if Solc::find_svm_installed_version(home, version).is_some() {
            return Ok(())
        }
        let installer = self.installer.as_ref().ok_or_else(not_installed)?;
        tracing::trace!("installing solc {}", version);
        installer(version, home)?;
        Solc::find_svm_installed_version(home, version).map(|_| ()).ok_or_else(not_installed)
    }

    fn compile(&self, unit: &CompilationUnit) -> Result<RawOutput, CompilerError> {
        let solc = self.solc(unit.version.as_ref())?;
        let input = CompilerInput::new(unit, &self.root);
        tracing::trace!("compiling unit {} with {}", unit.id, solc);

        let output = solc.compile_output(&input)?;
        let value: serde_json::Value = serde_json::from_slice(&output)
            .map_err(|err| CompilerError::failed(format!("invalid solc output: {err}")))?;
        let parsed = SolcOutput::deserialize(&value)
            .map_err(|err| CompilerError::failed(format!("invalid solc output: {err}")))?;

        let errors: Vec<_> =
            parsed.errors.iter().filter(|e| e.is_error()).map(ToString::to_string).collect();
        if !errors.is_empty() {
            return Err(CompilerError::failed(errors.join("\n")))
        }

        let file = self.output_file(unit);
        utils::write_json_file_atomic(&value, &file)
            .map_err(|err| CompilerError::Io(err.to_string()))?;

        let file_name = utils::slash_path(&file);
        let mut raw = RawOutput::new(ArtifactRef::new(file_name.clone()));
        for path in unit.files() {
            let name = utils::slash_path(utils::source_name(path, &self.root));
            if parsed.sources.contains_key(&name) {
                raw.artifacts.insert(path.clone(), ArtifactRef::new(format!("{file_name}#{name}")));
            }
        }
        Ok(raw)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{
        source::Sources,
        version::SolcVersion,
    };
    use std::{fs, os::unix::fs::PermissionsExt};

    fn fake_solc(home: &Path, version: &Version, output: &str) {
        let dir = home.join(version.to_string());
        fs::create_dir_all(&dir).unwrap();
        let bin = dir.join(format!("solc-{version}"));
        fs::write(&bin, format!("#!/bin/sh\ncat > /dev/null\necho '{output}'\n")).unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn unit(root: &Path, version: Version) -> CompilationUnit {
        let file = root.join("src/A.sol");
        let sources = Sources::from([(file.clone(), Source::new("contract A {}"))]);
        let settings = Settings::default();
        CompilationUnit {
            id: "abc".to_string(),
            version: SolcVersion::Installed(version),
            targets: vec![file],
            sources,
            remappings: vec![],
            settings_fingerprint: settings.fingerprint().unwrap(),
            settings,
        }
    }

    #[test]
    fn writes_unit_output() {
        let tmp = utils::tempdir("solc").unwrap();
        let home = tmp.path().join("svm");
        let root = tmp.path().join("project");
        fs::create_dir_all(&root).unwrap();
        let version = Version::new(0, 8, 19);
        fake_solc(&home, &version, r#"{"sources":{"src/A.sol":{"id":0}},"contracts":{}}"#);

        let compiler = SolcCompiler::new(&root, root.join("out")).svm_home(&home);
        assert_eq!(compiler.installed_versions(), vec![version.clone()]);
        assert!(compiler.install(&version).is_ok());

        let unit = unit(&root, version);
        let raw = compiler.compile(&unit).unwrap();
        let file = compiler.output_file(&unit);
        assert!(file.is_file());
        assert_eq!(raw.artifact.as_str(), utils::slash_path(&file));
        assert_eq!(
            raw.artifact_of(&root.join("src/A.sol")).as_str(),
            format!("{}#src/A.sol", utils::slash_path(&file))
        );
    }

    #[test]
    fn reports_errors_and_missing_versions() {
        let tmp = utils::tempdir("solc").unwrap();
        let home = tmp.path().join("svm");
        let root = tmp.path().join("project");
        fs::create_dir_all(&root).unwrap();
        let version = Version::new(0, 8, 19);
        fake_solc(
            &home,
            &version,
            r#"{"errors":[{"severity":"warning","message":"unused"},{"severity":"error","message":"boom"}]}"#,
        );

        let compiler = SolcCompiler::new(&root, root.join("out")).svm_home(&home);
        let err = compiler.compile(&unit(&root, version)).unwrap_err();
        assert_eq!(err, CompilerError::failed("error: boom"));

        let missing = Version::new(0, 7, 6);
        assert_eq!(
            compiler.compile(&unit(&root, missing.clone())).unwrap_err(),
            CompilerError::NotInstalled { version: missing.clone() }
        );
        assert_eq!(compiler.install(&missing), Err(CompilerError::NotInstalled { version: missing }));
    }
}
