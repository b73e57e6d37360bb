//! Utilities for mocking project workspaces
use crate::{
    compile::Compiler,
    config::ProjectPathsConfigBuilder,
    error::{Result, SolcError},
    project_util::mock::{MockCompiler, MockProjectGenerator},
    utils,
    utils::tempdir,
    Project, ProjectCompileOutput, ProjectPathsConfig, Settings, SolFilesCache, SolcIoError,
};
use semver::Version;
use std::{
    fmt,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

pub mod mock;

/// A [`Project`] wrapper that lives in a new temporary directory
///
/// Once `TempProject` is dropped, the temp dir is automatically removed, see [`TempDir::drop()`]
pub struct TempProject<C: Compiler = MockCompiler> {
    /// temporary workspace root
    _root: TempDir,
    /// actual project workspace with the `root` tempdir as its root
    inner: Project<C>,
}

impl<C: Compiler> TempProject<C> {
    /// Makes sure the sources and package dirs exist
    pub fn create_new(root: TempDir, inner: Project<C>) -> std::result::Result<Self, SolcIoError> {
        let project = Self { _root: root, inner };
        let paths = project.paths();
        for dir in std::iter::once(&paths.sources).chain(paths.libraries.iter()) {
            std::fs::create_dir_all(dir).map_err(|err| SolcIoError::new(err, dir))?;
        }
        Ok(project)
    }

    /// Creates a new temp project inside a tempdir with a prefixed directory and the given
    /// compiler
    pub fn prefixed_with_compiler(
        prefix: &str,
        paths: ProjectPathsConfigBuilder,
        compiler: C,
    ) -> Result<Self> {
        let tmp_dir = tempdir(prefix)?;
        let paths = paths.build_with_root(tmp_dir.path())?;
        let inner = Project::builder().paths(paths).build_with_compiler(compiler)?;
        Ok(Self::create_new(tmp_dir, inner)?)
    }

    /// Creates a new temp project with the default layout that compiles with `compiler`
    pub fn with_compiler(compiler: C) -> Result<Self> {
        Self::prefixed_with_compiler("temp-project", ProjectPathsConfig::builder(), compiler)
    }

    /// Overwrites the settings to pass to the compiler
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.inner.settings = settings;
        self
    }

    /// Compile every unit with the given version
    pub fn set_pin(&mut self, version: Version) -> &mut Self {
        self.inner.pin = Some(version);
        self
    }

    pub fn project(&self) -> &Project<C> {
        &self.inner
    }

    pub fn project_mut(&mut self) -> &mut Project<C> {
        &mut self.inner
    }

    pub fn compiler(&self) -> &C {
        &self.inner.compiler
    }

    pub fn compile(&self) -> Result<ProjectCompileOutput> {
        self.project().compile()
    }

    /// Compiles the given targets, see [`Project::compile_targets()`]
    pub fn compile_targets<I, S>(&self, targets: I, force: bool) -> Result<ProjectCompileOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.project().compile_targets(targets, force)
    }

    /// The configured paths of the project
    pub fn flatten(&self, target: impl AsRef<str>) -> Result<String> {
        self.project().flatten(target)
    }

    pub fn paths(&self) -> &ProjectPathsConfig {
        &self.project().paths
    }

    /// The configured paths of the project
    pub fn paths_mut(&mut self) -> &mut ProjectPathsConfig {
        &mut self.project_mut().paths
    }

    /// Returns the path to the sources directory
    pub fn sources_path(&self) -> &PathBuf {
        &self.paths().sources
    }

    /// Returns the path to the cache file
    pub fn cache_path(&self) -> &PathBuf {
        &self.paths().cache
    }

    /// The root path of the temporary workspace
    pub fn root(&self) -> &Path {
        self.project().paths.root.as_path()
    }

    /// Reads the cache file as it is on disk
    pub fn read_cache_file(&self) -> Result<SolFilesCache> {
        SolFilesCache::read(self.cache_path())
    }

    fn get_lib(&self) -> Result<PathBuf> {
        self.paths()
            .libraries
            .first()
            .cloned()
            .ok_or_else(|| SolcError::msg("No libraries folders configured"))
    }

    /// Adds a new file to the project's main package root, `name` includes the package dir like
    /// `solmate/src/ERC20.sol`
    pub fn add_lib(&self, name: impl AsRef<str>, content: impl AsRef<str>) -> Result<PathBuf> {
        let name = contract_file_name(name);
        let lib_dir = self.get_lib()?;
        create_contract_file(lib_dir.join(name), content)
    }

    /// Adds a basic lib contract `contract <name> {}` as a new file
    pub fn add_basic_lib(
        &self,
        name: impl AsRef<str>,
        version: impl AsRef<str>,
    ) -> Result<PathBuf> {
        let name = name.as_ref();
        let name = name.strip_suffix(".sol").unwrap_or(name);
        let contract = Path::new(name).file_name().and_then(|n| n.to_str()).unwrap_or(name);
        self.add_lib(name, basic_contract(contract, version.as_ref()))
    }

    /// Adds a new source file inside the project's source dir
    pub fn add_source(&self, name: impl AsRef<str>, content: impl AsRef<str>) -> Result<PathBuf> {
        let name = contract_file_name(name);
        let source = self.paths().sources.join(name);
        create_contract_file(source, content)
    }

    /// Adds a basic source contract `contract <name> {}` as a new file
    pub fn add_basic_source(
        &self,
        name: impl AsRef<str>,
        version: impl AsRef<str>,
    ) -> Result<PathBuf> {
        let name = name.as_ref();
        let name = name.strip_suffix(".sol").unwrap_or(name);
        self.add_source(name, basic_contract(name, version.as_ref()))
    }

    /// Adds a solidity contract in the project's root dir.
    /// This will also create all intermediary dirs.
    pub fn add_contract(&self, name: impl AsRef<str>, content: impl AsRef<str>) -> Result<PathBuf> {
        let name = contract_file_name(name);
        let source = self.root().join(name);
        create_contract_file(source, content)
    }

    /// Populate the project with mock files
    pub fn mock(&self, gen: &MockProjectGenerator, version: impl AsRef<str>) -> Result<()> {
        gen.write_to(self.paths(), version)
    }

    /// Compiles the project and ensures that no target failed
    pub fn ensure_no_errors(&self) -> Result<&Self> {
        let compiled = self.compile()?;
        if let Some(failure) = compiled.failures.into_iter().next() {
            return Err(failure.error)
        }
        Ok(self)
    }

    /// Compiles the project and ensures that the output is __unchanged__
    pub fn ensure_unchanged(&self) -> Result<&Self> {
        let compiled = self.compile()?;
        if !compiled.is_unchanged() {
            return Err(SolcError::msg(format!(
                "Compiled {} units, expected no changes",
                compiled.compiled.len()
            )))
        }
        Ok(self)
    }

    /// Compiles the project and ensures that the output has __changed__
    pub fn ensure_changed(&self) -> Result<&Self> {
        let compiled = self.compile()?;
        if compiled.is_unchanged() {
            return Err(SolcError::msg("Compiled without detecting changes"))
        }
        Ok(self)
    }

    /// Compiles the project and asserts that no target failed
    pub fn assert_no_errors(&self) -> &Self {
        let compiled = self.compile().unwrap();
        assert!(!compiled.has_failures(), "{:#?}", compiled.failures);
        self
    }

    /// Compiles the project and asserts that the output is unchanged
    pub fn assert_unchanged(&self) -> &Self {
        let compiled = self.compile().unwrap();
        assert!(compiled.is_unchanged());
        self
    }

    /// Compiles the project and asserts that the output is _changed_
    pub fn assert_changed(&self) -> &Self {
        let compiled = self.compile().unwrap();
        assert!(!compiled.is_unchanged());
        self
    }

    /// Compiles the project and asserts that the output does not contain errors and no changes
    /// exists on recompiled.
    pub fn assert_no_errors_recompile_unchanged(&self) -> &Self {
        self.assert_no_errors().assert_unchanged()
    }

    /// Returns a list of all source files in the project's sources directory
    pub fn list_source_files(&self) -> Vec<PathBuf> {
        utils::source_files(self.sources_path())
    }
}

impl TempProject<MockCompiler> {
    /// Creates a new temp project using the provided paths and a default [`MockCompiler`]
    pub fn new(paths: ProjectPathsConfigBuilder) -> Result<Self> {
        Self::prefixed_with_compiler("temp-project", paths, MockCompiler::default())
    }

    /// Creates an empty project with the default layout and a default [`MockCompiler`]
    pub fn mocked_compiler() -> Result<Self> {
        Self::new(ProjectPathsConfig::builder())
    }

    /// Create a new temporary project and populate it with mock files
    ///
    /// ```no_run
    /// use solbuild_solc::project_util::{mock::MockProjectGenerator, TempProject};
    /// let tmp = TempProject::mocked(&MockProjectGenerator::new(10, 2), "^0.8.10").unwrap();
    /// ```
    pub fn mocked(gen: &MockProjectGenerator, version: impl AsRef<str>) -> Result<Self> {
        let tmp = Self::mocked_compiler()?;
        tmp.mock(gen, version)?;
        Ok(tmp)
    }
}

impl<C: Compiler> fmt::Debug for TempProject<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempProject").field("paths", self.paths()).finish()
    }
}

impl<C: Compiler> AsRef<Project<C>> for TempProject<C> {
    fn as_ref(&self) -> &Project<C> {
        self.project()
    }
}

fn basic_contract(name: &str, version: &str) -> String {
    format!(
        r#"
// SPDX-License-Identifier: UNLICENSED
pragma solidity {version};
contract {name} {{}}
            "#
    )
}

pub(crate) fn create_contract_file(path: PathBuf, content: impl AsRef<str>) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| SolcIoError::new(err, parent.to_path_buf()))?;
    }
    std::fs::write(&path, content.as_ref()).map_err(|err| SolcIoError::new(err, path.clone()))?;
    Ok(path)
}

fn contract_file_name(name: impl AsRef<str>) -> String {
    let name = name.as_ref().trim();
    if name.ends_with(".sol") {
        name.to_string()
    } else {
        format!("{name}.sol")
    }
}
