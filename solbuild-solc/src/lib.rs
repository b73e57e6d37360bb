#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod cache;
pub use cache::{ArtifactRef, CacheEntry, CacheStore, SolFilesCache};

pub mod compile;
pub use compile::{
    project::{CompiledUnit, ProjectCompileOutput, ProjectCompiler},
    Compiler, CompilerInput, RawOutput, Solc, SolcCompiler,
};

mod config;
pub use config::{
    EvmVersion, Libraries, Optimizer, ProjectPathsConfig, ProjectPathsConfigBuilder, Settings,
};

pub mod planner;
pub use planner::{CompilationUnit, Plan, Planner, UnitFailure};

pub mod remappings;
pub use remappings::Remapping;

pub mod resolver;
pub use resolver::Graph;

mod source;
pub use source::{Source, Sources};

pub mod version;
pub use version::{InstallRequest, SolcVersion, VersionConstraint, VersionResolver};

pub mod error;
pub use error::{CompilerError, ImportFailureReason, SolcError, SolcIoError};

pub mod utils;

/// Utilities for creating, mocking and testing of (temporary) projects
#[cfg(feature = "project-util")]
pub mod project_util;

use error::Result;
use semver::Version;
use std::path::{Path, PathBuf};

/// Represents a project workspace and handles `solc` compiling of all contracts in that workspace.
#[derive(Debug)]
pub struct Project<C: Compiler = SolcCompiler> {
    /// The layout of the project
    pub paths: ProjectPathsConfig,
    /// The compiler settings shared by all units
    pub settings: Settings,
    /// Use this version for every unit instead of selecting one from the version pragmas
    pub pin: Option<Version>,
    /// Maximum number of units compiled at the same time
    pub jobs: usize,
    /// Whether caching is enabled
    pub cached: bool,
    /// The compiler backend
    pub compiler: C,
}

impl Project {
    /// Convenience function to call `ProjectBuilder::default()`
    ///
    /// # Example
    ///
    /// Configure with `SolcCompiler` and the default layout of the current dir
    /// ```no_run
    /// use solbuild_solc::Project;
    /// let config = Project::builder().build().unwrap();
    /// ```
    pub fn builder() -> ProjectBuilder {
        ProjectBuilder::default()
    }
}

impl<C: Compiler> Project<C> {
    /// Returns the path to the cache file
    pub fn cache_path(&self) -> &Path {
        &self.paths.cache
    }

    /// Returns the root directory of the project
    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    /// Compiles all input files of the project, reusing cached artifacts
    ///
    /// # Example
    ///
    /// ```no_run
    /// use solbuild_solc::Project;
    ///
    /// let project = Project::builder().build().unwrap();
    /// let output = project.compile().unwrap();
    /// assert!(!output.has_failures());
    /// ```
    pub fn compile(&self) -> Result<ProjectCompileOutput> {
        ProjectCompiler::new(self).compile()
    }

    /// Compiles the given targets, all input files if there are none
    ///
    /// Targets are file paths relative to the root or to the sources dir, absolute paths or glob
    /// patterns. With `force` the cache is ignored and every unit is compiled.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use solbuild_solc::Project;
    ///
    /// let project = Project::builder().build().unwrap();
    /// let output = project.compile_targets(["contracts/Greeter.sol", "test/**/*.sol"], false).unwrap();
    /// ```
    pub fn compile_targets<I, S>(&self, targets: I, force: bool) -> Result<ProjectCompileOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let targets = self.resolve_targets(targets)?;
        ProjectCompiler::new(self).with_targets(targets).force(force).compile()
    }

    /// Compiles `content` as if it was the file `<sources>/<name>.sol`
    ///
    /// The file doesn't need to exist, it may import project files and installed packages. The
    /// cache is not used.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use solbuild_solc::Project;
    ///
    /// let project = Project::builder().build().unwrap();
    /// let compiled = project
    ///     .compile_source("Greeter", "pragma solidity ^0.8.0;\ncontract Greeter {}")
    ///     .unwrap();
    /// ```
    pub fn compile_source(
        &self,
        name: impl AsRef<str>,
        content: impl Into<String>,
    ) -> Result<CompiledUnit> {
        let name = name.as_ref();
        let name = name.strip_suffix(".sol").unwrap_or(name);
        let file = self.paths.sources.join(format!("{name}.sol"));
        ProjectCompiler::new(self).compile_source(file, Source::new(content))
    }

    /// Flattens the target and everything it imports into a single source
    ///
    /// The target is resolved like the targets of [`Project::compile_targets`].
    pub fn flatten(&self, target: impl AsRef<str>) -> Result<String> {
        let target = target.as_ref();
        let mut files = self.resolve_targets([target])?;
        if files.len() != 1 {
            return Err(SolcError::msg(format!(
                "\"{target}\" matches {} files, expected a single file",
                files.len()
            )))
        }
        self.paths.flatten(&files.remove(0))
    }

        /// Turns target specifiers into existing files
    ///
    /// Returns [`SolcError::TargetNotFound`] for a specifier that matches no file.
    pub fn resolve_targets<I, S>(&self, targets: I) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut files = Vec::new();
        for target in targets {
            let target = target.as_ref();
            if is_glob(target) {
                let pattern = if Path::new(target).is_absolute() {
                    target.to_string()
                } else {
                    self.paths.root.join(target).to_string_lossy().into_owned()
                };
                let matched: Vec<_> = glob::glob(&pattern)?
                    .filter_map(std::result::Result::ok)
                    .filter(|path| path.is_file())
                    .map(utils::canonicalized)
                    .collect();
                if matched.is_empty() {
                    return Err(SolcError::TargetNotFound(target.to_string()))
                }
                files.extend(matched);
            } else {
                let path = Path::new(target);
                let file = if path.is_absolute() {
                    Some(path.to_path_buf()).filter(|p| p.is_file())
                } else {
                    [self.paths.root.join(path), self.paths.sources.join(path)]
                        .into_iter()
                        .find(|p| p.is_file())
                };
                let file = file.ok_or_else(|| SolcError::TargetNotFound(target.to_string()))?;
                files.push(utils::canonicalized(file));
            }
        }
        files.sort_unstable();
        files.dedup();
        Ok(files)
    }

    /// Removes the cache file and all artifacts
    pub fn cleanup(&self, artifacts: impl AsRef<Path>) -> std::result::Result<(), SolcIoError> {
        let cache = self.cache_path();
        if cache.exists() {
            std::fs::remove_file(cache).map_err(|err| SolcIoError::new(err, cache))?;
        }
        let artifacts = artifacts.as_ref();
        if artifacts.exists() {
            std::fs::remove_dir_all(artifacts).map_err(|err| SolcIoError::new(err, artifacts))?;
        }
        tracing::trace!("removed cache and artifacts");
        Ok(())
    }
}

fn is_glob(target: &str) -> bool {
    target.contains(['*', '?', '['])
}

#[derive(Debug)]
pub struct ProjectBuilder {
    /// The layout of the project
    paths: Option<ProjectPathsConfig>,
    settings: Option<Settings>,
    pin: Option<Version>,
    /// Number of parallel jobs, defaults to the number of cpus
    jobs: Option<usize>,
    /// Whether caching is enabled, default is true.
    cached: bool,
    /// Where `SolcCompiler` finds installed versions
    svm_home: Option<PathBuf>,
}

impl ProjectBuilder {
    #[must_use]
    pub fn paths(mut self, paths: ProjectPathsConfig) -> Self {
        self.paths = Some(paths);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Compile every unit with this version
    #[must_use]
    pub fn pin(mut self, version: Version) -> Self {
        self.pin = Some(version);
        self
    }

    /// Sets the maximum number of units compiled in parallel, `0` is treated as `1`
    #[must_use]
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Compile units one after another
    #[must_use]
    pub fn single_job(self) -> Self {
        self.jobs(1)
    }

    /// Disables cached builds
    #[must_use]
    pub fn ephemeral(self) -> Self {
        self.set_cached(false)
    }

    /// Sets the cache status
    #[must_use]
    pub fn set_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    #[must_use]
    pub fn svm_home(mut self, svm_home: impl Into<PathBuf>) -> Self {
        self.svm_home = Some(svm_home.into());
        self
    }

    /// Builds the project with a [`SolcCompiler`] that writes to `<root>/artifacts`
    pub fn build(self) -> Result<Project> {
        let paths = match self.paths {
            Some(ref paths) => paths.clone(),
            None => ProjectPathsConfig::builder().build()?,
        };
        let mut compiler = SolcCompiler::new(&paths.root, &paths.artifacts);
        if let Some(ref svm_home) = self.svm_home {
            compiler = compiler.svm_home(svm_home);
        }
        self.paths(paths).build_with_compiler(compiler)
    }

    /// Builds the project with the given compiler backend
    pub fn build_with_compiler<C: Compiler>(self, compiler: C) -> Result<Project<C>> {
        let Self { paths, settings, pin, jobs, cached, svm_home: _ } = self;
        let paths = match paths {
            Some(paths) => paths,
            None => ProjectPathsConfig::builder().build()?,
        };
        Ok(Project {
            paths,
            settings: settings.unwrap_or_default(),
            pin,
            jobs: jobs.unwrap_or_else(num_cpus::get).max(1),
            cached,
            compiler,
        })
    }
}

impl Default for ProjectBuilder {
    fn default() -> Self {
        Self { paths: None, settings: None, pin: None, jobs: None, cached: true, svm_home: None }
    }
}
