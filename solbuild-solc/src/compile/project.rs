//! Manages compiling of a `Project`
//!
//! The compilation of a project is performed in several steps.
//!
//! First the project's dependency graph [`crate::Graph`] is constructed and all imports are
//! resolved, including imports of installed packages that no remapping covers. Every import either
//! becomes an edge or a failure recorded against the importing file.
//!
//! From the graph the [`crate::Planner`] derives the compilation units: each target together with
//! its transitive imports, compiled with the newest version all of those files accept. Targets that
//! share files and resolve to the same version are merged.
//!
//! A unit doesn't need to be compiled if caching is enabled and the cache holds an artifact for
//! every file of the unit with the same content, compiler version and settings. Changed files
//! invalidate the cache entries of every file that imports them.
//!
//! Missing compiler versions are installed first, one after another. The remaining dirty units are
//! then handed to the [`crate::Compiler`] in parallel, a failing unit does not affect the others.
//! The cache is persisted after every finished unit.

use crate::{
    cache::{ArtifactRef, CacheStore},
    compile::Compiler,
    error::{CompilerError, Result, SolcError},
    planner::{CompilationUnit, Planner, UnitFailure},
    resolver::Graph,
    source::{Source, Sources},
    utils,
    version::{InstallRequest, VersionResolver},
    Project,
};
use rayon::prelude::*;
use semver::Version;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::{Path, PathBuf},
};

/// A unit together with the artifact of each of its files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    pub unit: CompilationUnit,
    pub artifacts: BTreeMap<PathBuf, ArtifactRef>,
}

/// The result of a compilation pass
#[derive(Debug, Default)]
pub struct ProjectCompileOutput {
    /// units that were compiled in this pass
    pub compiled: Vec<CompiledUnit>,
    /// units whose artifacts were taken from the cache
    pub cached: Vec<CompiledUnit>,
    pub failures: Vec<UnitFailure>,
    /// versions that were needed but could not be installed
    pub unsatisfied_installs: Vec<InstallRequest>,
}

impl ProjectCompileOutput {
    /// Whether any target could not be compiled
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Whether no unit had to be compiled
    pub fn is_unchanged(&self) -> bool {
        self.compiled.is_empty()
    }

    /// Returns the artifact of the file, from the compiled or the cached units
    pub fn find(&self, file: impl AsRef<Path>) -> Option<&ArtifactRef> {
        let file = file.as_ref();
        self.compiled.iter().chain(self.cached.iter()).find_map(|unit| unit.artifacts.get(file))
    }

    /// All artifacts of the pass
    pub fn artifacts(&self) -> impl Iterator<Item = (&PathBuf, &ArtifactRef)> {
        self.compiled.iter().chain(self.cached.iter()).flat_map(|unit| unit.artifacts.iter())
    }
}

/// Runs a single compilation pass of a [`Project`]
#[derive(Debug)]
pub struct ProjectCompiler<'a, C: Compiler> {
    project: &'a Project<C>,
    /// absolute paths of the targets, all input files if empty
    targets: Vec<PathBuf>,
    force: bool,
}

impl<'a, C: Compiler> ProjectCompiler<'a, C> {
    pub fn new(project: &'a Project<C>) -> Self {
        Self { project, targets: Vec::new(), force: false }
    }

    #[must_use]
    pub fn with_targets(mut self, targets: Vec<PathBuf>) -> Self {
        self.targets = targets;
        self
    }

    /// Ignore the cache and compile every unit
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    fn open_cache(&self) -> CacheStore {
        let paths = &self.project.paths;
        if self.project.cached {
            CacheStore::open(&paths.cache, &paths.root)
        } else {
            CacheStore::empty(&paths.cache, &paths.root)
        }
    }

    fn version_resolver(&self) -> VersionResolver {
        let compiler = &self.project.compiler;
        let resolver =
            VersionResolver::new(compiler.installed_versions(), compiler.available_versions());
        match self.project.pin {
            Some(ref pin) => resolver.pinned(pin.clone()),
            None => resolver,
        }
    }

    /// Compiles a source that only exists in memory together with the files it imports
    ///
    /// The compiler version is selected from the source's pragmas like for any other file, missing
    /// versions are installed. The cache is neither read nor written.
    #[tracing::instrument(
        name = "ProjectCompiler::compile_source",
        skip_all,
        fields(file = %file.display())
    )]
    pub fn compile_source(self, file: PathBuf, source: Source) -> Result<CompiledUnit> {
        let project = self.project;
        let compiler = &project.compiler;

        let sources = Sources::from([(file.clone(), source)]);
        let graph = Graph::resolve_sources(&project.paths, &project.paths.package_index(), sources)?;
        let resolver = self.version_resolver();
        let cache = CacheStore::empty(&project.paths.cache, &project.paths.root);
        let mut plan = Planner::new(&graph, &resolver, &project.settings, &project.paths.root)
            .plan(&[file.clone()], &cache, true)?;
        if let Some(failure) = plan.failures.pop() {
            return Err(failure.error)
        }

        for request in plan.install {
            compiler
                .install(&request.version)
                .map_err(|error| SolcError::Compiler { targets: vec![file.clone()], error })?;
        }
        let unit = plan
            .dirty
            .pop()
            .ok_or_else(|| SolcError::TargetNotFound(file.display().to_string()))?;
        let raw = compiler
            .compile(&unit)
            .map_err(|error| SolcError::Compiler { targets: unit.targets.clone(), error })?;
        let artifacts =
            unit.files().map(|file| (file.clone(), raw.artifact_of(file).clone())).collect();
        tracing::trace!("compiled source with solc {}", unit.version);
        Ok(CompiledUnit { unit, artifacts })
    }

    /// Compiles all dirty units of the project
    #[tracing::instrument(name = "ProjectCompiler::compile", skip_all)]
    pub fn compile(self) -> Result<ProjectCompileOutput> {
        let project = self.project;
        let compiler = &project.compiler;
        let force = self.force || !project.cached;

        // targets outside of the sources dir are compiled as additional input files
        let (sources, unreadable) = read_sources(&project.paths.sources, &self.targets);
        let targets: Vec<PathBuf> =
            self.targets.iter().filter(|target| sources.contains_key(*target)).cloned().collect();
        if !self.targets.is_empty() && targets.is_empty() {
            return Ok(ProjectCompileOutput { failures: unreadable, ..Default::default() })
        }

        let graph = Graph::resolve_sources(&project.paths, &project.paths.package_index(), sources)?;
        let resolver = self.version_resolver();

        let cache = self.open_cache();
        let plan = Planner::new(&graph, &resolver, &project.settings, &project.paths.root)
            .plan(&targets, &cache, force)?;
        tracing::debug!(
            "planned {} dirty and {} cached units, {} targets failed",
            plan.dirty.len(),
            plan.cached.len(),
            plan.failures.len()
        );

        let mut output = ProjectCompileOutput { failures: unreadable, ..Default::default() };
        output.failures.extend(plan.failures);

        let mut failed_installs = HashMap::new();
        for request in plan.install {
            if let Err(err) = compiler.install(&request.version) {
                tracing::error!("failed to install solc {}: {}", request.version, err);
                failed_installs.insert(request.version.clone(), err);
                output.unsatisfied_installs.push(request);
            }
        }

        let mut seen = HashSet::new();
        let mut dirty = Vec::with_capacity(plan.dirty.len());
        for unit in plan.dirty {
            if !seen.insert(unit.id.clone()) {
                continue
            }
            match failed_installs.get(unit.version.as_ref()) {
                Some(err) => output.failures.push(UnitFailure {
                    targets: unit.targets.clone(),
                    error: SolcError::Compiler { targets: unit.targets, error: err.clone() },
                }),
                None => dirty.push(unit),
            }
        }

        for unit in plan.cached {
            let artifacts = cached_artifacts(&unit, &graph, &cache);
            output.cached.push(CompiledUnit { unit, artifacts });
        }

        let jobs = project.jobs.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .map_err(|err| SolcError::msg(format!("failed to create thread pool: {err}")))?;
        tracing::trace!("compiling {} units with {} jobs", dirty.len(), jobs);

        let results: Vec<_> = pool.install(|| {
            dirty
                .into_par_iter()
                .map(|unit| self.compile_unit(unit, &graph, &cache))
                .collect()
        });
        for result in results {
            match result {
                Ok(compiled) => output.compiled.push(compiled),
                Err(failure) => output.failures.push(failure),
            }
        }

        if project.cached {
            cache.retain_existing();
            if let Err(err) = cache.persist() {
                tracing::warn!("failed to write cache {}: {}", project.paths.cache.display(), err);
            }
        }
        Ok(output)
    }

    fn compile_unit(
        &self,
        unit: CompilationUnit,
        graph: &Graph,
        cache: &CacheStore,
    ) -> std::result::Result<CompiledUnit, UnitFailure> {
        let raw = match self.project.compiler.compile(&unit) {
            Ok(raw) => raw,
            Err(err) => return Err(unit_failure(unit, err)),
        };

        let version: &Version = unit.version.as_ref();
        let mut artifacts = BTreeMap::new();
        for file in unit.files() {
            let artifact = raw.artifact_of(file).clone();
            if let Some(id) = graph.edges().node_id(file) {
                let node = graph.node(id);
                let imports = graph.imported_nodes(id).iter().map(|dep| graph.node(*dep).path.clone());
                cache.put(
                    file,
                    &node.fingerprint,
                    version,
                    &unit.settings_fingerprint,
                    artifact.clone(),
                    imports,
                    node.version().as_ref().map(|v| v.data().clone()),
                );
            }
            artifacts.insert(file.clone(), artifact);
        }

        if self.project.cached {
            if let Err(err) = cache.persist() {
                tracing::warn!("failed to write cache after unit {}: {}", unit.id, err);
            }
        }
        tracing::trace!("compiled unit {} with solc {}", unit.id, unit.version);
        Ok(CompiledUnit { unit, artifacts })
    }
}

/// Reads the input files and the targets, a file that can not be read only fails itself
fn read_sources(sources_dir: &Path, targets: &[PathBuf]) -> (Sources, Vec<UnitFailure>) {
    let mut files = utils::source_files(sources_dir);
    files.extend(targets.iter().cloned());
    files.sort_unstable();
    files.dedup();

    let mut sources = Sources::new();
    let mut failures = Vec::new();
    for file in files {
        match Source::read(&file) {
            Ok(source) => {
                sources.insert(file, source);
            }
            Err(err) => {
                tracing::error!("failed to read {}: {}", file.display(), err);
                failures.push(UnitFailure { targets: vec![file], error: err.into() });
            }
        }
    }
    (sources, failures)
}

fn unit_failure(unit: CompilationUnit, error: CompilerError) -> UnitFailure {
    tracing::error!("failed to compile unit {} with solc {}: {}", unit.id, unit.version, error);
    UnitFailure {
        targets: unit.targets.clone(),
        error: SolcError::Compiler { targets: unit.targets, error },
    }
}

fn cached_artifacts(
    unit: &CompilationUnit,
    graph: &Graph,
    cache: &CacheStore,
) -> BTreeMap<PathBuf, ArtifactRef> {
    unit.files()
        .filter_map(|file| {
            let node = graph.node(graph.edges().node_id(file)?);
            let artifact = cache.get(
                file,
                &node.fingerprint,
                unit.version.as_ref(),
                &unit.settings_fingerprint,
            )?;
            Some((file.clone(), artifact))
        })
        .collect()
}
