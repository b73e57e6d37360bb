//! Partitioning of a project into compilation units
//!
//! Every target is compiled together with its transitive imports. Targets that resolve to the
//! same compiler version and share files are merged into a single unit, targets with disjoint
//! closures end up in separate units so that a change to a file only recompiles the units that
//! contain it.

use crate::{
    cache::CacheStore,
    config::Settings,
    error::{Result, SolcError},
    remappings::Remapping,
    resolver::Graph,
    source::Sources,
    utils,
    version::{InstallRequest, SolcVersion, VersionResolver},
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
};

/// A set of files that is compiled with a single compiler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationUnit {
    /// Deterministic identifier derived from version, settings and files
    pub id: String,
    pub version: SolcVersion,
    /// the files the unit was planned for, sorted
    pub targets: Vec<PathBuf>,
    /// all files of the targets' closures
    pub sources: Sources,
    /// remappings needed to resolve the imports of the unit, relative to the root
    pub remappings: Vec<Remapping>,
    /// settings normalized for the version, including `remappings`
    pub settings: Settings,
    pub settings_fingerprint: String,
}

impl CompilationUnit {
    /// All files of the unit
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.sources.keys()
    }

    pub fn contains(&self, file: impl AsRef<Path>) -> bool {
        self.sources.contains_key(file.as_ref())
    }
}

/// Targets that can not be compiled, together with the reason
#[derive(Debug)]
pub struct UnitFailure {
    pub targets: Vec<PathBuf>,
    pub error: SolcError,
}

/// The outcome of planning a compilation pass
#[derive(Debug, Default)]
pub struct Plan {
    /// units that need to be compiled
    pub dirty: Vec<CompilationUnit>,
    /// units whose files are all cached for the unit's version and settings
    pub cached: Vec<CompilationUnit>,
    pub failures: Vec<UnitFailure>,
    /// versions that dirty units need but that aren't installed
    pub install: BTreeSet<InstallRequest>,
}

impl Plan {
    /// Whether nothing needs to be compiled
    pub fn is_clean(&self) -> bool {
        self.dirty.is_empty()
    }
}

/// Computes the [`Plan`] for a resolved graph
#[derive(Debug)]
pub struct Planner<'a> {
    graph: &'a Graph,
    resolver: &'a VersionResolver,
    settings: &'a Settings,
    root: &'a Path,
}

impl<'a> Planner<'a> {
    pub fn new(
        graph: &'a Graph,
        resolver: &'a VersionResolver,
        settings: &'a Settings,
        root: &'a Path,
    ) -> Self {
        Self { graph, resolver, settings, root }
    }

    /// Returns the ids of the targets, all input files if no targets are given
    fn target_ids(&self, targets: &[PathBuf]) -> Result<Vec<usize>> {
        let edges = self.graph.edges();
        if targets.is_empty() {
            return Ok(edges.input_files().collect())
        }
        let mut ids = targets
            .iter()
            .map(|target| {
                edges
                    .node_id(target)
                    .ok_or_else(|| SolcError::TargetNotFound(target.display().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Returns the compatible versions of the target's closure
    fn target_candidates(&self, target: usize, closure: &BTreeSet<usize>) -> Result<Vec<SolcVersion>> {
        let edges = self.graph.edges();
        if let Some(failure) = edges.closure_failures(target).into_iter().next() {
            return Err(failure.to_error())
        }
        let mut constraints = Vec::with_capacity(closure.len());
        for id in closure {
            let node = self.graph.node(*id);
            constraints.push((node.path.as_path(), node.version_constraint()?));
        }
        self.resolver.resolve_closure(constraints)
    }

    /// Plans the compilation of the targets
    ///
    /// With `force` every unit is dirty and the cache is not consulted.
    pub fn plan(&self, targets: &[PathBuf], cache: &CacheStore, force: bool) -> Result<Plan> {
        let target_ids = self.target_ids(targets)?;
        let mut plan = Plan::default();

        let mut closures = HashMap::with_capacity(target_ids.len());
        let mut viable = Vec::with_capacity(target_ids.len());
        for target in target_ids {
            let closure = self.graph.closure(target);
            match self.target_candidates(target, &closure) {
                Ok(candidates) => {
                    closures.insert(target, closure);
                    viable.push((target, candidates));
                }
                Err(error) => {
                    tracing::debug!("can't compile {}: {}", self.graph.display_node(target), error);
                    plan.failures.push(UnitFailure {
                        targets: vec![self.graph.node(target).path.clone()],
                        error,
                    });
                }
            }
        }

        if !force {
            self.invalidate_changed(cache);
        }

        for (version, targets) in VersionResolver::resolve_many(viable) {
            for group in merge_overlapping(&targets, &closures) {
                let unit = self.unit(&version, group, &closures)?;
                let mut cached = !force;
                for file in unit.files() {
                    if !cached {
                        break
                    }
                    let node = self.graph.node(self.node_id(file)?);
                    cached = cache
                        .get(file, &node.fingerprint, version.as_ref(), &unit.settings_fingerprint)
                        .is_some();
                }

                if cached {
                    tracing::trace!("unit {} is cached", unit.id);
                    plan.cached.push(unit);
                } else {
                    tracing::debug!(
                        "unit {} with {} files needs to be compiled with solc {}",
                        unit.id,
                        unit.sources.len(),
                        unit.version
                    );
                    if let Some(request) = InstallRequest::for_version(&unit.version) {
                        plan.install.insert(request);
                    }
                    plan.dirty.push(unit);
                }
            }
        }

        Ok(plan)
    }

    /// Drops cache entries of files whose content changed and of everything importing them
    fn invalidate_changed(&self, cache: &CacheStore) {
        for node in self.graph.nodes() {
            if cache.fingerprint_changed(&node.path, &node.fingerprint) {
                cache.invalidate_dependents(&node.path);
            }
        }
    }

    fn node_id(&self, file: &Path) -> Result<usize> {
        self.graph
            .edges()
            .node_id(file)
            .ok_or_else(|| SolcError::TargetNotFound(file.display().to_string()))
    }

    fn unit(
        &self,
        version: &SolcVersion,
        targets: Vec<usize>,
        closures: &HashMap<usize, BTreeSet<usize>>,
    ) -> Result<CompilationUnit> {
        let edges = self.graph.edges();
        let files: BTreeSet<usize> =
            targets.iter().filter_map(|t| closures.get(t)).flatten().copied().collect();

        let remappings: BTreeSet<Remapping> = files
            .iter()
            .flat_map(|id| edges.edges_of(*id))
            .filter_map(|edge| edge.method.remapping())
            .map(|remapping| remapping.to_source_name(self.root))
            .collect();
        let remappings: Vec<_> = remappings.into_iter().collect();

        let settings =
            self.settings.normalized(version.as_ref()).with_remappings(remappings.iter().cloned());
        let settings_fingerprint = settings.fingerprint()?;

        let sources: Sources = files
            .iter()
            .map(|id| {
                let node = self.graph.node(*id);
                (node.path.clone(), node.source.clone())
            })
            .collect();

        let mut targets: Vec<_> =
            targets.into_iter().map(|id| self.graph.node(id).path.clone()).collect();
        targets.sort_unstable();

        let id = {
            let mut key = format!("{version}\n{settings_fingerprint}\n");
            for file in sources.keys() {
                key.push_str(&utils::slash_path(utils::source_name(file, self.root)));
                key.push('\n');
            }
            utils::content_hash(key)[..16].to_string()
        };

        Ok(CompilationUnit {
            id,
            version: version.clone(),
            targets,
            sources,
            remappings,
            settings,
            settings_fingerprint,
        })
    }
}

/// Groups targets whose closures share at least one file, transitively
fn merge_overlapping(
    targets: &[usize],
    closures: &HashMap<usize, BTreeSet<usize>>,
) -> Vec<Vec<usize>> {
    fn find(parent: &mut [usize], mut idx: usize) -> usize {
        while parent[idx] != idx {
            parent[idx] = parent[parent[idx]];
            idx = parent[idx];
        }
        idx
    }

    let mut parent: Vec<usize> = (0..targets.len()).collect();
    // file -> index of the first target whose closure contains it
    let mut owner: HashMap<usize, usize> = HashMap::new();
    for (idx, target) in targets.iter().enumerate() {
        for file in closures.get(target).into_iter().flatten() {
            match owner.get(file).copied() {
                Some(other) => {
                    let (a, b) = (find(&mut parent, idx), find(&mut parent, other));
                    if a != b {
                        parent[a] = b;
                    }
                }
                None => {
                    owner.insert(*file, idx);
                }
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for idx in 0..targets.len() {
        let root = find(&mut parent, idx);
        groups.entry(root).or_default().push(targets[idx]);
    }
    let mut groups: Vec<_> = groups.into_values().collect();
    groups.sort_unstable();
    groups
}
