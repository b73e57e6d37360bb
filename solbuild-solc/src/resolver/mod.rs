//! Resolution of the entire dependency graph for a project.
//!
//! This module implements the core logic in taking all contracts of a project and creating a
//! resolved graph with applied remappings for all source contracts.
//!
//! Some constraints we're working with when resolving contracts
//!
//!   1. Each file can contain several source units and can have any number of imports/dependencies
//! (using the term interchangeably). Each dependency can declare a version range that it is
//! compatible with, solidity version pragma.
//!   2. A dependency can be imported from any directory, see `Remappings`, or from an installed
//! package that no remapping names, see [`packages::PackageIndex`].
//!
//! Finding all dependencies is fairly simple, the files are processed from a worklist that starts
//! with the source contracts, every newly discovered import is appended to it. Imports that can not
//! be resolved don't abort the resolution, they are recorded as [`ImportFailure`]s of the importing
//! file, so that only the compilation units which depend on that file fail.
//!
//! ## Performance
//!
//! The data that needs to be processed is proportional to the size of the dependency graph, which
//! can, depending on the project, often be quite large. Imports and pragmas are extracted with
//! regexes, which is cheap enough that the graph is rebuilt on every run.

use crate::{
    config::ProjectPathsConfig,
    error::{ImportFailureReason, Result, SolcError},
    remappings::Remapping,
    source::{Source, Sources},
    version::VersionConstraint,
};
use packages::PackageIndex;
use parse::{SolData, SolDataUnit, SolImport};
use rayon::prelude::*;
use semver::Version;
use std::{
    collections::{BTreeSet, HashMap, HashSet, VecDeque},
    fmt,
    path::{Path, PathBuf},
};

mod flatten;
pub mod packages;
pub mod parse;

/// How an import was mapped to a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionMethod {
    /// `./` or `../` import relative to the importing file
    Relative,
    /// through a configured remapping
    Remapped(Remapping),
    /// relative to the project root
    ProjectRelative,
    /// relative to an include path, the remapping maps the import to the file
    IncludePath(Remapping),
    /// found in an installed package
    Package { name: String, version: Option<Version>, remapping: Remapping },
}

impl ResolutionMethod {
    /// The remapping the compiler needs to resolve the import the same way, if any
    pub fn remapping(&self) -> Option<&Remapping> {
        match self {
            ResolutionMethod::Remapped(r) |
            ResolutionMethod::IncludePath(r) |
            ResolutionMethod::Package { remapping: r, .. } => Some(r),
            ResolutionMethod::Relative | ResolutionMethod::ProjectRelative => None,
        }
    }
}

/// A resolved import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEdge {
    pub from: usize,
    pub to: usize,
    pub import: SolImport,
    pub method: ResolutionMethod,
}

/// An import that could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportFailure {
    /// the importing file
    pub file: PathBuf,
    /// the import path as written in the importing file
    pub import: PathBuf,
    pub reason: ImportFailureReason,
}

impl ImportFailure {
    pub fn to_error(&self) -> SolcError {
        SolcError::ImportResolution {
            file: self.file.clone(),
            import: self.import.clone(),
            reason: self.reason.clone(),
        }
    }
}

/// The underlying edges of the graph which only contains the raw relationship data.
///
/// This is kept separate from the `Graph` so it can be handed around without the sources.
#[derive(Debug, Default)]
pub struct GraphEdges {
    /// The indices of `edges` correspond to the `nodes`. That is, `edges[0]`
    /// is the set of outgoing edges for `nodes[0]`.
    edges: Vec<Vec<usize>>,
    /// the resolved imports of each node, in source order
    import_edges: Vec<Vec<ImportEdge>>,
    /// imports of each node that could not be resolved
    failures: Vec<Vec<ImportFailure>>,
    /// index maps for a solidity file to an index, for fast lookup.
    indices: HashMap<PathBuf, usize>,
    /// reverse of `indices` for reverse lookup
    rev_indices: HashMap<usize, PathBuf>,
    /// the identified version requirement of a file
    versions: HashMap<usize, Option<VersionConstraint>>,
    /// with how many input files we started with, corresponds to `let input_files =
    /// nodes[..num_input_files]`.
    ///
    /// Combined with the `indices` this way we can determine if a file was original added to the
    /// graph as input or was added as resolved import, see [`Self::is_input_file()`]
    num_input_files: usize,
}

impl GraphEdges {
    /// How many input files we started with
    pub fn num_input_files(&self) -> usize {
        self.num_input_files
    }

    /// Returns an iterator over all file indices
    pub fn files(&self) -> impl Iterator<Item = usize> + '_ {
        0..self.edges.len()
    }

    /// Returns an iterator over all input file indices
    pub fn input_files(&self) -> impl Iterator<Item = usize> + '_ {
        0..self.num_input_files
    }

    /// Returns a list of nodes the given node index points to for the given kind.
    pub fn imported_nodes(&self, from: usize) -> &[usize] {
        &self.edges[from]
    }

    /// Returns an iterator that yields all imports of a node and all their imports
    pub fn all_imported_nodes(&self, from: usize) -> impl Iterator<Item = usize> + '_ {
        NodesIter::new(from, self).skip(1)
    }

    /// Returns the transitive closure of the node: the node itself and everything it imports,
    /// directly or indirectly
    pub fn closure(&self, id: usize) -> BTreeSet<usize> {
        NodesIter::new(id, self).collect()
    }

    /// The resolved imports of the node
    pub fn edges_of(&self, id: usize) -> &[ImportEdge] {
        &self.import_edges[id]
    }

    /// The imports of the node that could not be resolved
    pub fn failures_of(&self, id: usize) -> &[ImportFailure] {
        &self.failures[id]
    }

    /// Returns all import failures of any file in the node's closure
    pub fn closure_failures(&self, id: usize) -> Vec<&ImportFailure> {
        self.closure(id).into_iter().flat_map(|n| self.failures_of(n)).collect()
    }

    /// Returns all files imported by the given file
    pub fn imports(&self, file: impl AsRef<Path>) -> HashSet<&PathBuf> {
        if let Some(start) = self.node_id(file) {
            self.all_imported_nodes(start).map(|id| self.node_path(id)).collect()
        } else {
            HashSet::new()
        }
    }

    /// Returns the id of the given file
    pub fn node_id(&self, file: impl AsRef<Path>) -> Option<usize> {
        self.indices.get(file.as_ref()).copied()
    }

    /// Returns the path of the given node
    pub fn node_path(&self, id: usize) -> &PathBuf {
        &self.rev_indices[&id]
    }

    /// Returns true if the `file` was originally included when the graph was first created and not
    /// added when all `imports` were resolved
    pub fn is_input_file(&self, file: impl AsRef<Path>) -> bool {
        if let Some(idx) = self.indices.get(file.as_ref()).copied() {
            idx < self.num_input_files
        } else {
            false
        }
    }

    /// Returns the `VersionConstraint` for the given node
    pub fn version_constraint(&self, id: usize) -> Option<&VersionConstraint> {
        self.versions.get(&id).and_then(Option::as_ref)
    }
}

/// Represents a fully-resolved solidity dependency graph. Each node in the graph
/// is a file and edges represent dependencies between them.
/// See also <https://docs.soliditylang.org/en/latest/layout-of-source-files.html?highlight=import#importing-other-source-files>
#[derive(Debug)]
pub struct Graph {
    /// all nodes in the project, a `Node` represents a single file
    nodes: Vec<Node>,
    /// relationship of the nodes
    edges: GraphEdges,
    /// the root of the project this graph represents
    root: PathBuf,
}

impl Graph {
    /// Returns a list of nodes the given node index points to for the given kind.
    pub fn imported_nodes(&self, from: usize) -> &[usize] {
        self.edges.imported_nodes(from)
    }

    /// Returns an iterator that yields all imports of a node and all their imports
    pub fn all_imported_nodes(&self, from: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges.all_imported_nodes(from)
    }

    /// Returns the node's transitive closure including the node itself
    pub fn closure(&self, id: usize) -> BTreeSet<usize> {
        self.edges.closure(id)
    }

    /// Returns all the resolved files and their index in the graph
    pub fn files(&self) -> &HashMap<PathBuf, usize> {
        &self.edges.indices
    }

    /// Gets a node by index.
    ///
    /// # Panics
    ///
    /// if the `index` node id is not included in the graph
    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &GraphEdges {
        &self.edges
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn display_node(&self, index: usize) -> DisplayNode {
        DisplayNode { node: self.node(index), root: &self.root }
    }

    /// Returns an iterator that yields the node id and all its imports, transitively
    ///
    /// # Panics
    ///
    /// if the `start` node id is not included in the graph
    pub fn node_ids(&self, start: usize) -> impl Iterator<Item = usize> + '_ {
        NodesIter::new(start, &self.edges)
    }

    /// Same as `Self::node_ids` but returns the actual `Node`
    pub fn nodes_of(&self, start: usize) -> impl Iterator<Item = &Node> + '_ {
        self.node_ids(start).map(move |idx| self.node(idx))
    }

    /// Returns all files together with their sources and the edges
    pub fn into_sources(self) -> (Sources, GraphEdges) {
        let Graph { nodes, edges, .. } = self;
        (nodes.into_iter().map(|node| (node.path, node.source)).collect(), edges)
    }

    /// Returns an iterator over all input nodes
    pub fn input_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().take(self.edges.num_input_files)
    }

    /// Returns all files imported by the given file
    pub fn imports(&self, path: impl AsRef<Path>) -> HashSet<&PathBuf> {
        self.edges.imports(path)
    }

    /// Resolves a number of sources within the given config
    ///
    /// Input files get the ids `0..sources.len()` in path order, imported files are appended in the
    /// order they are discovered.
    #[tracing::instrument(name = "resolve_sources", skip_all, fields(inputs = sources.len()))]
    pub fn resolve_sources(
        paths: &ProjectPathsConfig,
        packages: &PackageIndex,
        sources: Sources,
    ) -> Result<Graph> {
        // we start off by reading all input files
        let mut unresolved: VecDeque<Node> = sources
            .into_par_iter()
            .map(|(path, source)| Node::new(path, source))
            .collect::<Vec<_>>()
            .into();

        // identifiers of all resolved files
        let mut index: HashMap<PathBuf, usize> =
            unresolved.iter().enumerate().map(|(idx, node)| (node.path.clone(), idx)).collect();

        let num_input_files = unresolved.len();

        // contains the files and their dependencies
        let mut nodes = Vec::with_capacity(unresolved.len());
        let mut edges = Vec::with_capacity(unresolved.len());
        let mut import_edges = Vec::with_capacity(unresolved.len());
        let mut failures = Vec::with_capacity(unresolved.len());

        // now we need to resolve all imports for the source file and those imported from other
        // locations
        while let Some(node) = unresolved.pop_front() {
            let from = nodes.len();
            let mut resolved_imports = Vec::with_capacity(node.data.imports.len());
            let mut node_edges = Vec::with_capacity(node.data.imports.len());
            let mut node_failures = Vec::new();

            for import in node.data.imports.iter() {
                let import = import.data();
                let fail = |reason| ImportFailure {
                    file: node.path.clone(),
                    import: import.path.clone(),
                    reason,
                };

                let (target, method) = match paths.resolve_import(packages, &node.path, &import.path)
                {
                    Ok(resolved) => resolved,
                    Err(reason) => {
                        tracing::trace!(
                            "failed to resolve import \"{}\" of \"{}\": {}",
                            import.path.display(),
                            node.path.display(),
                            reason
                        );
                        node_failures.push(fail(reason));
                        continue
                    }
                };

                if target == node.path {
                    node_failures.push(fail(ImportFailureReason::SelfImport));
                    continue
                }

                let to = if let Some(idx) = index.get(&target).copied() {
                    idx
                } else {
                    // imported file is not part of the input files
                    match Node::read(&target) {
                        Ok(imported) => {
                            let idx = index.len();
                            index.insert(target, idx);
                            unresolved.push_back(imported);
                            idx
                        }
                        Err(err) => {
                            node_failures.push(fail(ImportFailureReason::Unreadable(err.to_string())));
                            continue
                        }
                    }
                };

                tracing::trace!("resolved import \"{}\" via {:?}", import.path.display(), method);
                if !resolved_imports.contains(&to) {
                    resolved_imports.push(to);
                }
                node_edges.push(ImportEdge { from, to, import: import.clone(), method });
            }

            nodes.push(node);
            edges.push(resolved_imports);
            import_edges.push(node_edges);
            failures.push(node_failures);
        }

        let num_failures: usize = failures.iter().map(Vec::len).sum();
        if num_failures > 0 {
            tracing::debug!("{} imports could not be resolved", num_failures);
        }

        let edges = GraphEdges {
            edges,
            import_edges,
            failures,
            rev_indices: index.iter().map(|(k, v)| (*v, k.clone())).collect(),
            indices: index,
            versions: nodes
                .iter()
                .enumerate()
                .map(|(idx, node)| (idx, node.data.version_req.clone()))
                .collect(),
            num_input_files,
        };
        Ok(Graph { nodes, edges, root: paths.root.clone() })
    }

    /// Resolves the dependencies of a project's source contracts
    pub fn resolve(paths: &ProjectPathsConfig) -> Result<Graph> {
        Self::resolve_sources(paths, &paths.package_index(), paths.read_input_files()?)
    }
}

/// An iterator over a node and its dependencies, depth first
#[derive(Debug)]
pub struct NodesIter<'a> {
    /// stack of nodes
    stack: Vec<usize>,
    visited: HashSet<usize>,
    graph: &'a GraphEdges,
}

impl<'a> NodesIter<'a> {
    fn new(start: usize, graph: &'a GraphEdges) -> Self {
        Self { stack: vec![start], visited: HashSet::new(), graph }
    }
}

impl<'a> Iterator for NodesIter<'a> {
    type Item = usize;
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.stack.pop()?;
            if self.visited.insert(node) {
                // push the node's direct dependencies in reverse so they are visited in order
                self.stack.extend(self.graph.imported_nodes(node).iter().rev().copied());
                return Some(node)
            }
        }
    }
}

/// Represents a node (sol file) in the project graph
#[derive(Debug)]
pub struct Node {
    /// path of the solidity file
    pub path: PathBuf,
    /// content of the solidity file
    pub source: Source,
    /// md5 of the content
    pub fingerprint: String,
    /// parsed data
    pub data: SolData,
}

impl Node {
    pub fn new(path: PathBuf, source: Source) -> Self {
        let data = SolData::parse(source.as_ref(), &path);
        let fingerprint = source.content_hash();
        Self { path, source, fingerprint, data }
    }

    /// Reads the content of the file and returns a [Node] containing relevant information
    pub fn read(file: impl AsRef<Path>) -> Result<Self> {
        let file = file.as_ref();
        let source = Source::read(file)?;
        Ok(Self::new(file.to_path_buf(), source))
    }

    pub fn content(&self) -> &str {
        &self.source.content
    }

    pub fn imports(&self) -> &Vec<SolDataUnit<SolImport>> {
        &self.data.imports
    }

    pub fn version(&self) -> &Option<SolDataUnit<String>> {
        &self.data.version
    }

    pub fn license(&self) -> &Option<SolDataUnit<String>> {
        &self.data.license
    }

    /// The parsed version pragma, fails if the file has a pragma that can't be parsed
    pub fn version_constraint(&self) -> Result<Option<&VersionConstraint>> {
        self.data.version_constraint(&self.path)
    }
}

/// Helper type for formatting a node
pub(crate) struct DisplayNode<'a> {
    node: &'a Node,
    root: &'a PathBuf,
}

impl<'a> fmt::Display for DisplayNode<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = crate::utils::source_name(&self.node.path, self.root);
        write!(f, "{}", path.display())?;
        if let Some(ref v) = self.node.data.version {
            write!(f, " {}", v.data())?;
        }
        Ok(())
    }
}
