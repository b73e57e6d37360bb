//! Discovery of installed packages for imports that no remapping covers

use crate::{remappings::Remapping, utils};
use semver::Version;
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// An installed package
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Package {
    /// The package name as found on disk, like `@openzeppelin/contracts` or `OpenZeppelin`
    pub name: String,
    /// `None` if the install directory does not carry a version
    pub version: Option<Version>,
    /// Directory containing the package's files
    pub dir: PathBuf,
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(ref version) => write!(f, "{}@{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

/// A package import that was matched by the [`PackageIndex`]
#[derive(Debug, Clone)]
pub struct PackageImport<'a> {
    pub package: &'a Package,
    /// The resolved file
    pub file: PathBuf,
    /// `<alias>/=<package dir>/`, what the compiler needs to resolve the import the same way
    pub remapping: Remapping,
}

/// Index of all packages installed under a set of package roots
///
/// Recognized layouts are `<root>/<name>/<version>/`, `<root>/<name>@<version>/` and
/// `<root>/<name>-v<version>/`, scoped names (`@scope/name`) may occur in place of `<name>`. A
/// directory without a version is an unversioned install of `<name>`.
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    /// normalized name -> installs, ascending
    packages: BTreeMap<String, Vec<Package>>,
}

impl PackageIndex {
    /// Scans all package roots, roots that don't exist are skipped
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut index = Self::default();
        for root in roots {
            let root = root.as_ref();
            for dir in subdirs(root) {
                let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string)
                else {
                    continue
                };
                if name.starts_with('@') {
                    for scoped in subdirs(&dir) {
                        if let Some(inner) = scoped.file_name().and_then(|n| n.to_str()) {
                            let name = format!("{name}/{inner}");
                            index.insert_dir(&name, scoped.clone());
                        }
                    }
                } else {
                    index.insert_dir(&name, dir);
                }
            }
        }
        for installs in index.packages.values_mut() {
            installs.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.dir.cmp(&b.dir)));
            installs.dedup();
        }
        tracing::trace!("indexed {} packages", index.packages.len());
        index
    }

    fn insert_dir(&mut self, name: &str, dir: PathBuf) {
        // suffix style: `name@1.2.3` or `name-v1.2.3`
        if let Some((base, version)) = split_versioned_name(name) {
            self.insert(Package { name: base.to_string(), version: Some(version), dir });
            return
        }

        // cache-dir style: `name/1.2.3/`
        let versioned: Vec<_> = subdirs(&dir)
            .into_iter()
            .filter_map(|sub| {
                let version = sub.file_name()?.to_str().and_then(parse_version)?;
                Some((version, sub))
            })
            .collect();

        if versioned.is_empty() {
            self.insert(Package { name: name.to_string(), version: None, dir });
        } else {
            for (version, dir) in versioned {
                self.insert(Package { name: name.to_string(), version: Some(version), dir });
            }
        }
    }

    fn insert(&mut self, package: Package) {
        self.packages.entry(normalize_name(&package.name)).or_default().push(package);
    }

    /// Returns the highest installed version of the package
    ///
    /// Names match case-insensitively and a leading `@` is ignored. Any versioned install wins
    /// over an unversioned one.
    pub fn resolve(&self, alias: &str) -> Option<&Package> {
        self.packages.get(&normalize_name(alias))?.last()
    }

    /// Resolves an import path whose first segment (or `@scope/name` segments) name a package
    pub fn resolve_import(&self, import: &str) -> Option<PackageImport<'_>> {
        let mut segments = import.splitn(3, '/');
        let first = segments.next()?;
        let mut aliases = Vec::with_capacity(2);
        if first.starts_with('@') {
            if let Some(second) = segments.next() {
                aliases.push(format!("{first}/{second}"));
            }
        }
        aliases.push(first.to_string());

        for alias in aliases {
            let Some(rest) = import.strip_prefix(alias.as_str()).and_then(|r| r.strip_prefix('/'))
            else {
                continue
            };
            let Some(package) = self.resolve(&alias) else { continue };
            let file = utils::normalize_path(package.dir.join(rest));
            if file.is_file() {
                tracing::trace!("resolved \"{}\" in package {}", import, package);
                let remapping = Remapping {
                    context: None,
                    name: format!("{alias}/"),
                    path: format!("{}/", utils::slash_path(&package.dir)),
                };
                return Some(PackageImport { package, file, remapping })
            }
        }
        None
    }

    /// All indexed installs
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

fn normalize_name(name: &str) -> String {
    name.trim_start_matches('@').to_lowercase()
}

fn parse_version(s: &str) -> Option<Version> {
    Version::parse(s.strip_prefix('v').unwrap_or(s)).ok()
}

fn split_versioned_name(name: &str) -> Option<(&str, Version)> {
    if let Some((base, version)) = name.rsplit_once('@') {
        if !base.is_empty() {
            if let Some(version) = parse_version(version) {
                return Some((base, version))
            }
        }
    }
    let (base, version) = name.rsplit_once("-v")?;
    Some((base, Version::parse(version).ok()?))
}

fn subdirs(dir: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<_> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir())
        .filter(|e| !e.file_name().to_str().map(|s| s.starts_with('.')).unwrap_or_default())
        .map(|e| e.into_path())
        .collect();
    dirs.sort_unstable();
    dirs
}
