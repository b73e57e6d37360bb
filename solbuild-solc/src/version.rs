//! Solidity version pragmas and compiler version selection

use crate::error::{Result, SolcError};
use semver::{Version, VersionReq};
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fmt,
    path::Path,
    str::FromStr,
};

/// A solidity version pragma, like `>=0.8.0 <0.9.0 || ^0.7.6`, in terms of semver requirements
///
/// Each `||` separated part of the pragma is one alternative, a version matches the constraint if
/// it matches any alternative.
#[derive(Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    pragma: String,
    alternatives: Vec<VersionReq>,
}

impl VersionConstraint {
    /// Parses the version part of a solidity pragma
    ///
    /// Solidity separates comparators by whitespace where semver expects commas, and a comparator
    /// without an operator is an exact match (`0.8.4` means `=0.8.4`, not `^0.8.4`).
    pub fn parse(pragma: &str) -> std::result::Result<Self, semver::Error> {
        let pragma = pragma.trim();
        let alternatives =
            pragma.split("||").map(parse_alternative).collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { pragma: pragma.to_string(), alternatives })
    }

    /// A constraint that every version satisfies
    pub fn any() -> Self {
        Self { pragma: "*".to_string(), alternatives: vec![VersionReq::STAR] }
    }

    /// Returns `true` if the version satisfies any of the alternatives
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// Returns `true` if at least one of the candidates satisfies the constraint
    pub fn intersects<'a>(&self, candidates: impl IntoIterator<Item = &'a SolcVersion>) -> bool {
        candidates.into_iter().any(|v| self.matches(v.as_ref()))
    }

    /// Returns a constraint that only matches versions matched by both constraints
    pub fn intersect(&self, other: &Self) -> Self {
        let alternatives = self
            .alternatives
            .iter()
            .flat_map(|a| {
                other.alternatives.iter().map(move |b| VersionReq {
                    comparators: a.comparators.iter().chain(&b.comparators).cloned().collect(),
                })
            })
            .collect();
        Self { pragma: format!("{} {}", self.pragma, other.pragma), alternatives }
    }

    /// The pragma as written in the source file
    pub fn pragma(&self) -> &str {
        &self.pragma
    }

    pub fn alternatives(&self) -> &[VersionReq] {
        &self.alternatives
    }
}

fn parse_alternative(alternative: &str) -> std::result::Result<VersionReq, semver::Error> {
    let alternative = alternative.trim();
    // hyphen range `0.8.0 - 0.8.10`
    if let Some((low, high)) = alternative.split_once(" - ") {
        return VersionReq::parse(&format!(">={}, <={}", low.trim(), high.trim()))
    }

    // glue operators to their version, `>= 0.8.0` -> `>=0.8.0`
    let mut glued = String::with_capacity(alternative.len());
    let mut after_op = false;
    for c in alternative.chars() {
        if c.is_whitespace() && after_op {
            continue
        }
        after_op = matches!(c, '>' | '<' | '=' | '^' | '~');
        glued.push(c);
    }

    let comparators = glued
        .split_whitespace()
        .map(|cmp| {
            // `0.8` is exact as well, semver reads `=0.8` as `0.8.x`
            if cmp.starts_with(|c: char| c.is_ascii_digit()) && !cmp.contains(['*', 'x', 'X']) {
                format!("={cmp}")
            } else {
                cmp.to_string()
            }
        })
        .collect::<Vec<_>>();

    if comparators.is_empty() {
        return Ok(VersionReq::STAR)
    }

    VersionReq::parse(&comparators.join(","))
}

impl FromStr for VersionConstraint {
    type Err = semver::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pragma)
    }
}

impl fmt::Debug for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VersionConstraint").field(&self.pragma).finish()
    }
}

/// A compiler version that is either installed locally or available for installation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SolcVersion {
    Installed(Version),
    Remote(Version),
}

impl SolcVersion {
    /// Whether this version is installed
    pub fn is_installed(&self) -> bool {
        matches!(self, SolcVersion::Installed(_))
    }
}

impl Ord for SolcVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_ref()
            .cmp(other.as_ref())
            .then_with(|| self.is_installed().cmp(&other.is_installed()))
    }
}

impl PartialOrd for SolcVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl AsRef<Version> for SolcVersion {
    fn as_ref(&self) -> &Version {
        match self {
            SolcVersion::Installed(v) | SolcVersion::Remote(v) => v,
        }
    }
}

impl From<SolcVersion> for Version {
    fn from(s: SolcVersion) -> Version {
        match s {
            SolcVersion::Installed(v) | SolcVersion::Remote(v) => v,
        }
    }
}

impl fmt::Display for SolcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

/// A compiler version that was selected for a compilation unit but is not installed yet
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstallRequest {
    pub version: Version,
}

impl InstallRequest {
    /// Returns a request if the version still needs to be installed
    pub fn for_version(version: &SolcVersion) -> Option<Self> {
        match version {
            SolcVersion::Remote(v) => Some(Self { version: v.clone() }),
            SolcVersion::Installed(_) => None,
        }
    }
}

impl fmt::Display for InstallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "solc {}", self.version)
    }
}

/// Selects compiler versions for sets of files based on their version pragmas
///
/// Candidates are ordered ascending, an installed release shadows the remote release of the same
/// version.
#[derive(Debug, Clone, Default)]
pub struct VersionResolver {
    versions: Vec<SolcVersion>,
    pinned: Option<Version>,
}

impl VersionResolver {
    pub fn new(
        installed: impl IntoIterator<Item = Version>,
        available: impl IntoIterator<Item = Version>,
    ) -> Self {
        let mut versions: BTreeMap<Version, bool> = BTreeMap::new();
        for v in available {
            versions.entry(v).or_insert(false);
        }
        for v in installed {
            versions.insert(v, true);
        }
        let versions = versions
            .into_iter()
            .map(|(v, installed)| {
                if installed {
                    SolcVersion::Installed(v)
                } else {
                    SolcVersion::Remote(v)
                }
            })
            .collect();
        Self { versions, pinned: None }
    }

    /// Restricts the candidates to exactly the given version
    ///
    /// If the version is unknown it is treated as available for installation.
    pub fn pinned(mut self, version: Version) -> Self {
        let pin = self
            .versions
            .iter()
            .find(|v| v.as_ref() == &version)
            .cloned()
            .unwrap_or_else(|| SolcVersion::Remote(version.clone()));
        tracing::debug!("pinning solc version {}", pin);
        self.versions = vec![pin];
        self.pinned = Some(version);
        self
    }

    /// The pinned version, if any
    pub fn pin(&self) -> Option<&Version> {
        self.pinned.as_ref()
    }

    /// All candidate versions, ascending
    pub fn versions(&self) -> &[SolcVersion] {
        &self.versions
    }

    /// Returns all candidates that satisfy the file's version pragma
    ///
    /// A file without a pragma is compatible with every candidate.
    pub fn compatible_versions(
        &self,
        file: &Path,
        constraint: Option<&VersionConstraint>,
    ) -> Result<Vec<SolcVersion>> {
        let compatible: Vec<_> = match constraint {
            Some(constraint) => {
                self.versions.iter().filter(|v| constraint.matches(v.as_ref())).cloned().collect()
            }
            None => self.versions.clone(),
        };
        if compatible.is_empty() {
            return Err(SolcError::UnsatisfiableVersion {
                file: file.to_path_buf(),
                constraint: constraint.cloned().unwrap_or_else(VersionConstraint::any),
            })
        }
        Ok(compatible)
    }

    /// Returns the highest installed version, or the highest version if none is installed
    pub fn pick(candidates: &[SolcVersion]) -> Option<SolcVersion> {
        candidates
            .iter()
            .rposition(|v| v.is_installed())
            .map(|pos| &candidates[pos])
            .or_else(|| candidates.last())
            .cloned()
    }

    /// Returns all candidates that can compile every file of a closure together
    ///
    /// A file whose pragma no candidate satisfies is reported on its own, otherwise an empty
    /// intersection is a conflict naming every file that declares a pragma.
    pub fn resolve_closure<'a, I>(&self, files: I) -> Result<Vec<SolcVersion>>
    where
        I: IntoIterator<Item = (&'a Path, Option<&'a VersionConstraint>)>,
    {
        let mut candidates = self.versions.clone();
        let mut constrained = Vec::new();
        for (file, constraint) in files {
            let Some(constraint) = constraint else { continue };
            let compatible = self.compatible_versions(file, Some(constraint))?;
            candidates.retain(|v| compatible.contains(v));
            constrained.push((file.to_path_buf(), constraint.pragma().to_string()));
        }

        if candidates.is_empty() {
            if constrained.is_empty() {
                // no candidates at all
                return Err(SolcError::msg("no solc versions are available"))
            }
            constrained.sort();
            constrained.dedup();
            tracing::debug!("no common solc version for {} files", constrained.len());
            return Err(SolcError::VersionConflict { files: constrained })
        }
        Ok(candidates)
    }

    /// Assigns a version to every target given each target's compatible candidates
    ///
    /// If one version satisfies all targets, every target gets that version. Otherwise each
    /// target prefers a version that was already chosen for another target, and falls back to
    /// [`Self::pick`].
    pub fn resolve_many<T>(
        candidates: Vec<(T, Vec<SolcVersion>)>,
    ) -> BTreeMap<SolcVersion, Vec<T>> {
        let mut versioned = BTreeMap::new();
        if candidates.is_empty() {
            return versioned
        }

        let common = intersection(candidates.iter().map(|(_, versions)| versions.as_slice()));
        if let Some(exact) = Self::pick(&common) {
            tracing::trace!("resolved solc version compatible with all targets \"{}\"", exact);
            versioned.insert(exact, candidates.into_iter().map(|(target, _)| target).collect());
            return versioned
        }

        for (target, mut versions) in candidates {
            versions.sort_unstable();
            let chosen = versions
                .iter()
                .rev()
                .find(|v| versioned.contains_key(*v))
                .cloned()
                .or_else(|| Self::pick(&versions));
            if let Some(chosen) = chosen {
                versioned.entry(chosen).or_insert_with(Vec::new).push(target);
            }
        }
        tracing::trace!(
            "no solc version can satisfy all targets, resolved multiple versions {:?}",
            versioned.keys().map(ToString::to_string).collect::<Vec<_>>()
        );
        versioned
    }
}

/// returns the sorted intersection of all sets
fn intersection<'a>(mut sets: impl Iterator<Item = &'a [SolcVersion]>) -> Vec<SolcVersion> {
    let Some(first) = sets.next() else { return Vec::new() };
    let mut result = first.to_vec();
    for set in sets {
        result.retain(|v| set.contains(v));
    }
    result.sort_unstable();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn resolver() -> VersionResolver {
        VersionResolver::new(
            [v("0.7.6"), v("0.8.10")],
            ["0.6.12", "0.7.6", "0.8.10", "0.8.19", "0.8.20"].into_iter().map(v),
        )
    }

    #[test]
    fn can_intersect_constraints() {
        let a = VersionConstraint::parse("^0.6.12 || ^0.8.0").unwrap();
        let b = VersionConstraint::parse("<0.8.11").unwrap();
        let c = a.intersect(&b);
        assert_eq!(c.alternatives().len(), 2);
        assert!(c.matches(&v("0.6.12")));
        assert!(c.matches(&v("0.8.10")));
        assert!(!c.matches(&v("0.8.19")));
        assert!(!c.matches(&v("0.7.6")));
    }

    #[test]
    fn can_parse_solidity_pragmas() {
        let c = VersionConstraint::parse(">=0.8.0 <0.9.0").unwrap();
        assert!(c.matches(&v("0.8.19")));
        assert!(!c.matches(&v("0.9.0")));

        let c = VersionConstraint::parse(">= 0.8.0").unwrap();
        assert!(c.matches(&v("0.8.0")));

        let c = VersionConstraint::parse("^0.8.0").unwrap();
        assert!(c.matches(&v("0.8.20")));
        assert!(!c.matches(&v("0.7.6")));

        let c = VersionConstraint::parse("0.8.4").unwrap();
        assert!(c.matches(&v("0.8.4")));
        assert!(!c.matches(&v("0.8.5")));

        let c = VersionConstraint::parse("^0.6.12 || >=0.8.0 <0.8.11").unwrap();
        assert!(c.matches(&v("0.6.12")));
        assert!(c.matches(&v("0.8.10")));
        assert!(!c.matches(&v("0.7.6")));
        assert!(!c.matches(&v("0.8.19")));

        let c = VersionConstraint::parse("0.8.0 - 0.8.10").unwrap();
        assert!(c.matches(&v("0.8.10")));
        assert!(!c.matches(&v("0.8.11")));

        assert_eq!(c.to_string(), "0.8.0 - 0.8.10");
        assert!(VersionConstraint::parse("not a version").is_err());
    }

    #[test]
    fn installed_shadows_remote() {
        let r = resolver();
        let versions: Vec<_> = r.versions().iter().map(|v| (v.to_string(), v.is_installed())).collect();
        assert_eq!(
            versions,
            vec![
                ("0.6.12".to_string(), false),
                ("0.7.6".to_string(), true),
                ("0.8.10".to_string(), true),
                ("0.8.19".to_string(), false),
                ("0.8.20".to_string(), false),
            ]
        );
    }

    #[test]
    fn picks_highest_installed() {
        let r = resolver();
        let c = VersionConstraint::parse("^0.8.0").unwrap();
        let candidates = r.compatible_versions(Path::new("A.sol"), Some(&c)).unwrap();
        assert_eq!(VersionResolver::pick(&candidates), Some(SolcVersion::Installed(v("0.8.10"))));

        let c = VersionConstraint::parse(">=0.8.11").unwrap();
        let candidates = r.compatible_versions(Path::new("A.sol"), Some(&c)).unwrap();
        assert_eq!(VersionResolver::pick(&candidates), Some(SolcVersion::Remote(v("0.8.20"))));
    }

    #[test]
    fn unsatisfiable_pragma_names_file() {
        let r = resolver();
        let c = VersionConstraint::parse("^0.4.0").unwrap();
        let err = r.compatible_versions(Path::new("Old.sol"), Some(&c)).unwrap_err();
        match err {
            SolcError::UnsatisfiableVersion { file, constraint } => {
                assert_eq!(file, PathBuf::from("Old.sol"));
                assert_eq!(constraint.pragma(), "^0.4.0");
            }
            err => panic!("unexpected error {err}"),
        }
    }

    #[test]
    fn closure_conflict_lists_constrained_files() {
        let r = resolver();
        let a = VersionConstraint::parse("^0.8.0").unwrap();
        let b = VersionConstraint::parse("^0.7.0").unwrap();
        let files = vec![
            (Path::new("A.sol"), Some(&a)),
            (Path::new("B.sol"), Some(&b)),
            (Path::new("C.sol"), None),
        ];
        match r.resolve_closure(files).unwrap_err() {
            SolcError::VersionConflict { files } => {
                assert_eq!(
                    files,
                    vec![
                        (PathBuf::from("A.sol"), "^0.8.0".to_string()),
                        (PathBuf::from("B.sol"), "^0.7.0".to_string())
                    ]
                );
            }
            err => panic!("unexpected error {err}"),
        }
    }

    #[test]
    fn closure_intersects_constraints() {
        let r = resolver();
        let a = VersionConstraint::parse(">=0.7.0").unwrap();
        let b = VersionConstraint::parse("<0.8.11").unwrap();
        let candidates =
            r.resolve_closure(vec![(Path::new("A.sol"), Some(&a)), (Path::new("B.sol"), Some(&b))]).unwrap();
        assert_eq!(
            candidates,
            vec![SolcVersion::Installed(v("0.7.6")), SolcVersion::Installed(v("0.8.10"))]
        );
    }

    #[test]
    fn resolve_many_prefers_single_version() {
        let r = resolver();
        let any = r.versions().to_vec();
        let old = vec![SolcVersion::Installed(v("0.7.6")), SolcVersion::Installed(v("0.8.10"))];
        let resolved = VersionResolver::resolve_many(vec![("a", any), ("b", old)]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[&SolcVersion::Installed(v("0.8.10"))], vec!["a", "b"]);
    }

    #[test]
    fn resolve_many_reuses_chosen_versions() {
        let seven = vec![SolcVersion::Installed(v("0.7.6"))];
        let eight = vec![SolcVersion::Installed(v("0.8.10")), SolcVersion::Remote(v("0.8.20"))];
        let both = vec![SolcVersion::Installed(v("0.7.6")), SolcVersion::Remote(v("0.8.20"))];
        let resolved =
            VersionResolver::resolve_many(vec![("a", seven), ("b", eight), ("c", both)]);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[&SolcVersion::Installed(v("0.7.6"))], vec!["a", "c"]);
        assert_eq!(resolved[&SolcVersion::Installed(v("0.8.10"))], vec!["b"]);
    }

    #[test]
    fn pin_restricts_candidates() {
        let r = resolver().pinned(v("0.8.19"));
        assert_eq!(r.versions(), &[SolcVersion::Remote(v("0.8.19"))]);
        let c = VersionConstraint::parse("^0.7.0").unwrap();
        assert!(r.compatible_versions(Path::new("A.sol"), Some(&c)).is_err());
        assert_eq!(
            InstallRequest::for_version(&r.versions()[0]),
            Some(InstallRequest { version: v("0.8.19") })
        );
    }
}
