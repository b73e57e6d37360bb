//! A mock compiler and generators for mock projects

use crate::{
    cache::ArtifactRef,
    compile::{Compiler, RawOutput},
    error::{CompilerError, Result},
    planner::CompilationUnit,
    utils, ProjectPathsConfig,
};
use parking_lot::Mutex;
use semver::Version;
use std::{
    collections::{BTreeSet, HashSet},
    path::{Path, PathBuf},
};

/// A [`Compiler`] that records every invocation instead of running `solc`
///
/// Artifacts are `mock://<version>/<unit id>#<file name>`.
#[derive(Debug)]
pub struct MockCompiler {
    installed: Mutex<BTreeSet<Version>>,
    /// versions that `install` can provide
    remote: BTreeSet<Version>,
    invocations: Mutex<Vec<CompilationUnit>>,
    installs: Mutex<Vec<Version>>,
    /// units containing any of these files fail
    failing: Mutex<HashSet<PathBuf>>,
}

impl Default for MockCompiler {
    fn default() -> Self {
        Self::new([Version::new(0, 6, 12), Version::new(0, 7, 6), Version::new(0, 8, 19)])
    }
}

impl MockCompiler {
    pub fn new(installed: impl IntoIterator<Item = Version>) -> Self {
        Self {
            installed: Mutex::new(installed.into_iter().collect()),
            remote: Default::default(),
            invocations: Default::default(),
            installs: Default::default(),
            failing: Default::default(),
        }
    }

    /// Versions that aren't installed but can be installed
    #[must_use]
    pub fn with_remote(mut self, versions: impl IntoIterator<Item = Version>) -> Self {
        self.remote.extend(versions);
        self
    }

    /// Makes every unit that contains `file` fail
    pub fn fail_on(&self, file: impl Into<PathBuf>) {
        self.failing.lock().insert(file.into());
    }

    /// All units compiled so far, in invocation order
    pub fn invocations(&self) -> Vec<CompilationUnit> {
        self.invocations.lock().clone()
    }

    pub fn num_invocations(&self) -> usize {
        self.invocations.lock().len()
    }

    /// All versions installed so far
    pub fn installs(&self) -> Vec<Version> {
        self.installs.lock().clone()
    }

    /// Forgets all recorded invocations and installs
    pub fn reset(&self) {
        self.invocations.lock().clear();
        self.installs.lock().clear();
    }
}

impl Compiler for MockCompiler {
    fn installed_versions(&self) -> Vec<Version> {
        self.installed.lock().iter().cloned().collect()
    }

    fn available_versions(&self) -> Vec<Version> {
        let mut versions: BTreeSet<_> = self.installed.lock().clone();
        versions.extend(self.remote.iter().cloned());
        versions.into_iter().collect()
    }

    fn install(&self, version: &Version) -> std::result::Result<(), CompilerError> {
        if !self.remote.contains(version) {
            return Err(CompilerError::NotInstalled { version: version.clone() })
        }
        self.installed.lock().insert(version.clone());
        self.installs.lock().push(version.clone());
        Ok(())
    }

    fn compile(&self, unit: &CompilationUnit) -> std::result::Result<RawOutput, CompilerError> {
        self.invocations.lock().push(unit.clone());

        let version: &Version = unit.version.as_ref();
        if !self.installed.lock().contains(version) {
            return Err(CompilerError::NotInstalled { version: version.clone() })
        }
        if let Some(file) = unit.files().find(|file| self.failing.lock().contains(*file)) {
            return Err(CompilerError::failed(format!("mock failure in {}", file.display())))
        }

        let base = format!("mock://{}/{}", version, unit.id);
        let mut output = RawOutput::new(ArtifactRef::new(base.clone()));
        for file in unit.files() {
            let name = file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            output.artifacts.insert(file.clone(), ArtifactRef::new(format!("{base}#{name}")));
        }
        Ok(output)
    }
}

/// Writes a project with `num_files` sources and `num_libs` packages into the paths config
///
/// Every source imports its parent in a binary tree (`File3` imports `File1`) and each package
/// installed under the first package root, `File<n>` additionally imports library `n % num_libs`.
#[derive(Debug, Clone)]
pub struct MockProjectGenerator {
    num_files: usize,
    num_libs: usize,
}

impl MockProjectGenerator {
    pub fn new(num_files: usize, num_libs: usize) -> Self {
        Self { num_files, num_libs }
    }

    /// Generate all solidity files and write them under the paths config
    pub fn write_to(&self, paths: &ProjectPathsConfig, version: impl AsRef<str>) -> Result<()> {
        let version = version.as_ref();
        let lib_root = paths.libraries.first().cloned().unwrap_or_else(|| paths.root.join("lib"));

        for lib in 0..self.num_libs {
            let content = format!(
                "// SPDX-License-Identifier: UNLICENSED\npragma solidity {version};\nlibrary Lib{lib} {{}}\n"
            );
            write_file(&lib_root.join(format!("mocklib{lib}")).join(format!("Lib{lib}.sol")), content)?;
        }

        for file in 0..self.num_files {
            let mut imports = Vec::new();
            if file > 0 {
                imports.push(format!("import \"./File{}.sol\";", (file - 1) / 2));
            }
            if self.num_libs > 0 {
                let lib = file % self.num_libs;
                imports.push(format!("import \"mocklib{lib}/Lib{lib}.sol\";"));
            }
            let content = format!(
                "// SPDX-License-Identifier: UNLICENSED\npragma solidity {version};\n{}\ncontract File{file} {{}}\n",
                imports.join("\n")
            );
            write_file(&paths.sources.join(format!("File{file}.sol")), content)?;
        }
        Ok(())
    }
}

fn write_file(path: &Path, content: String) -> Result<()> {
    utils::create_parent_dir_all(path)?;
    std::fs::write(path, content).map_err(|err| crate::SolcError::io(err, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installs_remote_versions_only() {
        let compiler = MockCompiler::new([Version::new(0, 8, 19)]).with_remote([Version::new(0, 8, 20)]);
        assert_eq!(compiler.available_versions().len(), 2);
        assert!(compiler.install(&Version::new(0, 8, 20)).is_ok());
        assert!(compiler.install(&Version::new(0, 4, 26)).is_err());
        assert_eq!(compiler.installed_versions(), vec![Version::new(0, 8, 19), Version::new(0, 8, 20)]);
        assert_eq!(compiler.installs(), vec![Version::new(0, 8, 20)]);
    }
}
