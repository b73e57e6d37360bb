//! The `compile` subcommand

use clap::Parser;
use semver::Version;
use solbuild_solc::{
    EvmVersion, Libraries, Project, ProjectCompileOutput, ProjectPathsConfig, Remapping, Settings,
};
use std::path::{Path, PathBuf};
use yansi::Paint;

/// Where the project lives and how its imports are found
#[derive(Debug, Clone, Parser)]
pub struct ProjectArgs {
    /// The project's root path
    #[clap(long, value_name = "PATH", default_value = ".")]
    pub root: PathBuf,

    /// The contracts source directory, relative to the root
    #[clap(long, value_name = "PATH")]
    pub sources: Option<PathBuf>,

    /// Import remappings like `@oz/=lib/openzeppelin/contracts/`
    #[clap(long = "remapping", short = 'r', value_name = "REMAPPING")]
    pub remappings: Vec<Remapping>,

    /// Package roots searched for imports, defaults to `lib`, `node_modules` and `.cache`
    #[clap(long = "lib", value_name = "PATH")]
    pub libs: Vec<PathBuf>,

    /// Additional directories for absolute imports
    #[clap(long = "include-path", value_name = "PATH")]
    pub include_paths: Vec<PathBuf>,
}

impl ProjectArgs {
    pub fn paths(&self) -> eyre::Result<ProjectPathsConfig> {
        let mut paths = ProjectPathsConfig::builder()
            .root(&self.root)
            .remappings(self.remappings.iter().cloned())
            .include_paths(self.include_paths.iter().cloned());
        if let Some(ref sources) = self.sources {
            paths = paths.sources(sources);
        }
        if !self.libs.is_empty() {
            paths = paths.libs(self.libs.iter().cloned());
        }
        Ok(paths.build()?)
    }
}

#[derive(Debug, Clone, Parser)]
pub struct CompileArgs {
    /// Files or glob patterns to compile, all sources if empty
    #[clap(value_name = "TARGETS")]
    pub targets: Vec<String>,

    #[clap(flatten)]
    pub project: ProjectArgs,

    /// Ignore the cache and recompile every unit
    #[clap(long)]
    pub force: bool,

    /// Compile every unit with this solc version
    #[clap(long = "use", value_name = "SOLC_VERSION")]
    pub pin: Option<Version>,

    /// Disable the optimizer
    #[clap(long, conflicts_with = "optimizer_runs")]
    pub no_optimize: bool,

    /// Number of optimizer runs
    #[clap(long, value_name = "RUNS")]
    pub optimizer_runs: Option<usize>,

    /// Linked libraries in the form of `<file>:<lib>:<address>`
    #[clap(long = "library", value_name = "LIBRARY")]
    pub libraries: Vec<String>,

    /// Target EVM version
    #[clap(long, value_name = "VERSION")]
    pub evm_version: Option<EvmVersion>,

    /// Compile through the Yul intermediate representation
    #[clap(long)]
    pub via_ir: bool,

    /// Maximum number of units compiled in parallel, defaults to the number of cpus
    #[clap(long, short, value_name = "JOBS", value_parser = clap::value_parser!(u16).range(1..))]
    pub jobs: Option<u16>,

    /// Directory with installed solc versions
    #[clap(long, value_name = "PATH", env = "SVM_HOME")]
    pub svm_home: Option<PathBuf>,
}

impl CompileArgs {
    /// Compiles and prints a summary, returns whether every unit compiled
    pub fn run(self) -> eyre::Result<bool> {
        let project = self.project()?;
        let output = project.compile_targets(&self.targets, self.force)?;
        print_summary(project.root(), &output);
        Ok(!output.has_failures())
    }

    pub fn project(&self) -> eyre::Result<Project> {
        let mut builder = Project::builder().paths(self.project.paths()?).settings(self.settings()?);
        if let Some(ref version) = self.pin {
            builder = builder.pin(version.clone());
        }
        if let Some(jobs) = self.jobs {
            builder = builder.jobs(jobs as usize);
        }
        if let Some(ref svm_home) = self.svm_home {
            builder = builder.svm_home(svm_home);
        }
        Ok(builder.build()?)
    }

    pub fn settings(&self) -> eyre::Result<Settings> {
        let mut settings = Settings::default();
        if self.no_optimize {
            settings.optimizer.disable();
        }
        if let Some(runs) = self.optimizer_runs {
            settings.optimizer.runs(runs);
        }
        settings.evm_version = self.evm_version;
        if self.via_ir {
            settings.via_ir = Some(true);
        }
        settings.libraries = Libraries::parse(&self.libraries)?;
        Ok(settings)
    }
}

fn print_summary(root: &Path, output: &ProjectCompileOutput) {
    let rel = |path: &PathBuf| path.strip_prefix(root).unwrap_or(path).display().to_string();
    let files = |targets: &[PathBuf]| targets.iter().map(rel).collect::<Vec<_>>().join(", ");

    for unit in &output.compiled {
        println!(
            "{} {} [solc {}] {}",
            Paint::green("compiled"),
            unit.unit.id,
            unit.unit.version,
            files(&unit.unit.targets)
        );
    }
    for unit in &output.cached {
        println!(
            "{} {} [solc {}] {}",
            Paint::cyan("cached"),
            unit.unit.id,
            unit.unit.version,
            files(&unit.unit.targets)
        );
    }
    for failure in &output.failures {
        println!("{} {}\n  {}", Paint::red("failed"), files(&failure.targets), failure.error);
    }
    for request in &output.unsatisfied_installs {
        println!("{} {request} could not be installed", Paint::yellow("missing"));
    }

    if output.compiled.is_empty() && !output.has_failures() {
        println!("No files changed, compilation skipped");
    } else {
        println!(
            "{} compiled, {} cached, {} failed",
            output.compiled.len(),
            output.cached.len(),
            output.failures.len()
        );
    }
}
