//! The `flatten` subcommand

use crate::compile::ProjectArgs;
use clap::Parser;
use solbuild_solc::Project;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
pub struct FlattenArgs {
    /// The file to flatten, relative to the root or to the sources dir
    #[clap(value_name = "TARGET")]
    pub target: String,

    #[clap(flatten)]
    pub project: ProjectArgs,

    /// Write the flattened source to this file instead of stdout
    #[clap(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

impl FlattenArgs {
    pub fn run(self) -> eyre::Result<()> {
        let project = Project::builder().paths(self.project.paths()?).ephemeral().build()?;
        let flattened = project.flatten(&self.target)?;
        match self.output {
            Some(output) => {
                if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&output, flattened)?;
                tracing::debug!("wrote flattened {} to {}", self.target, output.display());
            }
            None => print!("{flattened}"),
        }
        Ok(())
    }
}
