//! `solbuild` command line interface

mod compile;
mod flatten;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Incremental Solidity builds
#[derive(Debug, Parser)]
#[clap(author, about, version)]
pub struct App {
    #[clap(subcommand)]
    pub cmd: Cmd,
}

#[derive(Debug, Subcommand)]
pub enum Cmd {
    /// Compile the project or the given targets
    Compile(compile::CompileArgs),
    /// Print a file together with all its imports as a single source
    Flatten(flatten::FlattenArgs),
}

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let app = App::parse();
    let ok = match app.cmd {
        Cmd::Compile(args) => args.run()?,
        Cmd::Flatten(args) => {
            args.run()?;
            true
        }
    };
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        App::command().debug_assert();
    }
}
