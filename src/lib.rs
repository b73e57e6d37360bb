#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! # solbuild
//!
//! > Incremental Solidity builds on top of `solc`.
//!
//! The build resolves the import graph of a project, selects a compiler version for every group
//! of files that must be compiled together and only recompiles what changed since the last run.
//!
//! ```no_run
//! use solbuild::prelude::*;
//!
//! let project = Project::builder().build().unwrap();
//! let output = project.compile_targets(["contracts/Greeter.sol"], false).unwrap();
//! for unit in &output.compiled {
//!     println!("{} compiled with solc {}", unit.unit.id, unit.unit.version);
//! }
//! ```
//!
//! See [`solc`] for the full API.

/// Import resolution, version selection and cached compilation
pub mod solc {
    pub use solbuild_solc::*;
}

/// Easy imports of frequently used type definitions
pub mod prelude {
    pub use solbuild_solc::{
        error::{Result, SolcError},
        CompilationUnit, Compiler, Project, ProjectCompileOutput, ProjectPathsConfig, Remapping,
        Settings, SolcCompiler,
    };
}
