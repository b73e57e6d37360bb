//! project tests

use pretty_assertions::assert_eq;
use semver::Version;
use solbuild_solc::{
    cache::SOLIDITY_FILES_CACHE_FILENAME,
    project_util::{mock::MockCompiler, TempProject},
    resolver::ResolutionMethod,
    CompilerError, Graph, ProjectPathsConfig, Remapping, SolcError,
};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn files_of(project: &TempProject, unit: usize) -> BTreeSet<PathBuf> {
    project.compiler().invocations()[unit].files().cloned().collect()
}

#[test]
fn files_without_imports_have_singleton_closures() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    let a = project.add_basic_source("A", "^0.8.0").unwrap();
    let b = project.add_basic_source("B", "^0.8.0").unwrap();

    let graph = Graph::resolve(project.paths()).unwrap();
    assert_eq!(graph.files().len(), 2);
    for file in [&a, &b] {
        let id = graph.files()[file];
        assert_eq!(graph.closure(id), BTreeSet::from([id]));
    }

    let compiled = project.compile().unwrap();
    assert!(!compiled.has_failures());
    assert_eq!(compiled.compiled.len(), 2);
}

#[test]
fn shared_closure_compiles_as_single_unit() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    let a = project
        .add_source(
            "A",
            r#"
pragma solidity ^0.8.0;
import "./B.sol";
contract A {}
"#,
        )
        .unwrap();
    let b = project
        .add_source(
            "B",
            r#"
pragma solidity >=0.8.0 <0.9.0;
contract B {}
"#,
        )
        .unwrap();

    let compiled = project.compile().unwrap();
    assert!(!compiled.has_failures());
    assert_eq!(compiled.compiled.len(), 1);
    assert_eq!(project.compiler().num_invocations(), 1);

    let unit = &compiled.compiled[0].unit;
    assert_eq!(unit.targets, vec![a.clone(), b.clone()]);
    assert_eq!(files_of(&project, 0), BTreeSet::from([a.clone(), b.clone()]));
    let version: &Version = unit.version.as_ref();
    assert!(*version >= Version::new(0, 8, 0) && *version < Version::new(0, 9, 0));
    assert!(compiled.find(&a).is_some());
    assert!(compiled.find(&b).is_some());

    // nothing changed, nothing to compile
    let compiled = project.compile().unwrap();
    assert!(compiled.is_unchanged());
    assert_eq!(compiled.cached.len(), 1);
    assert_eq!(project.compiler().num_invocations(), 1);
    assert_eq!(compiled.find(&a).map(|a| a.as_str().starts_with("mock://0.8.19/")), Some(true));

    let cache = project.read_cache_file().unwrap();
    assert!(project.cache_path().ends_with(SOLIDITY_FILES_CACHE_FILENAME));
    assert_eq!(
        cache.files.keys().cloned().collect::<Vec<_>>(),
        vec![PathBuf::from("contracts/A.sol"), PathBuf::from("contracts/B.sol")]
    );
}

#[test]
fn editing_a_leaf_recompiles_only_dependent_units() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    let a = project
        .add_source("A", "pragma solidity ^0.8.0;\nimport \"./Leaf.sol\";\ncontract A {}\n")
        .unwrap();
    project.add_basic_source("Leaf", "^0.8.0").unwrap();
    project.add_basic_source("Other", "^0.8.0").unwrap();

    let compiled = project.compile().unwrap();
    assert_eq!(compiled.compiled.len(), 2);
    project.compiler().reset();

    project
        .add_source("Leaf", "pragma solidity ^0.8.0;\ncontract Leaf { uint256 x; }\n")
        .unwrap();
    let compiled = project.compile().unwrap();
    assert_eq!(compiled.compiled.len(), 1);
    assert_eq!(compiled.cached.len(), 1);
    assert_eq!(project.compiler().num_invocations(), 1);
    assert!(files_of(&project, 0).contains(&a));

    project.compiler().reset();
    project.assert_unchanged();
    assert_eq!(project.compiler().num_invocations(), 0);
}

#[test]
fn force_compiles_every_unit() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    project.add_basic_source("A", "^0.8.0").unwrap();
    project.add_basic_source("B", "^0.7.0").unwrap();
    project.assert_no_errors_recompile_unchanged();
    project.compiler().reset();

    let compiled = project.compile_targets(Vec::<String>::new(), true).unwrap();
    assert_eq!(compiled.compiled.len(), 2);
    assert!(compiled.cached.is_empty());
    assert_eq!(project.compiler().num_invocations(), 2);
}

#[test]
fn resolves_highest_installed_package() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    for version in ["4.3.0", "4.9.0", "4.10.0-rc.1"] {
        project
            .add_contract(
                format!(".cache/OpenZeppelin/{version}/contracts/token/Token.sol"),
                "pragma solidity ^0.8.0;\ncontract Token {}\n",
            )
            .unwrap();
    }
    let a = project
        .add_source(
            "A",
            "pragma solidity ^0.8.0;\nimport \"@openzeppelin/contracts/token/Token.sol\";\ncontract A {}\n",
        )
        .unwrap();

    let graph = Graph::resolve(project.paths()).unwrap();
    let id = graph.files()[&a];
    let edge = &graph.edges().edges_of(id)[0];
    match edge.method {
        ResolutionMethod::Package { ref version, .. } => {
            assert_eq!(version.as_ref(), Some(&Version::parse("4.10.0-rc.1").unwrap()));
        }
        ref other => panic!("unexpected resolution {other:?}"),
    }
    assert!(graph.node(edge.to).path.starts_with(project.root().join(".cache/OpenZeppelin/4.10.0-rc.1")));

    let compiled = project.compile().unwrap();
    assert!(!compiled.has_failures());
    let unit = &compiled.compiled[0].unit;
    assert_eq!(
        unit.remappings,
        vec![Remapping::from_str("@openzeppelin/=.cache/OpenZeppelin/4.10.0-rc.1/").unwrap()]
    );
    assert_eq!(unit.settings.remappings, unit.remappings);
}

#[test]
fn applies_configured_remappings() {
    init_tracing();
    let project = TempProject::new(
        ProjectPathsConfig::builder().remapping(Remapping::from_str("lib-a/=vendor/a/").unwrap()),
    )
    .unwrap();
    let lib = project.add_contract("vendor/a/Lib.sol", "library Lib {}\n").unwrap();
    let a = project
        .add_source("A", "pragma solidity ^0.8.0;\nimport \"lib-a/Lib.sol\";\ncontract A {}\n")
        .unwrap();

    let compiled = project.compile().unwrap();
    assert!(!compiled.has_failures());
    assert_eq!(compiled.compiled.len(), 1);
    assert_eq!(files_of(&project, 0), BTreeSet::from([a, lib]));
    assert_eq!(compiled.compiled[0].unit.remappings, project.paths().remappings);
}

#[test]
fn missing_import_fails_only_its_unit() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    let a = project
        .add_source("A", "pragma solidity ^0.8.0;\nimport \"./Missing.sol\";\ncontract A {}\n")
        .unwrap();
    let b = project.add_basic_source("B", "^0.8.0").unwrap();

    let compiled = project.compile().unwrap();
    assert!(compiled.has_failures());
    assert_eq!(compiled.failures.len(), 1);
    assert_eq!(compiled.failures[0].targets, vec![a.clone()]);
    match compiled.failures[0].error {
        SolcError::ImportResolution { ref file, ref import, .. } => {
            assert_eq!(file, &a);
            assert_eq!(import, Path::new("./Missing.sol"));
        }
        ref err => panic!("unexpected error {err}"),
    }
    assert_eq!(compiled.compiled.len(), 1);
    assert_eq!(compiled.compiled[0].unit.targets, vec![b]);
}

#[test]
fn conflicting_pragmas_in_shared_closure() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    let a = project
        .add_source("A", "pragma solidity >=0.8.0;\nimport \"./B.sol\";\ncontract A {}\n")
        .unwrap();
    let b = project.add_basic_source("B", "<0.7.0").unwrap();

    let compiled = project.compile().unwrap();
    assert_eq!(compiled.failures.len(), 1);
    match compiled.failures[0].error {
        SolcError::VersionConflict { ref files } => {
            let files: Vec<_> = files.iter().map(|(file, _)| file.clone()).collect();
            assert_eq!(files, vec![a.clone(), b.clone()]);
        }
        ref err => panic!("unexpected error {err}"),
    }
    // `B` on its own is fine
    assert_eq!(compiled.compiled.len(), 1);
    assert_eq!(compiled.compiled[0].unit.targets, vec![b]);
    assert_eq!(compiled.compiled[0].unit.version.as_ref(), &Version::new(0, 6, 12));
}

#[test]
fn disjoint_files_compile_with_different_versions() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    project.add_basic_source("A", ">=0.8.0").unwrap();
    project.add_basic_source("B", "<0.7.0").unwrap();

    let compiled = project.compile().unwrap();
    assert!(!compiled.has_failures());
    let versions: BTreeSet<Version> =
        compiled.compiled.iter().map(|c| c.unit.version.clone().into()).collect();
    assert_eq!(versions, BTreeSet::from([Version::new(0, 6, 12), Version::new(0, 8, 19)]));
}

#[test]
fn unsatisfiable_pragma() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    let a = project.add_basic_source("A", "=0.5.0").unwrap();

    let compiled = project.compile().unwrap();
    assert_eq!(compiled.failures.len(), 1);
    assert!(matches!(
        compiled.failures[0].error,
        SolcError::UnsatisfiableVersion { ref file, .. } if file == &a
    ));
    assert_eq!(project.compiler().num_invocations(), 0);
}

#[test]
fn invalid_pragma() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    project.add_basic_source("A", "^abc").unwrap();

    let compiled = project.compile().unwrap();
    assert!(matches!(compiled.failures[0].error, SolcError::InvalidVersionPragma { .. }));
}

#[test]
fn installs_missing_versions_before_compiling() {
    init_tracing();
    let compiler = MockCompiler::default().with_remote([Version::new(0, 8, 20)]);
    let project = TempProject::with_compiler(compiler).unwrap();
    project.add_basic_source("A", "^0.8.20").unwrap();
    project.add_basic_source("B", "^0.8.0").unwrap();

    let compiled = project.compile().unwrap();
    assert!(!compiled.has_failures());
    assert!(compiled.unsatisfied_installs.is_empty());
    assert_eq!(project.compiler().installs(), vec![Version::new(0, 8, 20)]);
    assert!(compiled
        .compiled
        .iter()
        .all(|c| c.unit.version.as_ref() == &Version::new(0, 8, 20)));
}

#[test]
fn failed_install_fails_dependent_units() {
    init_tracing();
    let mut project = TempProject::mocked_compiler().unwrap();
    let a = project.add_basic_source("A", "^0.8.0").unwrap();
    project.set_pin(Version::new(0, 8, 25));

    let compiled = project.compile().unwrap();
    assert_eq!(compiled.unsatisfied_installs.len(), 1);
    assert_eq!(compiled.unsatisfied_installs[0].version, Version::new(0, 8, 25));
    assert_eq!(compiled.failures.len(), 1);
    assert_eq!(compiled.failures[0].targets, vec![a]);
    assert!(matches!(
        compiled.failures[0].error,
        SolcError::Compiler { error: CompilerError::NotInstalled { .. }, .. }
    ));
    assert_eq!(project.compiler().num_invocations(), 0);
}

#[test]
fn pinned_version_is_used_for_every_unit() {
    init_tracing();
    let mut project = TempProject::mocked_compiler().unwrap();
    project.add_basic_source("A", ">=0.7.0").unwrap();
    project.add_basic_source("B", "^0.7.0").unwrap();
    project.set_pin(Version::new(0, 7, 6));

    let compiled = project.compile().unwrap();
    assert!(!compiled.has_failures());
    assert!(compiled.compiled.iter().all(|c| c.unit.version.as_ref() == &Version::new(0, 7, 6)));
}

#[test]
fn compiler_failure_is_isolated() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    let a = project.add_basic_source("A", "^0.8.0").unwrap();
    project.add_basic_source("B", "^0.8.0").unwrap();
    project.compiler().fail_on(&a);

    let compiled = project.compile().unwrap();
    assert_eq!(compiled.failures.len(), 1);
    assert!(compiled.failures[0].error.is_compiler_error());
    assert_eq!(compiled.compiled.len(), 1);

    // the failed unit is compiled again, the other one is cached
    project.compiler().reset();
    let compiled = project.compile().unwrap();
    assert_eq!(compiled.failures.len(), 1);
    assert_eq!(compiled.cached.len(), 1);
    assert_eq!(project.compiler().num_invocations(), 1);
}

#[test]
fn compiles_selected_targets() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    let a = project.add_basic_source("A", "^0.8.0").unwrap();
    project.add_basic_source("B", "^0.8.0").unwrap();
    let test = project
        .add_contract(
            "test/A.t.sol",
            "pragma solidity ^0.8.0;\nimport \"../contracts/A.sol\";\ncontract ATest {}\n",
        )
        .unwrap();

    let compiled = project.compile_targets(["A.sol"], false).unwrap();
    assert_eq!(compiled.compiled.len(), 1);
    assert_eq!(compiled.compiled[0].unit.targets, vec![a.clone()]);

    // targets outside of the sources dir are resolved from the root
    let compiled = project.compile_targets(["test/*.sol"], false).unwrap();
    assert_eq!(compiled.compiled.len(), 1);
    assert_eq!(compiled.compiled[0].unit.targets, vec![test.clone()]);
    assert!(compiled.compiled[0].unit.contains(&a));

    let err = project.compile_targets(["Missing.sol"], false).unwrap_err();
    assert!(matches!(err, SolcError::TargetNotFound(_)));
}

#[test]
fn recovers_from_corrupted_cache() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    project.add_basic_source("A", "^0.8.0").unwrap();
    project.assert_no_errors_recompile_unchanged();

    fs::write(project.cache_path(), "{ not json").unwrap();
    project.compiler().reset();
    project.assert_changed();
    assert_eq!(project.compiler().num_invocations(), 1);
    project.assert_unchanged();

    fs::write(project.cache_path(), r#"{"_format":"other-format-1","files":{}}"#).unwrap();
    project.assert_changed();
}

#[test]
fn settings_are_part_of_the_cache_key() {
    init_tracing();
    let mut project = TempProject::mocked_compiler().unwrap();
    project.add_basic_source("A", "^0.8.0").unwrap();
    project.assert_no_errors_recompile_unchanged();

    project.project_mut().settings.optimizer.disable();
    project.assert_changed();
    project.assert_unchanged();

    // artifacts of the previous settings are still cached
    project.project_mut().settings.optimizer.enable();
    project.assert_unchanged();
}

#[test]
fn ephemeral_project_does_not_write_cache() {
    init_tracing();
    let mut project = TempProject::mocked_compiler().unwrap();
    project.project_mut().cached = false;
    project.add_basic_source("A", "^0.8.0").unwrap();

    project.assert_changed();
    project.assert_changed();
    assert!(!project.cache_path().exists());
}

#[test]
fn editing_a_shared_leaf_recompiles_every_version() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    let old = project
        .add_source("Old", "pragma solidity ^0.7.0;\nimport \"./Leaf.sol\";\ncontract Old {}\n")
        .unwrap();
    let new = project
        .add_source("New", "pragma solidity ^0.8.0;\nimport \"./Leaf.sol\";\ncontract New {}\n")
        .unwrap();
    let leaf = project.add_basic_source("Leaf", ">=0.7.0").unwrap();

    let compiled = project.compile().unwrap();
    assert!(!compiled.has_failures());
    assert_eq!(compiled.compiled.len(), 2);
    project.assert_unchanged();
    project.compiler().reset();

    project
        .add_source("Leaf", "pragma solidity >=0.7.0;\ncontract Leaf { uint256 x; }\n")
        .unwrap();
    let compiled = project.compile().unwrap();
    assert!(!compiled.has_failures());
    assert_eq!(project.compiler().num_invocations(), 2);
    let mut units = compiled
        .compiled
        .iter()
        .map(|c| (Version::from(c.unit.version.clone()), c.unit.contains(&leaf)))
        .collect::<Vec<_>>();
    units.sort();
    assert_eq!(units, vec![(Version::new(0, 7, 6), true), (Version::new(0, 8, 19), true)]);
    assert!(compiled.compiled.iter().any(|c| c.unit.contains(&old)));
    assert!(compiled.compiled.iter().any(|c| c.unit.contains(&new)));

    project.compiler().reset();
    project.assert_unchanged();
    assert_eq!(project.compiler().num_invocations(), 0);
}

#[test]
fn unreadable_file_fails_only_itself() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    let a = project.add_basic_source("A", "^0.8.0").unwrap();
    let bad = project.sources_path().join("Bad.sol");
    fs::write(&bad, [0xff, 0xfe]).unwrap();

    let compiled = project.compile().unwrap();
    assert_eq!(compiled.compiled.len(), 1);
    assert_eq!(compiled.compiled[0].unit.targets, vec![a]);
    assert_eq!(compiled.failures.len(), 1);
    assert_eq!(compiled.failures[0].targets, vec![bad]);
    assert!(matches!(compiled.failures[0].error, SolcError::Io(_)));

    // selecting only the unreadable file compiles nothing
    project.compiler().reset();
    let compiled = project.compile_targets(["Bad.sol"], true).unwrap();
    assert!(compiled.compiled.is_empty());
    assert_eq!(compiled.failures.len(), 1);
    assert_eq!(project.compiler().num_invocations(), 0);
}

#[test]
fn unwritable_cache_does_not_fail_compile() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    let a = project.add_basic_source("A", "^0.8.0").unwrap();
    fs::create_dir_all(project.cache_path()).unwrap();

    let compiled = project.compile().unwrap();
    assert!(!compiled.has_failures());
    assert_eq!(compiled.compiled.len(), 1);
    assert!(compiled.find(&a).is_some());
    assert!(project.cache_path().is_dir());
}

#[test]
fn resolves_imports_relative_to_the_sources_dir() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    let lib = project.add_basic_source("Lib", "^0.8.0").unwrap();
    let a = project
        .add_source("sub/A", "pragma solidity ^0.8.0;\nimport \"Lib.sol\";\ncontract A {}\n")
        .unwrap();

    let graph = Graph::resolve(project.paths()).unwrap();
    let id = graph.files()[&a];
    assert!(graph.imported_nodes(id).iter().any(|dep| graph.node(*dep).path == lib));

    let compiled = project.compile_targets(["sub/A.sol"], false).unwrap();
    assert!(!compiled.has_failures());
    let unit = &compiled.compiled[0].unit;
    assert!(unit.contains(&lib));
    // solc finds the file under the name it was imported with
    assert!(unit
        .settings
        .remappings
        .iter()
        .any(|r| r.name == "Lib.sol" && r.path == "contracts/Lib.sol"));
}

#[test]
fn linked_libraries_are_part_of_the_cache_key() {
    init_tracing();
    let mut project = TempProject::mocked_compiler().unwrap();
    project.add_basic_source("A", "^0.8.0").unwrap();
    project.assert_no_errors_recompile_unchanged();

    let settings = project.project().settings.clone().with_library(
        "contracts/A.sol",
        "Math",
        "0x5FbDB2315678afecb367f032d93F642f64180aa3",
    );
    project.project_mut().settings = settings;
    project.assert_changed();
    project.assert_unchanged();
    let unit = &project.compiler().invocations()[1];
    assert_eq!(
        unit.settings.libraries.libs["contracts/A.sol"]["Math"],
        "0x5FbDB2315678afecb367f032d93F642f64180aa3"
    );
}

#[test]
fn compiles_source_from_memory() {
    init_tracing();
    let compiler = MockCompiler::default().with_remote([Version::new(0, 8, 20)]);
    let project = TempProject::with_compiler(compiler).unwrap();
    let b = project.add_basic_source("B", "^0.7.0").unwrap();

    let compiled = project
        .project()
        .compile_source("Inline", "pragma solidity ^0.7.0;\nimport \"./B.sol\";\ncontract Inline {}\n")
        .unwrap();
    let inline = project.sources_path().join("Inline.sol");
    assert_eq!(compiled.unit.version.as_ref(), &Version::new(0, 7, 6));
    assert_eq!(compiled.unit.targets, vec![inline.clone()]);
    assert!(compiled.unit.contains(&b));
    assert!(compiled.artifacts.contains_key(&inline));
    assert!(!inline.exists());
    assert!(!project.cache_path().exists());

    // missing versions are installed
    let compiled = project
        .project()
        .compile_source("Latest.sol", "pragma solidity ^0.8.20;\ncontract Latest {}\n")
        .unwrap();
    assert_eq!(compiled.unit.version.as_ref(), &Version::new(0, 8, 20));
    assert_eq!(project.compiler().installs(), vec![Version::new(0, 8, 20)]);

    let err = project
        .project()
        .compile_source("Old", "pragma solidity =0.5.0;\ncontract Old {}\n")
        .unwrap_err();
    assert!(matches!(err, SolcError::UnsatisfiableVersion { .. }));
}

#[test]
fn flattens_a_target_with_its_imports() {
    init_tracing();
    let project = TempProject::mocked_compiler().unwrap();
    project
        .add_source(
            "A",
            "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.0;\nimport \"./B.sol\";\ncontract A is B {}\n",
        )
        .unwrap();
    project
        .add_source("B", "// SPDX-License-Identifier: MIT\npragma solidity >=0.8.0;\ncontract B {}\n")
        .unwrap();

    let flattened = project.flatten("A.sol").unwrap();
    assert_eq!(
        flattened,
        "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.0;\n\n// File: contracts/B.sol\n\ncontract B {}\n\n// File: contracts/A.sol\n\ncontract A is B {}\n"
    );

    project.add_source("C", "pragma solidity ^0.8.0;\nimport \"./Missing.sol\";\n").unwrap();
    assert!(project.flatten("C.sol").is_err());
    assert!(matches!(project.flatten("Missing.sol").unwrap_err(), SolcError::TargetNotFound(_)));
}
