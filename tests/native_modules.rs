//! Real extension modules through libloading.
//!
//! The fixture crate under `tests/fixtures/extension` is built once per
//! behaviour feature; each resulting library is copied into a temp plugin
//! tree and loaded exactly the way an application would load it.

use kindling::host::StandaloneHost;
use kindling::plugins::error::{DiagnosticKind, LoadError};
use kindling::plugins::loader::{DynamicLibraryLoader, ModuleLoader};
use kindling::{ManagerState, PluginManager};
use once_cell::sync::OnceCell;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

const BEHAVIORS: &[&str] = &[
    "good",
    "panic-create",
    "panic-initialize",
    "panic-terminate",
    "no-entry",
    "wrong-abi",
    "legacy",
];

/// Directory holding `<behavior><DLL_SUFFIX>` for every fixture behaviour
fn built_modules() -> &'static Path {
    static MODULES: OnceCell<PathBuf> = OnceCell::new();
    MODULES.get_or_init(|| {
        let package = Path::new(env!("CARGO_MANIFEST_DIR"));
        let fixture = package.join("tests/fixtures/extension");
        let target = Path::new(env!("CARGO_TARGET_TMPDIR")).join("extension-fixture");
        let modules = target.join("modules");
        fs::create_dir_all(&modules).unwrap();

        // Resolve the fixture against the host's locked dependency versions
        let lock = package.join("Cargo.lock");
        if lock.exists() && !fixture.join("Cargo.lock").exists() {
            fs::copy(&lock, fixture.join("Cargo.lock")).unwrap();
        }

        for behavior in BEHAVIORS {
            let output = Command::new(env!("CARGO"))
                .arg("build")
                .arg("--manifest-path")
                .arg(fixture.join("Cargo.toml"))
                .arg("--target-dir")
                .arg(&target)
                .args(["--features", behavior])
                .output()
                .unwrap();
            assert!(
                output.status.success(),
                "building the {behavior} fixture failed:\n{}",
                String::from_utf8_lossy(&output.stderr)
            );

            let artifact = target
                .join("debug")
                .join(format!("{DLL_PREFIX}kindling_fixture_extension{DLL_SUFFIX}"));
            fs::copy(&artifact, modules.join(format!("{behavior}{DLL_SUFFIX}"))).unwrap();
        }
        modules
    })
}

/// Copy the `behavior` module into `root` as `<name><DLL_SUFFIX>`
fn install(root: &Path, behavior: &str, name: &str) -> PathBuf {
    let path = root.join(format!("{name}{DLL_SUFFIX}"));
    fs::copy(built_modules().join(format!("{behavior}{DLL_SUFFIX}")), &path).unwrap();
    path
}

fn manager_for(root: &Path) -> PluginManager {
    let mut manager = PluginManager::new();
    manager.initialize(Arc::new(
        StandaloneHost::new("native-tests", "1.0.0").with_plugin_dir(root),
    ));
    manager
}

fn journal(root: &Path) -> Vec<String> {
    fs::read_to_string(root.join("journal.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_native_module_loads_and_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let path = install(dir.path(), "good", "Clock");

    let mut manager = manager_for(dir.path());
    let report = manager.load_all(dir.path()).unwrap();

    assert_eq!(report.loaded, 1);
    assert!(!report.has_warnings());
    let record = manager.iter().next().unwrap();
    assert_eq!(record.path(), path);
    assert!(record.is_dynamic());
    assert_eq!(record.metadata().product_name, "Kindling Plugin");
    assert_eq!(record.metadata().product_version.as_deref(), Some("0.1.0"));

    manager.unload_all();
    assert_eq!(manager.state(), ManagerState::Ready);
    assert_eq!(journal(dir.path()), vec!["good initialize", "good terminate"]);
}

#[test]
fn test_native_panics_never_reach_the_host() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let create = install(root, "panic-create", "A_PanicCreate");
    let initialize = install(root, "panic-initialize", "B_PanicInitialize");
    install(root, "panic-terminate", "C_PanicTerminate");
    install(root, "good", "D_Good");

    let mut manager = manager_for(root);
    let report = manager.load_all(root).unwrap();

    assert_eq!(report.loaded, 2);
    assert_eq!(report.diagnostics.len(), 2);
    assert_eq!(report.diagnostics[0].path, create);
    assert_eq!(report.diagnostics[1].path, initialize);
    assert!(report
        .diagnostics
        .iter()
        .all(|d| d.kind == DiagnosticKind::IncompatibleGeneric));

    manager.unload_all();
    assert!(manager.is_empty());
    assert_eq!(
        journal(root),
        vec![
            "panic-initialize initialize",
            "panic-terminate initialize",
            "good initialize",
            "panic-terminate terminate",
            "good terminate",
        ]
    );
}

#[test]
fn test_native_abi_and_entry_failures() {
    let dir = tempfile::tempdir().unwrap();
    let wrong_abi = install(dir.path(), "wrong-abi", "Future");
    let no_entry = install(dir.path(), "no-entry", "Hollow");

    let loader = DynamicLibraryLoader::new();
    match loader.load(&wrong_abi).unwrap_err() {
        LoadError::IncompatibleFormat { reason, .. } => assert!(reason.contains("ABI"), "{reason}"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        loader.load(&no_entry).unwrap_err(),
        LoadError::InvalidExtensionType { .. }
    ));

    let mut manager = manager_for(dir.path());
    let report = manager.load_all(dir.path()).unwrap();
    assert!(manager.is_empty());
    assert_eq!(report.diagnostics.len(), 2);
    assert!(journal(dir.path()).is_empty());
}

#[test]
fn test_native_first_generation_module_is_legacy() {
    let dir = tempfile::tempdir().unwrap();
    let path = install(dir.path(), "legacy", "OldTimer");

    let mut manager = manager_for(dir.path());
    let report = manager.load_all(dir.path()).unwrap();

    assert!(manager.is_empty());
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].path, path);
    assert_eq!(report.diagnostics[0].kind, DiagnosticKind::IncompatibleLegacy);
}
