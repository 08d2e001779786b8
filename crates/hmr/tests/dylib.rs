//! Loading real dynamic libraries through `DylibLoader`.
//!
//! Fixtures are compiled with `rustc` into a temporary directory. Each one
//! exports the greeter pair (`default`, `named_export`) plus `version`, so a
//! test can tell which build a handle came from.

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use hmr::{
    CacheToken, Dylib, DylibLoader, FailureKind, Hmr, HmrOptions, LoadError, ManualWatcher,
    ModuleHandle, ModuleLoader, PathResolver, RunOutcome, SilentNotifier,
};
use parking_lot::Mutex;
use tempfile::TempDir;

type Export = extern "C" fn(i32, i32) -> i32;
type Version = extern "C" fn() -> u32;

fn library_name(stem: &str) -> String {
    format!("{DLL_PREFIX}{stem}{DLL_SUFFIX}")
}

/// Compile a fixture library reporting `version` and return its path.
fn build_fixture(dir: &Path, version: u32) -> PathBuf {
    let build = dir.join("build");
    fs::create_dir_all(&build).unwrap();

    let source = build.join(format!("fixture_v{version}.rs"));
    fs::write(
        &source,
        format!(
            r#"
#[unsafe(no_mangle)]
pub extern "C" fn default(a: i32, b: i32) -> i32 {{ a + b }}

#[unsafe(no_mangle)]
pub extern "C" fn named_export(a: i32, b: i32) -> i32 {{ a * b }}

#[unsafe(no_mangle)]
pub extern "C" fn version() -> u32 {{ {version} }}
"#
        ),
    )
    .unwrap();

    let output = build.join(library_name(&format!("fixture_v{version}")));
    let rustc = std::env::var_os("RUSTC").unwrap_or_else(|| OsString::from("rustc"));
    let status = Command::new(rustc)
        .args(["--crate-type", "cdylib", "--edition", "2024", "-C", "opt-level=0", "-o"])
        .arg(&output)
        .arg(&source)
        .status()
        .expect("rustc should be available to build fixtures");
    assert!(status.success(), "fixture v{version} failed to compile");
    output
}

/// Put fixture `build` in place as the watched library.
fn install(build: &Path, dir: &Path) -> PathBuf {
    let target = dir.join(library_name("module"));
    fs::copy(build, &target).unwrap();
    target
}

fn address(token: u64) -> String {
    format!("./{}?reload={token}", library_name("module"))
}

fn loader(dir: &Path) -> DylibLoader {
    DylibLoader::new(PathResolver::new(dir), dir.join("shadow"))
}

fn version_of(module: &Dylib) -> u32 {
    // SAFETY: fixtures export `version` as `extern "C" fn() -> u32`
    let version = unsafe { module.get::<Version>("version").unwrap() };
    version()
}

#[tokio::test]
async fn test_loads_both_exports() {
    let dir = TempDir::new().unwrap();
    install(&build_fixture(dir.path(), 1), dir.path());
    let loader = loader(dir.path()).require(["default", "named_export"]);

    let module = loader.load(&address(0)).await.unwrap();

    // SAFETY: both exports are `extern "C" fn(i32, i32) -> i32`
    let default = unsafe { module.get::<Export>("default").unwrap() };
    let named_export = unsafe { module.get::<Export>("named_export").unwrap() };
    assert_eq!(default(2, 3), 5);
    assert_eq!(named_export(2, 3), 6);
    assert_eq!(module.token(), Some(CacheToken::new(0)));
    assert_eq!(module.source(), dir.path().join(library_name("module")));

    #[cfg(unix)]
    assert_eq!(fs::read_dir(dir.path().join("shadow")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_missing_export_is_rejected() {
    let dir = TempDir::new().unwrap();
    install(&build_fixture(dir.path(), 1), dir.path());
    let loader = loader(dir.path()).require(["default", "teardown"]);

    let err = loader.load(&address(0)).await.unwrap_err();
    match err {
        LoadError::MissingExport { symbol } => assert_eq!(symbol, "teardown"),
        other => panic!("expected MissingExport, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unchanged_library_loads_as_a_distinct_instance() {
    let dir = TempDir::new().unwrap();
    install(&build_fixture(dir.path(), 1), dir.path());
    let loader = loader(dir.path());

    let first = loader.load(&address(0)).await.unwrap();
    let second = loader.load(&address(1)).await.unwrap();

    // SAFETY: fixtures export `version` as `extern "C" fn() -> u32`
    let (a, b) = unsafe {
        (
            *first.get::<Version>("version").unwrap(),
            *second.get::<Version>("version").unwrap(),
        )
    };
    assert_ne!(a as usize, b as usize, "second load reused the first mapping");
    assert_eq!(version_of(&first), 1);
    assert_eq!(version_of(&second), 1);
}

#[tokio::test]
async fn test_rebuilt_library_is_picked_up() {
    let dir = TempDir::new().unwrap();
    let v1 = build_fixture(dir.path(), 1);
    let v2 = build_fixture(dir.path(), 2);
    install(&v1, dir.path());
    let loader = loader(dir.path());

    let before = loader.load(&address(0)).await.unwrap();
    install(&v2, dir.path());
    let after = loader.load(&address(1)).await.unwrap();

    assert_eq!(version_of(&before), 1);
    assert_eq!(version_of(&after), 2);
}

#[tokio::test]
async fn test_second_loader_sharing_shadow_dir_sees_rebuilt_code() {
    let dir = TempDir::new().unwrap();
    let v1 = build_fixture(dir.path(), 1);
    let v2 = build_fixture(dir.path(), 2);
    install(&v1, dir.path());

    // Both sessions start their token streams at 0.
    let first_session = loader(dir.path()).load(&address(0)).await.unwrap();
    install(&v2, dir.path());
    let second_session = loader(dir.path()).load(&address(0)).await.unwrap();

    assert_eq!(version_of(&first_session), 1);
    assert_eq!(version_of(&second_session), 2);
}

#[tokio::test]
async fn test_same_file_name_in_two_directories() {
    let dir = TempDir::new().unwrap();
    let plugin_a = dir.path().join("a");
    let plugin_b = dir.path().join("b");
    fs::create_dir_all(&plugin_a).unwrap();
    fs::create_dir_all(&plugin_b).unwrap();
    install(&build_fixture(dir.path(), 1), &plugin_a);
    install(&build_fixture(dir.path(), 2), &plugin_b);

    let shadow = dir.path().join("shadow");
    let a = DylibLoader::new(PathResolver::new(&plugin_a), &shadow)
        .load(&address(0))
        .await
        .unwrap();
    let b = DylibLoader::new(PathResolver::new(&plugin_b), &shadow)
        .load(&address(0))
        .await
        .unwrap();

    assert_eq!(version_of(&a), 1);
    assert_eq!(version_of(&b), 2);
}

#[tokio::test]
async fn test_session_reloads_real_library() {
    let dir = TempDir::new().unwrap();
    let v1 = build_fixture(dir.path(), 1);
    let v2 = build_fixture(dir.path(), 2);
    let installed = install(&v1, dir.path());

    let (watcher, trigger) = ManualWatcher::new();
    // One reload after a rebuild, one with unchanged contents.
    trigger.trigger();
    trigger.trigger();
    drop(trigger);

    let options = HmrOptions {
        shadow_dir: Some(dir.path().join("shadow")),
        ..HmrOptions::default()
    };
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let report = Hmr::with_options(format!("./{}", library_name("module")), options)
        .base_dir(dir.path())
        .caller(dir.path().join("main.rs"))
        .watcher(watcher)
        .notifier(SilentNotifier)
        .run(move |module: ModuleHandle<Dylib>| {
            // SAFETY: both exports are `extern "C" fn(i32, i32) -> i32`
            let default = unsafe { module.get::<Export>("default")? };
            sink.lock().push((module.token().get(), version_of(&module), default(2, 3)));
            if module.token().get() == 0 {
                fs::copy(&v2, &installed)?;
            }
            Ok(())
        })
        .await;

    assert!(matches!(report.outcome, RunOutcome::WatchEnded), "{:?}", report.outcome);
    assert_eq!(report.failures, Vec::<FailureKind>::new());
    assert_eq!(*seen.lock(), vec![(0, 1, 5), (1, 2, 5), (2, 2, 5)]);
}
