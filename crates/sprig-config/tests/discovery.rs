//! Tests for config file discovery and loading

use sprig_config::{ConfigDiscovery, SplitPolicyKind};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn discovers_sprig_toml() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("sprig.toml"),
        r#"
[bundle]
output_dir = "build"
inline_exports = false

[bundle.entries]
main = "src/main.js"
admin = "src/admin.js"

[bundle.split_chunks]
policy = "share-common-modules"
min_chunks = 3

[cache]
dir = ".sprig-cache"
"#,
    )
    .unwrap();

    let discovery = ConfigDiscovery::new(dir.path());
    let found = discovery.find().unwrap();
    assert_eq!(found.file_name().unwrap(), "sprig.toml");

    let config = discovery.load().unwrap();
    let names: Vec<_> = config.bundle.entries.keys().map(String::as_str).collect();
    assert_eq!(names, ["main", "admin"]);
    assert_eq!(config.bundle.output_dir, PathBuf::from("build"));
    assert!(config.bundle.tree_shake);
    assert!(!config.bundle.inline_exports);
    assert_eq!(config.bundle.split_chunks.policy, SplitPolicyKind::ShareCommonModules);
    assert_eq!(config.cache.dir, Some(PathBuf::from(".sprig-cache")));
}

#[test]
fn discovers_package_json() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("package.json"),
        r#"{
  "name": "test",
  "sprig": {
    "bundle": {
      "entries": { "index": "index.js" },
      "tree_shake": false
    }
  }
}"#,
    )
    .unwrap();

    let discovery = ConfigDiscovery::new(dir.path());
    let found = discovery.find().unwrap();
    assert_eq!(found.file_name().unwrap(), "package.json");

    let config = discovery.load().unwrap();
    assert_eq!(config.bundle.entries["index"], PathBuf::from("index.js"));
    assert!(!config.bundle.tree_shake);
}

#[test]
fn toml_takes_precedence_over_package_json() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("sprig.toml"),
        "[bundle.entries]\nmain = \"from-toml.js\"\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("package.json"),
        r#"{ "sprig": { "bundle": { "entries": { "main": "from-package.js" } } } }"#,
    )
    .unwrap();

    let config = ConfigDiscovery::new(dir.path()).load().unwrap();
    assert_eq!(config.bundle.entries["main"], PathBuf::from("from-toml.js"));
}

#[test]
fn null_package_field_is_not_a_config() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("package.json"), r#"{ "sprig": null }"#).unwrap();
    assert!(ConfigDiscovery::new(dir.path()).find().is_none());
}
