//! Ensures all workspace crates use `version.workspace = true` and that
//! the workspace version is consistent across all Cargo.toml files.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .expect("crate lives two levels below the workspace root")
        .to_path_buf()
}

fn read_toml(path: &Path) -> toml::Value {
    let text = std::fs::read_to_string(path).unwrap();
    text.parse().unwrap()
}

/// Read the workspace version from the root Cargo.toml.
fn workspace_version() -> String {
    let doc = read_toml(&workspace_root().join("Cargo.toml"));
    doc["workspace"]["package"]["version"]
        .as_str()
        .unwrap()
        .to_string()
}

fn members() -> Vec<String> {
    let doc = read_toml(&workspace_root().join("Cargo.toml"));
    doc["workspace"]["members"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m.as_str().map(str::to_string))
        .collect()
}

#[test]
fn all_crates_use_workspace_version() {
    let members = members();
    assert!(members.iter().any(|m| m == "crates/curricula-core"));
    assert!(members.iter().any(|m| m == "crates/curricula-cli"));

    for krate in &members {
        let doc = read_toml(&workspace_root().join(krate).join("Cargo.toml"));
        let inherits = doc["package"]["version"]
            .get("workspace")
            .and_then(toml::Value::as_bool)
            == Some(true);
        assert!(inherits, "{krate} should use version.workspace = true");
    }
}

#[test]
fn workspace_version_matches_cargo_pkg() {
    let ws_version = workspace_version();
    let pkg_version = env!("CARGO_PKG_VERSION");
    assert_eq!(
        ws_version, pkg_version,
        "workspace version ({}) != CARGO_PKG_VERSION ({})",
        ws_version, pkg_version
    );
    assert_eq!(curricula_core::VERSION, pkg_version);
}
