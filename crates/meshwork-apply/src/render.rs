//! Manifest directory rendering
//!
//! A manifest directory holds multi-document YAML files plus an optional
//! `data.env` substitution file. Files render in sorted name order so the
//! apply order is deterministic and authors can prefix-number files that
//! must precede others. Subdirectories model nested scopes: they render
//! after the parent's own files, also in sorted order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use meshwork_common::template::{parse_data_file, substitute};
use meshwork_common::yaml::parse_yaml_multi;
use meshwork_common::{Error, Result};

use crate::ManifestObject;

/// Name of the optional per-directory substitution data file
pub const DATA_FILE: &str = "data.env";

fn is_manifest(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| Error::internal("render", format!("read {}: {e}", dir.display())))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Render the manifest files directly in `dir`, without descending.
///
/// Substitutions come from `data.env` in the same directory when present,
/// extended by `extra` (which wins on key collisions).
pub fn render_files(dir: &Path, extra: &BTreeMap<String, String>) -> Result<Vec<ManifestObject>> {
    let mut data = BTreeMap::new();
    let data_path = dir.join(DATA_FILE);
    if data_path.is_file() {
        let contents = std::fs::read_to_string(&data_path)
            .map_err(|e| Error::internal("render", format!("read {}: {e}", data_path.display())))?;
        data = parse_data_file(&contents);
    }
    data.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut objects = Vec::new();
    for path in read_dir_sorted(dir)? {
        if !path.is_file() || !is_manifest(&path) {
            continue;
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| Error::internal("render", format!("read {}: {e}", path.display())))?;
        let rendered = substitute(&raw, &data);
        for document in parse_yaml_multi(&rendered)? {
            objects.push(ManifestObject::from_value(document).map_err(|e| {
                Error::serialization(format!("{}: {e}", path.display()))
            })?);
        }
    }
    debug!(dir = %dir.display(), objects = objects.len(), "rendered manifest files");
    Ok(objects)
}

/// Render a manifest directory recursively: the directory's own files
/// first, then each subdirectory in sorted order.
pub fn render_directory(dir: &Path) -> Result<Vec<ManifestObject>> {
    render_directory_with(dir, &BTreeMap::new())
}

/// [`render_directory`] with caller-supplied substitution data.
pub fn render_directory_with(
    dir: &Path,
    extra: &BTreeMap<String, String>,
) -> Result<Vec<ManifestObject>> {
    let mut objects = render_files(dir, extra)?;
    for child in child_directories(dir)? {
        objects.extend(render_directory_with(&child, extra)?);
    }
    Ok(objects)
}

/// Immediate subdirectories of `dir`, in sorted order.
///
/// Used by callers that gate each nested scope on the parent converging
/// before descending.
pub fn child_directories(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(read_dir_sorted(dir)?
        .into_iter()
        .filter(|p| p.is_dir())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn renders_files_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "20-config.yaml",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n",
        );
        write(
            dir.path(),
            "10-namespace.yaml",
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: demo\n",
        );

        let objects = render_files(dir.path(), &BTreeMap::new()).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].gvk.kind, "Namespace");
        assert_eq!(objects[1].gvk.kind, "ConfigMap");
    }

    #[test]
    fn multi_document_files_expand_in_place() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "all.yaml",
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: a\n---\napiVersion: v1\nkind: Namespace\nmetadata:\n  name: b\n",
        );

        let objects = render_files(dir.path(), &BTreeMap::new()).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].name, "a");
        assert_eq!(objects[1].name, "b");
    }

    #[test]
    fn data_file_substitutes_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), DATA_FILE, "tenant=acme\n");
        write(
            dir.path(),
            "ns.yaml",
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: ${tenant}\n",
        );

        let objects = render_files(dir.path(), &BTreeMap::new()).unwrap();
        assert_eq!(objects[0].name, "acme");
    }

    #[test]
    fn extra_data_overrides_the_data_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), DATA_FILE, "tenant=acme\n");
        write(
            dir.path(),
            "ns.yaml",
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: ${tenant}\n",
        );

        let extra = BTreeMap::from([("tenant".to_string(), "globex".to_string())]);
        let objects = render_files(dir.path(), &extra).unwrap();
        assert_eq!(objects[0].name, "globex");
    }

    #[test]
    fn non_manifest_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README.md", "# notes\n");
        write(
            dir.path(),
            "ns.yaml",
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: demo\n",
        );

        let objects = render_files(dir.path(), &BTreeMap::new()).unwrap();
        assert_eq!(objects.len(), 1);
    }

    #[test]
    fn recursion_renders_parent_before_children() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "parent.yaml",
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: parent\n",
        );
        let child = dir.path().join("child-a");
        fs::create_dir(&child).unwrap();
        write(
            &child,
            "child.yaml",
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: child\n",
        );

        let objects = render_directory(dir.path()).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].name, "parent");
        assert_eq!(objects[1].name, "child");
    }

    #[test]
    fn child_directories_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("b-scope")).unwrap();
        fs::create_dir(dir.path().join("a-scope")).unwrap();

        let children = child_directories(dir.path()).unwrap();
        let names: Vec<_> = children
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a-scope", "b-scope"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(render_files(Path::new("/nonexistent/manifests"), &BTreeMap::new()).is_err());
    }
}
