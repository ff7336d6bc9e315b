//! Metadata tree loading and inheritance
//!
//! A tree is a directory hierarchy of YAML files. Each file contributes a
//! node; nodes inherit data from their parent directories. Inheritance is
//! resolved eagerly at load time: the merged node is the fact, there is no
//! dynamic parent lookup afterwards.

use crate::data::{self, merge_data};
use crate::error::{CrucibleResult, TreeError};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

/// File extensions recognized as tree nodes.
const NODE_EXTENSIONS: &[&str] = &["fmf", "yaml", "yml"];

/// File stem that contributes to the directory's own node rather than a
/// child node.
const MAIN_STEM: &str = "main";

/// A loaded metadata tree with inheritance fully resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    nodes: BTreeMap<String, Mapping>,
}

impl Tree {
    /// Load a tree from a directory hierarchy.
    ///
    /// `main.fmf` (or `main.yaml`) contributes to the directory's own
    /// node; any other recognized file contributes a child node named
    /// after its stem. Keys beginning with `/` denote virtual child nodes.
    pub fn load(root: &Path) -> CrucibleResult<Self> {
        let mut own: BTreeMap<String, Mapping> = BTreeMap::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|err| TreeError::Unreadable {
                path: root.display().to_string(),
                reason: err.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let recognized = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| NODE_EXTENSIONS.contains(&ext));
            if !recognized {
                continue;
            }
            let node_path = node_path_for(root, path);
            let text = std::fs::read_to_string(path).map_err(|err| TreeError::Unreadable {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;
            let mapping = parse_node(&text, path)?;
            collect_node(&mut own, node_path, mapping);
        }
        Self::resolve(own)
    }

    /// Build a tree from in-memory `(path, data)` pairs, applying the same
    /// inheritance resolution as [`Tree::load`].
    pub fn from_nodes<I>(nodes: I) -> CrucibleResult<Self>
    where
        I: IntoIterator<Item = (String, Mapping)>,
    {
        let mut own: BTreeMap<String, Mapping> = BTreeMap::new();
        for (path, mapping) in nodes {
            collect_node(&mut own, normalize_path(&path), mapping);
        }
        Self::resolve(own)
    }

    fn resolve(own: BTreeMap<String, Mapping>) -> CrucibleResult<Self> {
        let mut nodes: BTreeMap<String, Mapping> = BTreeMap::new();
        // Ascending path order guarantees ancestors resolve first.
        for (path, data) in own {
            let inherited = nearest_ancestor(&nodes, &path)
                .cloned()
                .unwrap_or_default();
            let merged = merge_data(&data, &inherited)?;
            nodes.insert(path, merged);
        }
        Ok(Self { nodes })
    }

    /// Node data by identifier path.
    pub fn get(&self, path: &str) -> Option<&Mapping> {
        self.nodes.get(&normalize_path(path))
    }

    /// All node paths in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// `(path, data)` pairs in ascending path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Mapping)> {
        self.nodes.iter().map(|(path, data)| (path.as_str(), data))
    }

    /// Nodes without children: the tree's tests/plans/stories.
    pub fn leaves(&self) -> impl Iterator<Item = (&str, &Mapping)> {
        self.nodes.iter().filter_map(|(path, data)| {
            let prefix = format!("{path}/");
            let has_child = self
                .nodes
                .range(prefix.clone()..)
                .next()
                .is_some_and(|(next, _)| next.starts_with(&prefix));
            (!has_child).then_some((path.as_str(), data))
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn parse_node(text: &str, path: &Path) -> CrucibleResult<Mapping> {
    if text.trim().is_empty() {
        return Ok(Mapping::new());
    }
    let value: Value = serde_yaml::from_str(text).map_err(|err| TreeError::Unparsable {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    match value {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(TreeError::NotAMapping {
            path: path.display().to_string(),
        }
        .into()),
    }
}

/// Split virtual child nodes (keys starting with `/`) out of a node's data
/// and register everything under `own`.
fn collect_node(own: &mut BTreeMap<String, Mapping>, path: String, mapping: Mapping) {
    let mut local = Mapping::new();
    for (key, value) in mapping {
        let child = key
            .as_str()
            .filter(|name| name.starts_with('/'))
            .map(str::to_owned);
        match (child, value) {
            (Some(name), Value::Mapping(data)) => {
                let child_path = if path == "/" {
                    name
                } else {
                    format!("{path}{name}")
                };
                collect_node(own, child_path, data);
            }
            (_, value) => {
                local.insert(key, value);
            }
        }
    }
    match own.get_mut(&path) {
        // Two files contributing to one node (e.g. main.fmf plus virtual
        // children elsewhere); later data wins key-by-key.
        Some(existing) => {
            for (key, value) in local {
                existing.insert(key, value);
            }
        }
        None => {
            own.insert(path, local);
        }
    }
}

fn node_path_for(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let mut segments: Vec<String> = relative
        .parent()
        .map(|dir| {
            dir.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem != MAIN_STEM {
        segments.push(stem);
    }
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// The closest already-resolved ancestor of `path`, if any.
fn nearest_ancestor<'a>(
    nodes: &'a BTreeMap<String, Mapping>,
    path: &str,
) -> Option<&'a Mapping> {
    let mut current = path;
    while let Some(pos) = current.rfind('/') {
        let parent = if pos == 0 { "/" } else { &current[..pos] };
        if let Some(data) = nodes.get(parent) {
            return Some(data);
        }
        if parent == "/" {
            break;
        }
        current = parent;
    }
    None
}
