//! Template resolution.
//!
//! The engine only needs to map a template identifier to a file on disk;
//! template authoring, import and deduplication live outside this crate.

use crate::error::EngineError;
use std::path::{Path, PathBuf};

/// Resolves template identifiers to filesystem paths.
pub trait TemplateStore: Send + Sync {
    /// Resolve a template id to the file backing it.
    fn resolve(&self, template_id: &str) -> Result<PathBuf, EngineError>;
}

/// Directory-backed template store.
///
/// A template id `foo` resolves to `<dir>/foo.yaml`; when that file does not
/// exist, the directory tree is scanned for a YAML file with a matching stem.
#[derive(Debug, Clone)]
pub struct DirTemplateStore {
    dir: PathBuf,
}

impl DirTemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory this store reads from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Enumerate available template ids (file stems), sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids = Vec::new();
        collect_yaml_stems(&self.dir, &mut ids);
        ids.sort();
        ids.dedup();
        ids
    }
}

impl TemplateStore for DirTemplateStore {
    fn resolve(&self, template_id: &str) -> Result<PathBuf, EngineError> {
        let direct = self.dir.join(format!("{}.yaml", template_id));
        if direct.is_file() {
            return Ok(direct);
        }
        if let Some(found) = find_by_stem(&self.dir, template_id) {
            return Ok(found);
        }
        Err(EngineError::TemplateNotFound(template_id.to_string()))
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn find_by_stem(dir: &Path, stem: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_by_stem(&path, stem) {
                return Some(found);
            }
        } else if is_yaml(&path) && path.file_stem().and_then(|s| s.to_str()) == Some(stem) {
            return Some(path);
        }
    }
    None
}

fn collect_yaml_stems(dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_yaml_stems(&path, out);
        } else if is_yaml(&path) {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                out.push(stem.to_string());
            }
        }
    }
}
