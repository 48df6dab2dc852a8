//! Local content tree discovery
//!
//! Only the designated content subdirectory is ever published. Pointing the
//! release at the repository root would ship build metadata and control files.

use crate::error::{ReleaseError, Result};
use crate::models::ContentObject;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Dot-directories at the top of the content root that are published (RFC 8615)
const PUBLISHED_DOT_DIRS: &[&str] = &[".well-known"];

/// A validated content directory strictly inside the repository root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRoot {
    path: PathBuf,
}

impl ContentRoot {
    /// Resolve `content_dir` relative to `repo_root`
    ///
    /// Rejects absolute paths, `..` components, the repository root itself and
    /// anything that resolves outside it through a symlink.
    pub fn resolve(repo_root: &Path, content_dir: &Path) -> Result<Self> {
        if content_dir.as_os_str().is_empty() {
            return Err(ReleaseError::Configuration(
                "content directory must not be empty".to_string(),
            ));
        }

        let mut depth = 0usize;
        for component in content_dir.components() {
            match component {
                Component::Normal(_) => depth += 1,
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(ReleaseError::Configuration(format!(
                        "content directory {} must not contain '..'",
                        content_dir.display()
                    )))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ReleaseError::Configuration(format!(
                        "content directory {} must be relative to the repository root",
                        content_dir.display()
                    )))
                }
            }
        }
        if depth == 0 {
            return Err(ReleaseError::Configuration(
                "content directory must be a subdirectory, not the repository root".to_string(),
            ));
        }

        let repo = repo_root.canonicalize().map_err(|e| {
            ReleaseError::Configuration(format!(
                "repository root {} is not accessible: {}",
                repo_root.display(),
                e
            ))
        })?;
        let path = repo.join(content_dir).canonicalize().map_err(|e| {
            ReleaseError::Configuration(format!(
                "content directory {} does not exist: {}",
                content_dir.display(),
                e
            ))
        })?;

        if !path.is_dir() {
            return Err(ReleaseError::Configuration(format!(
                "content directory {} is not a directory",
                path.display()
            )));
        }
        if path == repo || !path.starts_with(&repo) {
            return Err(ReleaseError::Configuration(format!(
                "content directory {} resolves outside the repository subtree",
                content_dir.display()
            )));
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every publishable file under the root
    ///
    /// Hidden entries (dot-files and dot-directories) and symlinks are skipped,
    /// except a top-level `.well-known/` directory.
    /// Keys use `/` separators regardless of platform. An empty tree is a
    /// configuration error: mirroring it would delete the whole site.
    pub fn scan(&self) -> Result<Vec<ContentObject>> {
        let mut objects = Vec::new();

        let walker = WalkDir::new(&self.path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

        for entry in walker {
            let entry = entry.map_err(|e| {
                ReleaseError::Configuration(format!("failed to walk content directory: {}", e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let key = object_key(&self.path, entry.path())?;
            let body = std::fs::read(entry.path()).map_err(|e| {
                ReleaseError::Configuration(format!(
                    "failed to read {}: {}",
                    entry.path().display(),
                    e
                ))
            })?;
            objects.push(ContentObject::new(key, body));
        }

        if objects.is_empty() {
            return Err(ReleaseError::Configuration(format!(
                "content directory {} contains no publishable files",
                self.path.display()
            )));
        }

        tracing::debug!(root = %self.path.display(), files = objects.len(), "Scanned content tree");
        Ok(objects)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    let name = match entry.file_name().to_str() {
        Some(name) => name,
        None => return false,
    };
    if !name.starts_with('.') {
        return false;
    }

    let allowed = entry.depth() == 1
        && entry.file_type().is_dir()
        && PUBLISHED_DOT_DIRS.contains(&name);
    !allowed
}

fn object_key(root: &Path, file: &Path) -> Result<String> {
    let relative = file.strip_prefix(root).map_err(|_| {
        ReleaseError::Configuration(format!(
            "{} is outside the content directory",
            file.display()
        ))
    })?;

    let segments = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| {
            ReleaseError::Configuration(format!(
                "{} is not valid UTF-8 and cannot be published",
                relative.display()
            ))
        })?;

    Ok(segments.join("/"))
}
