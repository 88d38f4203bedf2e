//! Transient media files scoped to a processing turn.
//!
//! The store maps `media://` refs to local files that already exist on
//! disk; it never copies or moves them, but once registered it is the sole
//! authority for deleting them via scope release. Both maps live under one
//! mutex so a ref is always either fully present or fully gone.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::MediaError;

/// Metadata about a stored media file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaMeta {
    pub filename: String,
    pub content_type: String,
    /// Origin tag: "telegram", "discord", "tool:image-gen", etc.
    pub source: String,
}

/// Outcome of a scope release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Entries removed from the store (files deleted or already absent).
    pub released: usize,
    /// Files whose deletion failed for a reason other than absence.
    pub failed: usize,
}

#[derive(Debug, Clone)]
struct MediaEntry {
    path: PathBuf,
    meta: MediaMeta,
}

#[derive(Default)]
struct Maps {
    refs: HashMap<String, MediaEntry>,
    scope_refs: HashMap<String, HashSet<String>>,
}

/// In-memory media store keyed by opaque `media://` refs, grouped by scope.
///
/// Construct once and share by `Arc`; all operations are fast critical
/// sections under a single lock.
#[derive(Default)]
pub struct MediaStore {
    maps: Mutex<Maps>,
}

impl MediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing local file under `scope` and mint a ref for it.
    ///
    /// Fails if the file does not exist at call time. The file itself is
    /// left in place untouched.
    pub fn store(
        &self,
        local_path: impl AsRef<Path>,
        meta: MediaMeta,
        scope: &str,
    ) -> Result<String, MediaError> {
        let path = local_path.as_ref();
        if let Err(source) = std::fs::metadata(path) {
            return Err(MediaError::FileNotFound {
                path: path.to_path_buf(),
                source,
            });
        }

        let reference = format!("media://{}", uuid::Uuid::new_v4());

        let mut maps = self.maps.lock().unwrap_or_else(|e| e.into_inner());
        maps.refs.insert(
            reference.clone(),
            MediaEntry {
                path: path.to_path_buf(),
                meta,
            },
        );
        maps.scope_refs
            .entry(scope.to_string())
            .or_default()
            .insert(reference.clone());

        Ok(reference)
    }

    /// Look up the local path for a ref.
    pub fn resolve(&self, reference: &str) -> Result<PathBuf, MediaError> {
        let maps = self.maps.lock().unwrap_or_else(|e| e.into_inner());
        maps.refs
            .get(reference)
            .map(|entry| entry.path.clone())
            .ok_or_else(|| MediaError::UnknownRef {
                reference: reference.to_string(),
            })
    }

    /// Look up the local path and metadata for a ref.
    pub fn resolve_with_meta(&self, reference: &str) -> Result<(PathBuf, MediaMeta), MediaError> {
        let maps = self.maps.lock().unwrap_or_else(|e| e.into_inner());
        maps.refs
            .get(reference)
            .map(|entry| (entry.path.clone(), entry.meta.clone()))
            .ok_or_else(|| MediaError::UnknownRef {
                reference: reference.to_string(),
            })
    }

    /// Delete every file registered under `scope` and drop its entries.
    ///
    /// Best-effort: a file that is already gone counts as released, any
    /// other deletion error is logged and counted but never aborts the
    /// sweep. Unknown or already-released scopes yield an empty report.
    pub fn release_all(&self, scope: &str) -> ReleaseReport {
        let mut maps = self.maps.lock().unwrap_or_else(|e| e.into_inner());
        let Some(refs) = maps.scope_refs.remove(scope) else {
            return ReleaseReport::default();
        };

        let mut report = ReleaseReport::default();
        for reference in refs {
            let Some(entry) = maps.refs.remove(&reference) else {
                continue;
            };
            match std::fs::remove_file(&entry.path) {
                Ok(()) => report.released += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.released += 1,
                Err(e) => {
                    tracing::warn!(
                        scope,
                        path = %entry.path.display(),
                        error = %e,
                        "failed to delete released media file"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Count of refs present in one map but not the other. Always zero
    /// outside an in-progress mutation.
    #[cfg(test)]
    fn orphaned_links(&self) -> usize {
        let maps = self.maps.lock().unwrap_or_else(|e| e.into_inner());
        let scoped: HashSet<&String> = maps.scope_refs.values().flatten().collect();
        let flat: HashSet<&String> = maps.refs.keys().collect();
        scoped.symmetric_difference(&flat).count()
    }
}
