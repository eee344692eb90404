//! Import path resolution for `adan/...` stdlib imports (spec §6).

mod loaderror;

pub use loaderror::LoadError;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

const STDLIB_PREFIX: &str = "adan/";

/// Resolves `adan/<rel>` import paths to on-disk `.adn` source files, consulting the
/// `-I` search path list (in order, first hit wins) and `ADAN_PACKAGE_PATH`.
#[derive(Debug, Clone)]
pub struct ImportResolver {
    compilation_root: PathBuf,
    search_paths: Vec<PathBuf>,
    resolved: HashSet<PathBuf>,
}

impl ImportResolver {
    pub fn new(compilation_root: PathBuf, include: Vec<PathBuf>) -> Self {
        let mut search_paths = Vec::new();

        if let Ok(package_path) = std::env::var("ADAN_PACKAGE_PATH") {
            for entry in std::env::split_paths(&package_path) {
                push_deduped(&mut search_paths, entry);
            }
        }
        for path in include {
            push_deduped(&mut search_paths, path);
        }
        // the compilation root itself is always consulted last.
        push_deduped(&mut search_paths, compilation_root.clone());

        Self {
            compilation_root,
            search_paths,
            resolved: HashSet::new(),
        }
    }

    /// Strip optional surrounding quotes and whitespace from a raw import path literal.
    pub fn normalize(path: &str) -> String {
        path.trim().trim_matches('"').to_string()
    }

    fn stdlib_relative_file(rel: &str) -> PathBuf {
        let rel_path = Path::new(rel);
        let basename = rel_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| rel.to_string());
        let subpath = rel_path.parent().filter(|p| !p.as_os_str().is_empty());

        let mut out = PathBuf::from("libs");
        if let Some(subpath) = subpath {
            out.push(subpath);
        }
        out.push(format!("{basename}.adn"));
        out
    }

    /// Resolve a normalized import path to an absolute file path. Only `adan/`-prefixed
    /// paths are resolvable by this loader; anything else is a direct relative path from
    /// the compilation root (spec §1 scopes multi-file translation units to import
    /// resolution only, not a general module system).
    pub fn resolve(&mut self, import_path: &str) -> Result<PathBuf, LoadError> {
        let normalized = Self::normalize(import_path);

        let candidate_rel = if let Some(rel) = normalized.strip_prefix(STDLIB_PREFIX) {
            Self::stdlib_relative_file(rel)
        } else {
            PathBuf::from(&normalized)
        };

        for base in &self.search_paths {
            let candidate = base.join(&candidate_rel);
            if candidate.is_file() {
                let canonical = candidate.canonicalize().map_err(|e| LoadError::Io {
                    path: candidate.clone(),
                    message: e.to_string(),
                })?;
                self.resolved.insert(canonical.clone());
                return Ok(canonical);
            }
        }

        Err(LoadError::NotFound {
            path: normalized,
            searched: self.search_paths.clone(),
        })
    }

    /// Whether this exact resolved path has already been loaded (import idempotence,
    /// spec §8).
    pub fn already_resolved(&self, path: &Path) -> bool {
        self.resolved.contains(path)
    }

    pub fn compilation_root(&self) -> &Path {
        &self.compilation_root
    }
}

fn push_deduped(paths: &mut Vec<PathBuf>, candidate: PathBuf) {
    let canonical = candidate.canonicalize().unwrap_or(candidate);
    if !paths.contains(&canonical) {
        paths.push(canonical);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdlib_single_component_maps_under_libs() {
        let rel = ImportResolver::stdlib_relative_file("io");
        assert_eq!(rel, PathBuf::from("libs/io.adn"));
    }

    #[test]
    fn stdlib_nested_component_keeps_subdirectory() {
        let rel = ImportResolver::stdlib_relative_file("collections/list");
        assert_eq!(rel, PathBuf::from("libs/collections/list.adn"));
    }

    #[test]
    fn normalize_strips_quotes() {
        assert_eq!(ImportResolver::normalize("\"adan/io\""), "adan/io");
    }
}
