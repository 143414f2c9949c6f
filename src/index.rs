// ─────────────────────────────────────────────────────────────────────────────
//  tsuki-discover :: index  —  header name → providing libraries
//
//  Built once per run from the configured library roots, read-only after.
//  Candidate order for an ambiguous header is a total order:
//
//    1. library name equals the header stem (case-insensitive)
//    2. earlier configured root folder
//    3. explicit architecture match before `architectures=*`
//    4. library folder path, lexically
//
//  Libraries whose `architectures=` excludes the target are never returned.
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::depfile;
use crate::library::{ArchMatch, Library, LibraryId};

#[derive(Debug, Default)]
pub struct LibraryIndex {
    /// Sorted by (root priority, folder path); never by enumeration order.
    libraries: Vec<Library>,
    by_header: HashMap<String, Vec<usize>>,
    /// Headers owned by the platform core, never indexed.
    platform_headers: BTreeSet<String>,
}

impl LibraryIndex {
    /// Scan every root in order; each sub-directory is one library.
    /// Relative roots are taken from the working directory. Missing roots and
    /// unreadable libraries are logged and skipped.
    pub fn scan(roots: &[PathBuf], platform_headers: &BTreeSet<String>) -> LibraryIndex {
        let mut seen_roots = HashSet::new();
        let mut libraries = Vec::new();

        for (priority, root) in roots.iter().enumerate() {
            let root = depfile::absolute(root).unwrap_or_else(|_| root.clone());
            if !seen_roots.insert(root.clone()) {
                continue;
            }
            let dirs = match library_dirs(&root) {
                Ok(d) => d,
                Err(e) => {
                    warn!("skipping library folder {}: {}", root.display(), e);
                    continue;
                }
            };

            let found: Vec<Library> = dirs
                .par_iter()
                .filter_map(|dir| match Library::load(dir, priority) {
                    Ok(lib) => Some(lib),
                    Err(e) => {
                        warn!("skipping library {}: {}", dir.display(), e);
                        None
                    }
                })
                .collect();

            debug!("{} libraries in {}", found.len(), root.display());
            libraries.extend(found);
        }

        Self::from_libraries(libraries, platform_headers)
    }

    /// Build from already-loaded libraries. Input order does not matter.
    pub fn from_libraries(mut libraries: Vec<Library>, platform_headers: &BTreeSet<String>) -> LibraryIndex {
        libraries.sort_by(|a, b| {
            a.root_priority.cmp(&b.root_priority).then_with(|| a.folder.cmp(&b.folder))
        });
        let mut ids = HashSet::new();
        libraries.retain(|l| ids.insert(l.id.clone()));

        let mut by_header: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, lib) in libraries.iter().enumerate() {
            for header in &lib.provided_headers {
                if platform_headers.contains(header) {
                    debug!("{} shadows platform header {}, not indexed", lib.name, header);
                    continue;
                }
                by_header.entry(header.clone()).or_default().push(i);
            }
        }

        LibraryIndex {
            libraries,
            by_header,
            platform_headers: platform_headers.clone(),
        }
    }

    /// Number of libraries in the pool.
    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    pub fn get(&self, id: &LibraryId) -> Option<&Library> {
        self.libraries.iter().find(|l| &l.id == id)
    }

    pub fn is_platform_header(&self, header: &str) -> bool {
        self.platform_headers.contains(header)
    }

    /// Candidates for `header`, best first. Libraries named in
    /// `excluded_names` and libraries built for other architectures are left
    /// out; an empty result means the header is unknown to the pool.
    pub fn resolve(&self, header: &str, excluded_names: &HashSet<String>, arch: &str) -> Vec<&Library> {
        let key = Path::new(header)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| *n == header);
        let Some(slots) = key.and_then(|k| self.by_header.get(&k)) else {
            return Vec::new();
        };

        let mut candidates: Vec<(&Library, ArchMatch)> = slots
            .iter()
            .map(|&i| &self.libraries[i])
            .filter(|l| !excluded_names.contains(&l.name))
            .map(|l| (l, l.architectures.check(arch)))
            .filter(|(_, m)| *m != ArchMatch::Mismatch)
            .collect();

        candidates.sort_by(|(a, am), (b, bm)| {
            b.matches_stem(header)
                .cmp(&a.matches_stem(header))
                .then(a.root_priority.cmp(&b.root_priority))
                .then(am.cmp(bm))
                .then_with(|| a.folder.cmp(&b.folder))
        });

        candidates.into_iter().map(|(l, _)| l).collect()
    }
}

/// Non-hidden sub-directories of a library root.
fn library_dirs(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(root)?.flatten() {
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if path.is_dir() && !hidden {
            dirs.push(path);
        }
    }
    Ok(dirs)
}
