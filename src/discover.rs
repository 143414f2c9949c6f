// ─────────────────────────────────────────────────────────────────────────────
//  tsuki-discover :: discover  —  include discovery fixpoint loop
//
//  Scanning ──probe──▶ no missing headers ──▶ Stable
//     ▲                    │
//     │                 missing
//     │                    ▼
//     └── new library ◀─ Resolving ──▶ unknown header / no progress ──▶ Failed
//
//  Every pass that loops back imports at least one library, so a pool of N
//  libraries needs at most N + 1 probes.
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{DiscoverError, Result};
use crate::index::LibraryIndex;
use crate::library::{Library, LibraryId};
use crate::probe::{MissingHeader, Probe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scanning,
    Resolving,
    Stable,
    Failed,
}

/// State threaded through the loop. Imports, folders and dependencies only
/// ever grow; `queue` is emptied by every probe.
#[derive(Debug, Default)]
pub struct ResolutionState {
    include_folders: Vec<PathBuf>,
    folder_set:      HashSet<PathBuf>,
    imported:        Vec<Library>,
    imported_ids:    HashSet<LibraryId>,
    /// Imported since the last probe; their own includes are still unseen.
    queue:           Vec<LibraryId>,
    dependencies:    Vec<PathBuf>,
    dependency_set:  HashSet<PathBuf>,
}

impl ResolutionState {
    pub fn include_folders(&self) -> &[PathBuf] {
        &self.include_folders
    }

    pub fn imported(&self) -> &[Library] {
        &self.imported
    }

    /// Libraries the next probe will see for the first time.
    pub fn pending(&self) -> &[LibraryId] {
        &self.queue
    }

    /// Import `lib` and its folders. False if it was already imported.
    pub fn import(&mut self, lib: &Library) -> bool {
        if !self.imported_ids.insert(lib.id.clone()) {
            return false;
        }
        for dir in lib.include_folders() {
            self.add_folder(dir);
        }
        self.imported.push(lib.clone());
        self.queue.push(lib.id.clone());
        true
    }

    fn add_folder(&mut self, dir: PathBuf) {
        if self.folder_set.insert(dir.clone()) {
            self.include_folders.push(dir);
        }
    }

    fn record_dependencies(&mut self, paths: Vec<PathBuf>) {
        for p in paths {
            if self.dependency_set.insert(p.clone()) {
                self.dependencies.push(p);
            }
        }
    }

    fn imported_names(&self) -> HashSet<String> {
        self.imported.iter().map(|l| l.name.clone()).collect()
    }

    fn already_provided(&self, header: &str) -> bool {
        self.imported.iter().any(|l| l.provides(header))
    }
}

/// Final result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Library include folders, first-discovered order, no duplicates.
    pub include_folders:    Vec<PathBuf>,
    /// Imported libraries, first-discovered order, unique by id.
    pub imported_libraries: Vec<Library>,
    /// Header files the compiler found, outside the platform core.
    pub dependencies:       Vec<PathBuf>,
    /// Number of probes run.
    pub iterations:         usize,
}

/// Drives the probe until the include set stops growing.
pub struct IncludeDiscovery<'a> {
    index: &'a LibraryIndex,
    probe: &'a dyn Probe,
    arch:  String,
    phase: Phase,
}

impl<'a> IncludeDiscovery<'a> {
    pub fn new(index: &'a LibraryIndex, probe: &'a dyn Probe, arch: impl Into<String>) -> Self {
        IncludeDiscovery {
            index,
            probe,
            arch:  arch.into(),
            phase: Phase::Scanning,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run to `Stable` or `Failed`. No partial result is returned on error.
    pub fn run(&mut self, sketch: &Path) -> Result<Discovery> {
        let mut state = ResolutionState::default();
        let result = self.drive(sketch, &mut state);
        self.phase = if result.is_ok() { Phase::Stable } else { Phase::Failed };
        result
    }

    fn drive(&mut self, sketch: &Path, state: &mut ResolutionState) -> Result<Discovery> {
        let bound = self.index.len() + 1;

        for iteration in 1..=bound {
            self.phase = Phase::Scanning;
            debug!(
                "iteration {}: probing with {} include folder(s), {} new: [{}]",
                iteration,
                state.include_folders.len(),
                state.queue.len(),
                state
                    .queue
                    .iter()
                    .filter_map(|id| self.index.get(id))
                    .map(|l| l.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            let report = self.probe.probe(&state.include_folders, sketch)?;
            // every imported library has now been through the compiler
            state.queue.clear();
            state.record_dependencies(report.dependencies);

            if report.missing.is_empty() {
                info!(
                    "includes stable after {} iteration(s): {} librar{} imported",
                    iteration,
                    state.imported.len(),
                    if state.imported.len() == 1 { "y" } else { "ies" }
                );
                return Ok(Discovery {
                    include_folders:    state.include_folders.clone(),
                    imported_libraries: state.imported.clone(),
                    dependencies:       state.dependencies.clone(),
                    iterations:         iteration,
                });
            }

            self.phase = Phase::Resolving;
            self.resolve_missing(&report.missing, sketch, state)?;
            if state.queue.is_empty() {
                return Err(DiscoverError::StalledResolution {
                    headers: report.missing.into_iter().map(|m| m.name).collect(),
                });
            }
        }

        // unreachable while every looping pass imports a library
        Err(DiscoverError::StalledResolution { headers: Vec::new() })
    }

    /// Resolve one probe's missing headers in emit order, queueing every
    /// newly imported library for the next probe.
    fn resolve_missing(
        &self,
        missing: &[MissingHeader],
        sketch: &Path,
        state: &mut ResolutionState,
    ) -> Result<()> {
        for header in missing {
            if state.already_provided(&header.name) {
                debug!("{} already provided by an imported library", header.name);
                continue;
            }

            let excluded = state.imported_names();
            let candidates = self.index.resolve(&header.name, &excluded, &self.arch);
            let Some(chosen) = candidates.first() else {
                let included_from = header
                    .included_from
                    .clone()
                    .or_else(|| self.probe.included_from(&state.include_folders, sketch, &header.name));
                return Err(DiscoverError::UnresolvableHeader {
                    header: header.name.clone(),
                    included_from,
                });
            };

            if candidates.len() > 1 {
                debug!(
                    "{}: {} candidates, using {}",
                    header.name,
                    candidates.len(),
                    chosen.folder.display()
                );
            }
            if state.import(chosen) {
                info!("{} → {} ({})", header.name, chosen.name, chosen.folder.display());
            }
        }

        Ok(())
    }
}
