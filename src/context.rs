// ─────────────────────────────────────────────────────────────────────────────
//  tsuki-discover :: context  —  typed build context shared between stages
//
//  Each stage documents the fields it reads and the fields it writes.
// ─────────────────────────────────────────────────────────────────────────────

use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use crate::board::Board;
use crate::config::DiscoveryConfig;
use crate::depfile;
use crate::discover::{Discovery, IncludeDiscovery};
use crate::error::{DiscoverError, Result};
use crate::index::LibraryIndex;
use crate::library::{Library, LibraryId};
use crate::platform::PlatformCore;
use crate::probe::{GccProbe, Probe};

/// What downstream compile stages need to know about an imported library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedLibrary {
    pub name:           String,
    pub id:             LibraryId,
    pub version:        Option<String>,
    pub folder:         PathBuf,
    pub source_folder:  PathBuf,
    pub utility_folder: Option<PathBuf>,
    pub legacy:         bool,
}

impl From<&Library> for ImportedLibrary {
    fn from(lib: &Library) -> Self {
        ImportedLibrary {
            name:           lib.name.clone(),
            id:             lib.id.clone(),
            version:        lib.version.clone(),
            folder:         lib.folder.clone(),
            source_folder:  lib.source_folder.clone(),
            utility_folder: lib.utility_folder.clone(),
            legacy:         lib.is_legacy(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildContext {
    // ── inputs ────────────────────────────────────────────────────────────
    pub config: DiscoveryConfig,
    /// Absolute path of the merged primary translation unit.
    pub sketch: PathBuf,
    pub board:  Board,
    pub arch:   String,

    // ── written by FindIncludes ───────────────────────────────────────────
    pub platform:           Option<PlatformCore>,
    pub include_folders:    Vec<String>,
    pub imported_libraries: Vec<ImportedLibrary>,
    pub includes:           Vec<String>,
    pub iterations:         usize,
}

/// Serialisable view of the outputs, as written to `includes.json`.
#[derive(Debug, Serialize)]
pub struct DiscoveryOutput<'a> {
    pub board:              &'a str,
    pub arch:               &'a str,
    pub sketch:             &'a PathBuf,
    pub include_folders:    &'a [String],
    pub imported_libraries: &'a [ImportedLibrary],
    pub includes:           &'a [String],
    pub iterations:         usize,
}

impl BuildContext {
    pub fn from_config(config: DiscoveryConfig) -> Result<Self> {
        let sketch = config
            .sketch
            .clone()
            .ok_or_else(|| DiscoverError::Other("no sketch given (set `sketch` or pass --sketch)".into()))?;
        let sketch = depfile::absolute(&sketch)?;
        let board = Board::find(&config.board)?;
        let arch  = config.arch.clone().unwrap_or_else(|| board.arch.clone());

        Ok(BuildContext {
            config,
            sketch,
            board,
            arch,
            platform:           None,
            include_folders:    Vec::new(),
            imported_libraries: Vec::new(),
            includes:           Vec::new(),
            iterations:         0,
        })
    }

    pub fn record(&mut self, found: Discovery) {
        self.include_folders = found
            .include_folders
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        self.imported_libraries = found.imported_libraries.iter().map(ImportedLibrary::from).collect();
        self.includes = found
            .dependencies
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        self.iterations = found.iterations;
    }

    pub fn output(&self) -> DiscoveryOutput<'_> {
        DiscoveryOutput {
            board:              &self.board.fqbn,
            arch:               &self.arch,
            sketch:             &self.sketch,
            include_folders:    &self.include_folders,
            imported_libraries: &self.imported_libraries,
            includes:           &self.includes,
            iterations:         self.iterations,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.output()).map_err(|e| DiscoverError::Other(e.to_string()))
    }
}

/// One step of the build pipeline.
pub trait Stage {
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &mut BuildContext) -> Result<()>;
}

/// Run stages in order; the first error aborts the rest.
pub fn run_stages(stages: &[&dyn Stage], ctx: &mut BuildContext) -> Result<()> {
    for stage in stages {
        debug!("stage: {}", stage.name());
        stage.run(ctx)?;
    }
    Ok(())
}

/// Include discovery stage.
///
/// Reads `sketch`, `board`, `arch`, `config.hardware_folders`,
/// `config.library_folders`, `config.compiler`. Writes `platform`,
/// `include_folders`, `imported_libraries`, `includes`, `iterations`.
#[derive(Default)]
pub struct FindIncludes {
    probe: Option<Box<dyn Probe>>,
}

impl FindIncludes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `probe` instead of spawning the configured compiler.
    pub fn with_probe(probe: Box<dyn Probe>) -> Self {
        FindIncludes { probe: Some(probe) }
    }
}

impl Stage for FindIncludes {
    fn name(&self) -> &'static str {
        "find-includes"
    }

    fn run(&self, ctx: &mut BuildContext) -> Result<()> {
        let platform = PlatformCore::locate(&ctx.config.hardware_folders, &ctx.board);
        let roots = ctx.config.library_roots(&platform);
        let index = LibraryIndex::scan(&roots, &platform.headers);
        debug!("{} libraries in {} root(s)", index.len(), roots.len());

        let found = match &self.probe {
            Some(probe) => IncludeDiscovery::new(&index, probe.as_ref(), ctx.arch.as_str()).run(&ctx.sketch)?,
            None => {
                let mut compiler = ctx.config.compiler.clone();
                compiler.flags.extend(ctx.board.probe_flags());
                let probe = GccProbe::new(compiler, platform.include_folders());
                IncludeDiscovery::new(&index, &probe, ctx.arch.as_str()).run(&ctx.sketch)?
            }
        };

        ctx.platform = Some(platform);
        ctx.record(found);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_needs_a_sketch() {
        let err = BuildContext::from_config(DiscoveryConfig::default()).unwrap_err();
        assert!(matches!(err, DiscoverError::Other(_)));
    }

    #[test]
    fn arch_override_wins() {
        let cfg = DiscoveryConfig {
            sketch: Some("/b/s.cpp".into()),
            board:  "uno".into(),
            arch:   Some("megaavr".into()),
            ..Default::default()
        };
        let ctx = BuildContext::from_config(cfg).unwrap();
        assert_eq!(ctx.arch, "megaavr");
        assert_eq!(ctx.board.arch, "avr");
    }

    #[test]
    fn unknown_board_is_reported() {
        let cfg = DiscoveryConfig {
            sketch: Some("/b/s.cpp".into()),
            board:  "toaster".into(),
            ..Default::default()
        };
        assert!(matches!(BuildContext::from_config(cfg), Err(DiscoverError::UnknownBoard(_))));
    }

    #[test]
    fn record_writes_strings() {
        let cfg = DiscoveryConfig { sketch: Some("/b/s.cpp".into()), ..Default::default() };
        let mut ctx = BuildContext::from_config(cfg).unwrap();
        ctx.record(Discovery {
            include_folders:    vec!["/l/A".into()],
            imported_libraries: Vec::new(),
            dependencies:       vec!["/b/config.h".into()],
            iterations:         2,
        });
        assert_eq!(ctx.include_folders, vec!["/l/A"]);
        assert_eq!(ctx.includes, vec!["/b/config.h"]);

        let json = ctx.to_json().unwrap();
        assert!(json.contains("\"iterations\": 2"));
        assert!(json.contains("\"board\": \"arduino:avr:uno\""));
    }
}
