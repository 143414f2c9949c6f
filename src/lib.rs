// ─────────────────────────────────────────────────────────────────────────────
//  tsuki_discover  —  public library API
// ─────────────────────────────────────────────────────────────────────────────

pub mod board;
pub mod config;
pub mod context;
pub mod depfile;
pub mod discover;
pub mod error;
pub mod index;
pub mod library;
pub mod platform;
pub mod probe;

pub use board::Board;
pub use config::DiscoveryConfig;
pub use context::{run_stages, BuildContext, FindIncludes, ImportedLibrary, Stage};
pub use discover::{Discovery, IncludeDiscovery, Phase};
pub use error::{DiscoverError, Result};
pub use index::LibraryIndex;
pub use library::{Library, LibraryId};
pub use probe::{CompilerConfig, GccDialect, GccProbe, MissingHeader, Probe, ProbeReport};

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// One-shot: config → include folders + imported libraries.
///
/// # Minimal usage
/// ```no_run
/// use tsuki_discover::{DiscoveryConfig, Pipeline};
///
/// let cfg = DiscoveryConfig {
///     sketch:          Some("build/sketch/blink.ino.cpp".into()),
///     board:           "uno".into(),
///     library_folders: vec!["/home/user/Arduino/libraries".into()],
///     ..Default::default()
/// };
///
/// let ctx = Pipeline::new(cfg).run().unwrap();
/// for lib in &ctx.imported_libraries {
///     println!("{} {}", lib.name, lib.source_folder.display());
/// }
/// ```
pub struct Pipeline {
    cfg:   DiscoveryConfig,
    probe: Option<Box<dyn Probe>>,
}

impl Pipeline {
    pub fn new(cfg: DiscoveryConfig) -> Self {
        Self { cfg, probe: None }
    }

    /// Replace the compiler probe (tests, other toolchains).
    pub fn with_probe(mut self, probe: Box<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn run(self) -> Result<BuildContext> {
        let mut ctx = BuildContext::from_config(self.cfg)?;
        let find = match self.probe {
            Some(probe) => FindIncludes::with_probe(probe),
            None        => FindIncludes::new(),
        };
        run_stages(&[&find], &mut ctx)?;
        Ok(ctx)
    }
}
