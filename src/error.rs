// ─────────────────────────────────────────────────────────────────────────────
//  tsuki-discover :: error
// ─────────────────────────────────────────────────────────────────────────────

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("Malformed dependency output (line {line}): {reason}")]
    Parse { line: usize, reason: String },

    #[error("Preprocessor `{compiler}` failed ({status}):\n{diagnostics}")]
    Probe {
        compiler:    String,
        status:      String,
        diagnostics: String,
    },

    #[error("Header '{header}' not found in any library{}\n  Hint: install the library that provides it, or add its folder with --libraries",
        IncludedFrom(.included_from.as_ref()))]
    UnresolvableHeader {
        header:        String,
        included_from: Option<PathBuf>,
    },

    #[error("Library resolution stalled: still missing {} although every providing library is imported\n  Hint: check the compiler flags and include paths",
        .headers.join(", "))]
    StalledResolution { headers: Vec<String> },

    #[error("Toolchain not found: {0}\n  Hint: install avr-gcc or pass --compiler <path>")]
    ToolchainNotFound(String),

    #[error("Unknown board '{0}' — run `tsuki-discover boards` for the full list")]
    UnknownBoard(String),

    #[error("Invalid config {path}: {reason}")]
    Config { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DiscoverError>;

impl DiscoverError {
    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        DiscoverError::Parse { line, reason: reason.into() }
    }
}

/// Renders the optional " (included from …)" suffix.
struct IncludedFrom<'a>(Option<&'a PathBuf>);

impl fmt::Display for IncludedFrom<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(p) => write!(f, " (included from {})", p.display()),
            None    => Ok(()),
        }
    }
}
