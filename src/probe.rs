// ─────────────────────────────────────────────────────────────────────────────
//  tsuki-discover :: probe  —  one preprocessor run per discovery iteration
//
//  The compiler is asked for make-style dependency rules (`-M`) and told to
//  keep going when a header is missing (`-MG`). Missing headers then show up
//  in the rules as bare, relative names:
//
//      sketch.o: /build/sketch/sketch.cpp /libs/A/A.h B.h
//                                                     ^^^ not found
//
//  A failing run is inspected for "No such file" diagnostics instead; any
//  other failure is fatal. Diagnostic text is read through `Dialect`, so
//  another toolchain's wording can be plugged in without touching the
//  discovery loop.
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::depfile;
use crate::error::{DiscoverError, Result};

/// A header the preprocessor could not find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingHeader {
    /// Header as written in the `#include`, e.g. `Servo.h`.
    pub name:          String,
    /// File containing the `#include`, when the compiler says so.
    pub included_from: Option<PathBuf>,
}

impl MissingHeader {
    pub fn new(name: impl Into<String>) -> Self {
        MissingHeader { name: name.into(), included_from: None }
    }
}

/// Outcome of one probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// In the order the compiler reported them, de-duplicated.
    pub missing:      Vec<MissingHeader>,
    /// Header files the compiler did find.
    pub dependencies: Vec<PathBuf>,
}

impl ProbeReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Runs the preprocessor over the sketch with the given include folders.
pub trait Probe {
    fn probe(&self, include_folders: &[PathBuf], sketch: &Path) -> Result<ProbeReport>;

    /// File that includes `header`, when the tool can tell. Only asked once
    /// the header has turned out to be unresolvable.
    fn included_from(&self, _include_folders: &[PathBuf], _sketch: &Path, _header: &str) -> Option<PathBuf> {
        None
    }
}

/// Compiler-specific flag spelling and diagnostic wording.
pub trait Dialect: Send + Sync {
    /// Flags requesting dependency rules on stdout, tolerant of missing headers.
    fn dependency_flags(&self) -> Vec<String>;

    /// Flags for a run that stops at the first missing header with a
    /// diagnostic naming the includer.
    fn diagnostic_flags(&self) -> Vec<String>;

    fn include_flag(&self, dir: &Path) -> String;

    /// Missing headers named in a failed run's diagnostics.
    fn missing_headers(&self, diagnostics: &str) -> Vec<MissingHeader>;
}

/// GCC and clang spelling.
#[derive(Debug, Clone, Copy, Default)]
pub struct GccDialect;

fn missing_header_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // gcc:   sketch.cpp:3:10: fatal error: Servo.h: No such file or directory
            Regex::new(r"(?m)^(?P<file>.+?):\d+(?::\d+)?: (?:fatal )?error: (?P<header>[^:\n]+): No such file or directory")
                .expect("static regex"),
            // clang: sketch.cpp:3:10: fatal error: 'Servo.h' file not found
            Regex::new(r"(?m)^(?P<file>.+?):\d+(?::\d+)?: (?:fatal )?error: '(?P<header>[^'\n]+)' file not found")
                .expect("static regex"),
        ]
    })
}

impl Dialect for GccDialect {
    fn dependency_flags(&self) -> Vec<String> {
        vec!["-M".into(), "-MG".into()]
    }

    fn diagnostic_flags(&self) -> Vec<String> {
        vec!["-M".into()]
    }

    fn include_flag(&self, dir: &Path) -> String {
        format!("-I{}", dir.display())
    }

    fn missing_headers(&self, diagnostics: &str) -> Vec<MissingHeader> {
        let mut hits: Vec<(usize, MissingHeader)> = missing_header_patterns()
            .iter()
            .flat_map(|re| re.captures_iter(diagnostics))
            .filter_map(|c| {
                let start  = c.get(0)?.start();
                let header = c.name("header")?.as_str().trim().to_owned();
                let file   = c.name("file").map(|f| PathBuf::from(f.as_str().trim()));
                Some((start, MissingHeader { name: header, included_from: file }))
            })
            .collect();

        // left-to-right as emitted
        hits.sort_by_key(|(start, _)| *start);
        dedupe(hits.into_iter().map(|(_, m)| m))
    }
}

fn dedupe(headers: impl IntoIterator<Item = MissingHeader>) -> Vec<MissingHeader> {
    let mut seen = HashSet::new();
    headers
        .into_iter()
        .filter(|m| seen.insert(m.name.clone()))
        .collect()
}

/// Compiler binary and base flags, opaque beyond appending includes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub path:  PathBuf,
    pub flags: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            path:  PathBuf::from("avr-g++"),
            flags: vec!["-x".into(), "c++".into(), "-w".into()],
        }
    }
}

/// Spawns the real compiler.
pub struct GccProbe {
    compiler:         CompilerConfig,
    /// Core/variant folders, passed before library folders and never
    /// reported as dependencies.
    platform_folders: Vec<PathBuf>,
    dialect:          Box<dyn Dialect>,
}

impl GccProbe {
    pub fn new(compiler: CompilerConfig, platform_folders: Vec<PathBuf>) -> Self {
        GccProbe {
            compiler,
            platform_folders: platform_folders
                .into_iter()
                .map(|d| depfile::absolute(&d).unwrap_or(d))
                .collect(),
            dialect: Box::new(GccDialect),
        }
    }

    pub fn with_dialect(mut self, dialect: Box<dyn Dialect>) -> Self {
        self.dialect = dialect;
        self
    }

    fn command(&self, mode: Vec<String>, include_folders: &[PathBuf], sketch: &Path) -> Command {
        let mut cmd = Command::new(&self.compiler.path);
        cmd.args(&self.compiler.flags);
        cmd.args(mode);
        for dir in self.platform_folders.iter().chain(include_folders) {
            cmd.arg(self.dialect.include_flag(dir));
        }
        cmd.arg(sketch);
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }

    fn run(&self, mut cmd: Command) -> Result<Output> {
        debug!("probe: {:?}", cmd);
        // output() drains both pipes and reaps the child on every path
        cmd.output().map_err(|e| match e.kind() {
            ErrorKind::NotFound => DiscoverError::ToolchainNotFound(self.compiler.path.display().to_string()),
            _ => DiscoverError::Io(e),
        })
    }

    /// Split parsed rule paths into found dependencies and `-MG` stand-ins.
    ///
    /// Found headers are kept only when they live next to the sketch or in
    /// one of `include_folders`; toolchain and platform headers are dropped.
    /// A relative path is a stand-in unless it names an existing file, which
    /// happens when the compiler was handed relative folders.
    fn classify(&self, paths: Vec<PathBuf>, sketch: &Path, include_folders: &[PathBuf]) -> ProbeReport {
        let mut missing = Vec::new();
        let mut dependencies = Vec::new();
        let sketch_dir = sketch.parent();

        for path in paths {
            let path = if path.is_absolute() {
                path
            } else if path.is_file() {
                depfile::absolute(&path).unwrap_or(path)
            } else {
                missing.push(MissingHeader::new(path.to_string_lossy()));
                continue;
            };

            if path == sketch || self.platform_folders.iter().any(|d| path.starts_with(d)) {
                continue;
            }
            let ours = sketch_dir.is_some_and(|d| path.starts_with(d))
                || include_folders.iter().any(|d| path.starts_with(d));
            if ours {
                dependencies.push(path);
            }
        }

        ProbeReport { missing: dedupe(missing), dependencies }
    }
}

impl Probe for GccProbe {
    fn probe(&self, include_folders: &[PathBuf], sketch: &Path) -> Result<ProbeReport> {
        let sketch = depfile::absolute(sketch)?;
        let include_folders = absolute_all(include_folders)?;
        let cmd = self.command(self.dialect.dependency_flags(), &include_folders, &sketch);
        let out = self.run(cmd)?;

        let stdout = String::from_utf8_lossy(&out.stdout);
        let stderr = String::from_utf8_lossy(&out.stderr);

        if out.status.success() {
            let paths = depfile::parse(&stdout)?;
            return Ok(self.classify(paths, &sketch, &include_folders));
        }

        let missing = self.dialect.missing_headers(&stderr);
        if missing.is_empty() {
            return Err(DiscoverError::Probe {
                compiler:    self.compiler.path.display().to_string(),
                status:      out.status.to_string(),
                diagnostics: stderr.trim().to_owned(),
            });
        }
        Ok(ProbeReport { missing, dependencies: Vec::new() })
    }

    /// Re-runs without tolerating missing headers; the compiler's fatal
    /// diagnostic names the including file.
    fn included_from(&self, include_folders: &[PathBuf], sketch: &Path, header: &str) -> Option<PathBuf> {
        let sketch = depfile::absolute(sketch).ok()?;
        let include_folders = absolute_all(include_folders).ok()?;
        let cmd = self.command(self.dialect.diagnostic_flags(), &include_folders, &sketch);
        let out = self.run(cmd).ok()?;

        self.dialect
            .missing_headers(&String::from_utf8_lossy(&out.stderr))
            .into_iter()
            .find(|m| m.name == header)
            .and_then(|m| m.included_from)
    }
}

fn absolute_all(dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    dirs.iter()
        .map(|d| depfile::absolute(d).map_err(DiscoverError::from))
        .collect()
}
