//! Shared fixtures: library trees on disk and a preprocessor stand-in that
//! follows `#include` directives the way `gcc -M -MG` does.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tsuki_discover::{MissingHeader, Probe, ProbeReport, Result};

/// Write `body` to `path`, creating parent folders.
pub fn write(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

/// Legacy library `root/name/` with the given `(file, body)` pairs.
pub fn library(root: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    for (file, body) in files {
        write(&dir.join(file), body);
    }
    dir
}

pub fn include(header: &str) -> String {
    format!("#include \"{}\"\n", header)
}

/// Walks includes depth-first. Quote includes look next to the including
/// file first, then in `system` folders, then in the probe's include folders.
/// Headers found under `system` are not reported.
#[derive(Default)]
pub struct FakePreprocessor {
    pub system: Vec<PathBuf>,
    pub calls:  Cell<usize>,
    pub seen:   RefCell<Vec<Vec<PathBuf>>>,
}

impl FakePreprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(system: Vec<PathBuf>) -> Self {
        FakePreprocessor { system, ..Default::default() }
    }

    fn walk(
        &self,
        file: &Path,
        include_folders: &[PathBuf],
        visited: &mut HashSet<PathBuf>,
        report: &mut ProbeReport,
        missing: &mut HashSet<String>,
    ) {
        let text = fs::read_to_string(file).unwrap_or_default();
        for header in includes_of(&text) {
            let local = file.parent().map(|d| d.join(&header)).into_iter();
            let search = self
                .system
                .iter()
                .chain(include_folders)
                .map(|d| d.join(&header));
            let Some(found) = local.chain(search).find(|p| p.is_file()) else {
                if missing.insert(header.clone()) {
                    report.missing.push(MissingHeader::new(header));
                }
                continue;
            };

            if !visited.insert(found.clone()) {
                continue;
            }
            if !self.system.iter().any(|s| found.starts_with(s)) {
                report.dependencies.push(found.clone());
            }
            self.walk(&found, include_folders, visited, report, missing);
        }
    }
}

impl Probe for FakePreprocessor {
    fn probe(&self, include_folders: &[PathBuf], sketch: &Path) -> Result<ProbeReport> {
        self.calls.set(self.calls.get() + 1);
        self.seen.borrow_mut().push(include_folders.to_vec());

        let mut report = ProbeReport::default();
        let mut visited = HashSet::new();
        let mut missing = HashSet::new();
        visited.insert(sketch.to_path_buf());
        self.walk(sketch, include_folders, &mut visited, &mut report, &mut missing);
        Ok(report)
    }
}

fn includes_of(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|l| l.trim().strip_prefix("#include"))
        .filter_map(|rest| {
            let rest = rest.trim();
            let (open, close) = match rest.chars().next()? {
                '"' => ('"', '"'),
                '<' => ('<', '>'),
                _ => return None,
            };
            let inner = rest.strip_prefix(open)?;
            inner.find(close).map(|end| inner[..end].to_owned())
        })
        .collect()
}
