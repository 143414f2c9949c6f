// ─────────────────────────────────────────────────────────────────────────────
//  tsuki-discover :: library  —  one installed Arduino library on disk
//
//  Three on-disk layouts are recognised:
//
//      Recursive (1.5 format)      Flat (1.5, no src/)      Legacy (1.0)
//      Servo/                      Servo/                   Servo/
//      ├── library.properties      ├── library.properties   ├── Servo.h
//      └── src/                    ├── Servo.h              └── utility/
//          └── Servo.h             └── utility/
//
//  Recursive libraries expose `src/` only. Flat and legacy ones expose the
//  library root plus `utility/` when present.
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{DiscoverError, Result};

const PROPERTIES_FILE: &str = "library.properties";
const HEADER_EXTS: &[&str] = &["h", "hh", "hpp", "hxx", "h++"];

/// Stable identity of a library: short SHA-256 of its folder path.
/// Two libraries may share a name; they never share an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LibraryId(String);

impl LibraryId {
    pub fn for_folder(folder: &Path) -> Self {
        let digest = Sha256::digest(folder.to_string_lossy().as_bytes());
        LibraryId(hex::encode(digest)[..16].to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryLayout {
    Recursive,
    Flat,
    Legacy,
}

/// `architectures=` from library.properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Architectures {
    Any,
    Only(Vec<String>),
}

/// How well a library fits the target architecture. Ordered best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArchMatch {
    Exact,
    Any,
    Mismatch,
}

impl Architectures {
    pub fn parse(raw: &str) -> Self {
        let list: Vec<String> = raw
            .split(',')
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        if list.is_empty() || list.iter().any(|a| a == "*") {
            Architectures::Any
        } else {
            Architectures::Only(list)
        }
    }

    pub fn check(&self, arch: &str) -> ArchMatch {
        match self {
            Architectures::Any => ArchMatch::Any,
            Architectures::Only(list) if list.iter().any(|a| a.eq_ignore_ascii_case(arch)) => ArchMatch::Exact,
            Architectures::Only(_) => ArchMatch::Mismatch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Library {
    pub id:               LibraryId,
    /// Folder name; what `#include "<name>.h"` is matched against.
    pub name:             String,
    /// `name=` from library.properties, when different from the folder.
    pub real_name:        Option<String>,
    pub version:          Option<String>,
    pub folder:           PathBuf,
    pub source_folder:    PathBuf,
    pub utility_folder:   Option<PathBuf>,
    pub layout:           LibraryLayout,
    pub architectures:    Architectures,
    pub provided_headers: BTreeSet<String>,
    /// Position of the library root in the configured folder list.
    pub root_priority:    usize,
}

impl Library {
    /// Read a library folder. `root_priority` is the index of the root
    /// folder it was found in (lower wins).
    pub fn load(folder: &Path, root_priority: usize) -> Result<Library> {
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| DiscoverError::Other(format!("not a library folder: {}", folder.display())))?;

        let props_path = folder.join(PROPERTIES_FILE);
        let props = if props_path.is_file() {
            Some(read_properties(&props_path)?)
        } else {
            None
        };

        let src = folder.join("src");
        let utility = Some(folder.join("utility")).filter(|u| u.is_dir());
        let (layout, source_folder, utility_folder) = match &props {
            Some(_) if src.is_dir() => (LibraryLayout::Recursive, src, None),
            Some(_) => (LibraryLayout::Flat, folder.to_path_buf(), utility),
            None    => (LibraryLayout::Legacy, folder.to_path_buf(), utility),
        };

        let mut provided_headers = header_names(&source_folder);
        if let Some(u) = &utility_folder {
            provided_headers.extend(header_names(u));
        }

        let get = |key: &str| props.as_ref().and_then(|p| p.get(key)).cloned();
        let architectures = get("architectures")
            .map(|a| Architectures::parse(&a))
            .unwrap_or(Architectures::Any);

        Ok(Library {
            id: LibraryId::for_folder(folder),
            real_name: get("name").filter(|n| *n != name),
            name,
            version: get("version"),
            folder: folder.to_path_buf(),
            source_folder,
            utility_folder,
            layout,
            architectures,
            provided_headers,
            root_priority,
        })
    }

    /// Old-format library without library.properties.
    pub fn is_legacy(&self) -> bool {
        self.layout == LibraryLayout::Legacy
    }

    /// Source folder, then utility folder if present.
    pub fn include_folders(&self) -> Vec<PathBuf> {
        std::iter::once(self.source_folder.clone())
            .chain(self.utility_folder.iter().cloned())
            .collect()
    }

    pub fn provides(&self, header: &str) -> bool {
        self.provided_headers.contains(header)
    }

    /// `Servo.h` inside `Servo/` — name equals the header stem, ignoring case.
    pub fn matches_stem(&self, header: &str) -> bool {
        let stem = Path::new(header)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        self.name.eq_ignore_ascii_case(&stem)
            || self.real_name.as_deref().is_some_and(|r| r.eq_ignore_ascii_case(&stem))
    }
}

/// Header file names directly inside `dir` (not recursive).
pub fn header_names(dir: &Path) -> BTreeSet<String> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file() && is_header(e.path()))
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect()
}

pub fn is_header(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| HEADER_EXTS.iter().any(|h| h.eq_ignore_ascii_case(e)))
}

/// `key=value` lines; `#` starts a comment line.
fn read_properties(path: &Path) -> Result<HashMap<String, String>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(parse_properties(&raw))
}

fn parse_properties(raw: &str) -> HashMap<String, String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .collect()
}
