// ─────────────────────────────────────────────────────────────────────────────
//  tsuki-discover :: platform  —  hardware core discovery
//
//  Looks for the board's core in each configured hardware folder, in order:
//
//  1. SDK root                 <hw>/cores/arduino          (TSUKI_SDK_ROOT)
//  2. Arduino IDE 1.x layout   <hw>/<vendor>/<arch>/cores/arduino
//  3. arduino-cli package tree <hw>/packages/<vendor>/hardware/<arch>/<ver>/…
//
//  The core and variant folders are handed to the compiler before any
//  library folder; their headers are never resolved against libraries.
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::board::Board;
use crate::depfile;
use crate::library::header_names;

/// Paths and header names supplied by the hardware platform itself.
#[derive(Debug, Clone, Default)]
pub struct PlatformCore {
    /// `<hw>/<vendor>/<arch>[/<version>]`
    pub platform_dir:  Option<PathBuf>,
    /// Directory containing Arduino.h and other core headers
    pub core_dir:      Option<PathBuf>,
    /// Variant include dir (pins_arduino.h, etc.)
    pub variant_dir:   Option<PathBuf>,
    /// Libraries bundled with the platform, lowest priority root.
    pub libraries_dir: Option<PathBuf>,
    /// Header file names found directly under the core and variant folders.
    pub headers:       BTreeSet<String>,
}

impl PlatformCore {
    /// Locate the core for `board` in the first hardware folder that has it.
    /// Every returned path is absolute.
    pub fn locate(hardware_folders: &[PathBuf], board: &Board) -> PlatformCore {
        for hw in hardware_folders {
            let hw = depfile::absolute(hw).unwrap_or_else(|_| hw.clone());
            if let Some(platform_dir) = find_platform_dir(&hw, board) {
                debug!("platform core for {} at {}", board.fqbn, platform_dir.display());
                return Self::from_platform_dir(platform_dir, &board.variant);
            }
        }
        warn!(
            "no hardware core for {} in {} folder(s); relying on compiler flags",
            board.fqbn,
            hardware_folders.len()
        );
        PlatformCore::default()
    }

    fn from_platform_dir(platform_dir: PathBuf, variant: &str) -> PlatformCore {
        let core_dir = platform_dir.join("cores").join("arduino");

        // Some boards use a different variant name; fall back to "standard"
        let variant_dir = [variant, "standard"]
            .iter()
            .map(|v| platform_dir.join("variants").join(v))
            .find(|d| d.is_dir());

        let libraries_dir = Some(platform_dir.join("libraries")).filter(|d| d.is_dir());

        let mut headers = BTreeSet::new();
        headers.extend(header_names(&core_dir));
        if let Some(v) = &variant_dir {
            headers.extend(header_names(v));
        }

        PlatformCore {
            platform_dir: Some(platform_dir),
            core_dir:     Some(core_dir),
            variant_dir,
            libraries_dir,
            headers,
        }
    }

    /// Include folders for the probe, core first.
    pub fn include_folders(&self) -> Vec<PathBuf> {
        self.core_dir.iter().chain(self.variant_dir.iter()).cloned().collect()
    }

    /// True if the header name is provided by the core or variant.
    pub fn provides(&self, header: &str) -> bool {
        self.headers.contains(header)
    }

    /// True if `path` lives under one of the platform include folders.
    pub fn owns(&self, path: &Path) -> bool {
        self.include_folders().iter().any(|dir| path.starts_with(dir))
    }
}

fn find_platform_dir(hw: &Path, board: &Board) -> Option<PathBuf> {
    // ── 1. SDK root ────────────────────────────────────────────────────────
    if hw.join("cores").join("arduino").is_dir() {
        return Some(hw.to_path_buf());
    }

    // ── 2. IDE 1.x layout ──────────────────────────────────────────────────
    let flat = hw.join(board.vendor()).join(&board.arch);
    if flat.join("cores").join("arduino").is_dir() {
        return Some(flat);
    }

    // ── 3. arduino-cli package cache ───────────────────────────────────────
    let arch_base = hw
        .join("packages")
        .join(board.vendor())
        .join("hardware")
        .join(&board.arch);
    let version = latest_version_dir(&arch_base)?;
    let versioned = arch_base.join(version);
    if versioned.join("cores").join("arduino").is_dir() {
        Some(versioned)
    } else {
        None
    }
}

/// Return the string name of the latest (semver-ish) directory inside `base`.
fn latest_version_dir(base: &Path) -> Option<String> {
    std::fs::read_dir(base)
        .ok()?
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .max_by(|a, b| parse_ver(a).cmp(&parse_ver(b)))
}

fn parse_ver(s: &str) -> Vec<u32> {
    s.split('.').map(|p| p.parse::<u32>().unwrap_or(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn ide1_layout() {
        let tmp = TempDir::new().unwrap();
        let avr = tmp.path().join("arduino").join("avr");
        touch(&avr.join("cores/arduino/Arduino.h"));
        touch(&avr.join("variants/leonardo/pins_arduino.h"));
        fs::create_dir_all(avr.join("libraries/HID")).unwrap();

        let board = Board::find("leonardo").unwrap();
        let core = PlatformCore::locate(&[tmp.path().to_path_buf()], &board);

        assert_eq!(core.platform_dir.as_deref(), Some(avr.as_path()));
        assert_eq!(core.variant_dir, Some(avr.join("variants/leonardo")));
        assert_eq!(core.libraries_dir, Some(avr.join("libraries")));
        assert!(core.provides("Arduino.h"));
        assert!(core.provides("pins_arduino.h"));
        assert!(core.owns(&avr.join("cores/arduino/Print.h")));
        assert!(!core.owns(&tmp.path().join("libraries/Servo/Servo.h")));
    }

    #[test]
    fn package_layout_picks_latest_version() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("packages/arduino/hardware/avr");
        touch(&base.join("1.8.2/cores/arduino/Arduino.h"));
        touch(&base.join("1.8.10/cores/arduino/Arduino.h"));

        let board = Board::find("uno").unwrap();
        let core = PlatformCore::locate(&[tmp.path().to_path_buf()], &board);

        assert_eq!(core.platform_dir, Some(base.join("1.8.10")));
        // no variants folder at all
        assert!(core.variant_dir.is_none());
        assert_eq!(core.include_folders(), vec![base.join("1.8.10/cores/arduino")]);
    }

    #[test]
    fn variant_falls_back_to_standard() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("cores/arduino/Arduino.h"));
        touch(&tmp.path().join("variants/standard/pins_arduino.h"));

        let board = Board::find("nano").unwrap();
        let core = PlatformCore::locate(&[tmp.path().to_path_buf()], &board);
        assert_eq!(core.variant_dir, Some(tmp.path().join("variants/standard")));
    }

    #[test]
    fn missing_core_is_empty() {
        let tmp = TempDir::new().unwrap();
        let board = Board::find("uno").unwrap();
        let core = PlatformCore::locate(&[tmp.path().to_path_buf()], &board);
        assert!(core.include_folders().is_empty());
        assert!(core.headers.is_empty());
    }

    #[test]
    fn relative_hardware_folder_gives_absolute_paths() {
        let cwd = std::env::current_dir().unwrap();
        let tmp = TempDir::new_in(&cwd).unwrap();
        let avr = tmp.path().join("hardware/arduino/avr");
        touch(&avr.join("cores/arduino/Arduino.h"));
        fs::create_dir_all(avr.join("libraries")).unwrap();
        let relative = tmp.path().join("hardware").strip_prefix(&cwd).unwrap().to_path_buf();

        let core = PlatformCore::locate(&[relative], &Board::find("uno").unwrap());
        assert_eq!(core.core_dir, Some(depfile::normalize(&avr.join("cores/arduino"))));
        assert!(core.libraries_dir.as_deref().is_some_and(Path::is_absolute));
    }
}
