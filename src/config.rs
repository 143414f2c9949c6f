// ─────────────────────────────────────────────────────────────────────────────
//  tsuki-discover :: config
//
//  tsuki-discover.toml:
//
//      sketch           = "build/sketch/thermometer.ino.cpp"
//      build_dir        = "build"
//      board            = "leonardo"          # id or FQBN
//      hardware_folders = ["/usr/share/arduino/hardware"]
//      library_folders  = ["~/Arduino/libraries", "/usr/share/arduino/libraries"]
//
//      [compiler]
//      path  = "avr-g++"
//      flags = ["-x", "c++", "-w"]
//
//  Environment:
//    TSUKI_LIBS_ROOT  default user library folder when none is configured
//    TSUKI_SDK_ROOT   hardware folder searched before the configured ones
//    HOME             replaces a leading `~` in configured paths
// ─────────────────────────────────────────────────────────────────────────────

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DiscoverError, Result};
use crate::platform::PlatformCore;
use crate::probe::CompilerConfig;

pub const CONFIG_FILE: &str = "tsuki-discover.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Merged primary translation unit.
    pub sketch:             Option<PathBuf>,
    pub build_dir:          Option<PathBuf>,
    /// Board id ("uno") or FQBN ("arduino:avr:uno").
    pub board:              String,
    /// Overrides the architecture taken from the board.
    pub arch:               Option<String>,
    pub hardware_folders:   Vec<PathBuf>,
    /// Priority order: earlier folders win ambiguous headers.
    pub library_folders:    Vec<PathBuf>,
    /// Append the platform's bundled `libraries/` after the configured folders.
    pub platform_libraries: bool,
    pub compiler:           CompilerConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            sketch:             None,
            build_dir:          None,
            board:              "uno".into(),
            arch:               None,
            hardware_folders:   Vec::new(),
            library_folders:    Vec::new(),
            platform_libraries: true,
            compiler:           CompilerConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| DiscoverError::Config {
            path:   path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&raw, path)
    }

    /// `tsuki-discover.toml` in `dir` if present, defaults otherwise.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(raw: &str, origin: &Path) -> Result<Self> {
        toml::from_str(raw).map_err(|e| DiscoverError::Config {
            path:   origin.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Fill defaults from the environment and expand a leading `~` in every
    /// configured path.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    pub fn apply_env_with(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(sdk) = var("TSUKI_SDK_ROOT").filter(|s| !s.is_empty()) {
            let sdk = PathBuf::from(sdk);
            if !self.hardware_folders.contains(&sdk) {
                self.hardware_folders.insert(0, sdk);
            }
        }
        let home = var("HOME").or_else(|| var("USERPROFILE")).filter(|h| !h.is_empty());
        if self.library_folders.is_empty() {
            if let Some(root) = default_libs_root(var("TSUKI_LIBS_ROOT"), home.clone()) {
                self.library_folders.push(root);
            }
        }

        let Some(home) = home.map(PathBuf::from) else { return };
        for dir in self.hardware_folders.iter_mut().chain(self.library_folders.iter_mut()) {
            *dir = expand_home(dir, &home);
        }
        for path in [&mut self.sketch, &mut self.build_dir].into_iter().flatten() {
            *path = expand_home(path, &home);
        }
    }

    /// Library roots in priority order, platform libraries last.
    pub fn library_roots(&self, platform: &PlatformCore) -> Vec<PathBuf> {
        let mut roots = self.library_folders.clone();
        if self.platform_libraries {
            if let Some(dir) = &platform.libraries_dir {
                if !roots.contains(dir) {
                    roots.push(dir.clone());
                }
            }
        }
        roots
    }
}

/// `~` and `~/…` → under `home`. `~user` forms are left alone.
fn expand_home(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) if rest.as_os_str().is_empty() => home.to_path_buf(),
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Root directory where Arduino libraries are stored.
///
/// Priority:
///   1. `TSUKI_LIBS_ROOT` env var  (explicit override)
///   2. `~/.arduino15/libraries`   (arduino-cli compatible)
fn default_libs_root(explicit: Option<String>, home: Option<String>) -> Option<PathBuf> {
    if let Some(r) = explicit.filter(|r| !r.is_empty()) {
        return Some(PathBuf::from(r));
    }
    home.map(|h| PathBuf::from(h).join(".arduino15").join("libraries"))
}
