// ─────────────────────────────────────────────────────────────────────────────
//  tsuki-discover :: board  —  board catalog used to pick the target arch
// ─────────────────────────────────────────────────────────────────────────────

use std::fmt;

use crate::error::{DiscoverError, Result};

/// ARDUINO=10819 → 1.8.19 (what most libs expect)
pub const ARDUINO_VERSION: &str = "10819";

#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    pub id:      String,
    pub name:    String,
    pub fqbn:    String,
    /// Architecture matched against `architectures=` in library.properties.
    pub arch:    String,
    /// pins_arduino.h variant folder
    pub variant: String,
    /// `-mmcu` value, AVR only.
    pub mcu:     Option<String>,
    pub f_cpu:   u32,
    /// Compile-time defines specific to this board
    pub defines: Vec<String>,
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.fqbn)
    }
}

struct BoardSpec {
    id:      &'static str,
    name:    &'static str,
    fqbn:    &'static str,
    variant: &'static str,
    mcu:     Option<&'static str>,
    f_cpu:   u32,
    defines: &'static [&'static str],
}

impl BoardSpec {
    fn arch(&self) -> &'static str {
        self.fqbn.split(':').nth(1).unwrap_or("")
    }

    fn to_board(&self) -> Board {
        Board {
            id:      self.id.into(),
            name:    self.name.into(),
            fqbn:    self.fqbn.into(),
            arch:    self.arch().into(),
            variant: self.variant.into(),
            mcu:     self.mcu.map(str::to_owned),
            f_cpu:   self.f_cpu,
            defines: self.defines.iter().map(|d| d.to_string()).collect(),
        }
    }
}

impl Board {
    /// All catalog boards, in table order.
    pub fn catalog() -> Vec<Board> {
        BOARDS.iter().map(BoardSpec::to_board).collect()
    }

    /// Find a board by short ID (case-insensitive) or by FQBN.
    ///
    /// FQBNs missing from the table (`vendor:arch:board[:options]`) still
    /// resolve, with the `standard` variant and no MCU flags.
    pub fn find(id: &str) -> Result<Board> {
        if let Some(spec) = BOARDS.iter().find(|b| b.id.eq_ignore_ascii_case(id)) {
            return Ok(spec.to_board());
        }

        let parts: Vec<&str> = id.split(':').collect();
        if parts.len() < 3 || parts[..3].iter().any(|p| p.is_empty()) {
            return Err(DiscoverError::UnknownBoard(id.to_owned()));
        }
        let base = parts[..3].join(":");

        if let Some(spec) = BOARDS.iter().find(|b| b.fqbn == id || b.fqbn == base) {
            let mut board = spec.to_board();
            board.fqbn = id.to_owned();
            return Ok(board);
        }

        Ok(Board {
            id:      parts[2].to_owned(),
            name:    parts[2].to_owned(),
            fqbn:    id.to_owned(),
            arch:    parts[1].to_owned(),
            variant: "standard".into(),
            mcu:     None,
            f_cpu:   0,
            defines: Vec::new(),
        })
    }

    /// FQBN vendor field, e.g. "arduino" for `arduino:avr:uno`.
    pub fn vendor(&self) -> &str {
        self.fqbn.split(':').next().unwrap_or("")
    }

    /// Board flags appended to the compiler base flags for the include probe.
    pub fn probe_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if let Some(mcu) = &self.mcu {
            flags.push(format!("-mmcu={}", mcu));
        }
        if self.f_cpu > 0 {
            flags.push(format!("-DF_CPU={}L", self.f_cpu));
        }
        flags.push(format!("-DARDUINO={}", ARDUINO_VERSION));

        let arch_define = format!("ARDUINO_ARCH_{}", self.arch.to_uppercase());
        if !self.defines.iter().any(|d| *d == arch_define) {
            flags.push(format!("-D{}", arch_define));
        }
        for d in &self.defines {
            flags.push(format!("-D{}", d));
        }
        flags
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Static board table
// ─────────────────────────────────────────────────────────────────────────────

static BOARDS: &[BoardSpec] = &[
    // ── AVR ───────────────────────────────────────────────────────────────────
    BoardSpec {
        id: "uno", name: "Arduino Uno",
        fqbn: "arduino:avr:uno", variant: "standard",
        mcu: Some("atmega328p"), f_cpu: 16_000_000,
        defines: &["ARDUINO_AVR_UNO", "ARDUINO_ARCH_AVR"],
    },
    BoardSpec {
        id: "nano", name: "Arduino Nano",
        fqbn: "arduino:avr:nano", variant: "eightanaloginputs",
        mcu: Some("atmega328p"), f_cpu: 16_000_000,
        defines: &["ARDUINO_AVR_NANO", "ARDUINO_ARCH_AVR"],
    },
    BoardSpec {
        id: "mega", name: "Arduino Mega 2560",
        fqbn: "arduino:avr:mega", variant: "mega",
        mcu: Some("atmega2560"), f_cpu: 16_000_000,
        defines: &["ARDUINO_AVR_MEGA2560", "ARDUINO_ARCH_AVR"],
    },
    BoardSpec {
        id: "leonardo", name: "Arduino Leonardo",
        fqbn: "arduino:avr:leonardo", variant: "leonardo",
        mcu: Some("atmega32u4"), f_cpu: 16_000_000,
        defines: &["ARDUINO_AVR_LEONARDO", "ARDUINO_ARCH_AVR", "USB_VID=0x2341", "USB_PID=0x8036"],
    },
    BoardSpec {
        id: "micro", name: "Arduino Micro",
        fqbn: "arduino:avr:micro", variant: "micro",
        mcu: Some("atmega32u4"), f_cpu: 16_000_000,
        defines: &["ARDUINO_AVR_MICRO", "ARDUINO_ARCH_AVR", "USB_VID=0x2341", "USB_PID=0x8037"],
    },
    BoardSpec {
        id: "pro_mini_3v3", name: "Arduino Pro Mini 3.3V",
        fqbn: "arduino:avr:pro", variant: "eightanaloginputs",
        mcu: Some("atmega328p"), f_cpu: 8_000_000,
        defines: &["ARDUINO_AVR_PRO", "ARDUINO_ARCH_AVR"],
    },
    // ── ARM SAM ───────────────────────────────────────────────────────────────
    BoardSpec {
        id: "due", name: "Arduino Due",
        fqbn: "arduino:sam:arduino_due_x", variant: "arduino_due_x",
        mcu: None, f_cpu: 84_000_000,
        defines: &["ARDUINO_SAM_DUE", "ARDUINO_ARCH_SAM", "__SAM3X8E__"],
    },
    // ── RP2040 ────────────────────────────────────────────────────────────────
    BoardSpec {
        id: "pico", name: "Raspberry Pi Pico",
        fqbn: "rp2040:rp2040:rpipico", variant: "rpipico",
        mcu: None, f_cpu: 133_000_000,
        defines: &["ARDUINO_RASPBERRY_PI_PICO", "ARDUINO_ARCH_RP2040"],
    },
    // ── ESP32 / ESP8266 ───────────────────────────────────────────────────────
    BoardSpec {
        id: "esp32", name: "ESP32 Dev Module",
        fqbn: "esp32:esp32:esp32", variant: "esp32",
        mcu: None, f_cpu: 240_000_000,
        defines: &["ARDUINO_ESP32_DEV", "ARDUINO_ARCH_ESP32", "ESP32"],
    },
    BoardSpec {
        id: "esp8266", name: "ESP8266 Generic",
        fqbn: "esp8266:esp8266:generic", variant: "generic",
        mcu: None, f_cpu: 80_000_000,
        defines: &["ARDUINO_ESP8266_GENERIC", "ARDUINO_ARCH_ESP8266", "ESP8266"],
    },
    BoardSpec {
        id: "d1_mini", name: "Wemos D1 Mini",
        fqbn: "esp8266:esp8266:d1_mini", variant: "d1_mini",
        mcu: None, f_cpu: 80_000_000,
        defines: &["ARDUINO_ESP8266_WEMOS_D1MINI", "ARDUINO_ARCH_ESP8266", "ESP8266"],
    },
];
