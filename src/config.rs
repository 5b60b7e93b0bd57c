//! Application configuration.
//!
//! The configuration is loaded from `$XDG_CONFIG_HOME/gridpoint/config.json`
//! (falling back to `$HOME/.config`).  Every section is optional, so a
//! minimal `{}` file is valid and a missing file means compiled-in
//! defaults.
//!
//! # Example
//!
//! ```json
//! {
//!   "output": "DP-1",
//!   "grid": { "size": 3, "outline": "#000000", "inner": "#ffffffcc" },
//!   "cut_fraction": 0.5,
//!   "move_fraction": 0.5,
//!   "bindings": {
//!     "h": "cut-left",
//!     "j": "cut-down",
//!     "k": "cut-up",
//!     "l": "cut-right",
//!     "Return": "left-click",
//!     "ctrl+Return": ["left-press"],
//!     "ctrl+BackSpace": ["left-release", "quit"],
//!     "ctrl+j": "scroll-down",
//!     "Escape": "quit"
//!   }
//! }
//! ```
//!
//! Binding keys are xkb keysym names as printed by `xkbcli`, optionally
//! prefixed with modifiers (see [`crate::keys`]), so `"h"` and `"H"`
//! (shifted) are distinct bindings.  A value is one command or a list run
//! in order.  Supplying a `bindings` object replaces the default table
//! entirely.

use crate::command::{Button, Command, Direction};
use crate::keys::{Bindings, KeyBinding, Modifiers};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the output to cover (e.g. `"DP-1"`).  `None` picks the
    /// first output the compositor advertised.
    pub output: Option<String>,

    /// Grid appearance.
    pub grid: GridConfig,

    /// Fraction of the selection kept by a cut.  Default: `0.5`.
    pub cut_fraction: f64,

    /// Fraction of the selection extent a move pans by.  Default: `0.5`.
    pub move_fraction: f64,

    /// `[modifiers+]keysym -> commands`.
    pub bindings: Bindings,
}

/// Largest accepted `grid.size`; a frame paints `size²` cells.
pub const MAX_GRID_SIZE: u32 = 64;

/// Grid appearance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Subdivisions per axis.  Default: `2`.
    pub size: u32,
    /// Colour of the thin outer outline.  Default: opaque black.
    pub outline: Color,
    /// Colour of the scale-sized inner outline.  Default: opaque white.
    pub inner: Color,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            size: 2,
            outline: Color::from_argb(0xff00_0000),
            inner: Color::from_argb(0xffff_ffff),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: None,
            grid: GridConfig::default(),
            cut_fraction: 0.5,
            move_fraction: 0.5,
            bindings: default_bindings(),
        }
    }
}

/// The vi-style default key table.
pub fn default_bindings() -> Bindings {
    [
        ("h", Command::Cut(Direction::Left)),
        ("j", Command::Cut(Direction::Down)),
        ("k", Command::Cut(Direction::Up)),
        ("l", Command::Cut(Direction::Right)),
        ("H", Command::Move(Direction::Left)),
        ("J", Command::Move(Direction::Down)),
        ("K", Command::Move(Direction::Up)),
        ("L", Command::Move(Direction::Right)),
        ("u", Command::Undo),
        ("Return", Command::Click(Button::Left)),
        ("space", Command::Click(Button::Left)),
        ("r", Command::Click(Button::Right)),
        ("m", Command::Click(Button::Middle)),
        ("Escape", Command::Quit),
    ]
    .into_iter()
    .map(|(key, cmd)| (KeyBinding::new(Modifiers::empty(), key), vec![cmd]))
    .collect()
}

impl Config {
    /// Load and validate configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the navigator cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.size == 0 {
            return Err(ConfigError::Invalid("grid.size must be at least 1".into()));
        }
        if self.grid.size > MAX_GRID_SIZE {
            return Err(ConfigError::Invalid(format!(
                "grid.size must be at most {}, got {}",
                MAX_GRID_SIZE, self.grid.size
            )));
        }
        for (name, value) in [
            ("cut_fraction", self.cut_fraction),
            ("move_fraction", self.move_fraction),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Error from loading, parsing or validating a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Whether the error only means "there is no config file".
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

//  Colours

/// A straight-alpha ARGB colour.
///
/// Written in the config as `"#rrggbb"` (opaque) or `"#rrggbbaa"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Color {
    /// Build a colour from a packed `0xAARRGGBB` value.
    pub const fn from_argb(argb: u32) -> Self {
        Self {
            alpha: (argb >> 24) as u8,
            red: (argb >> 16) as u8,
            green: (argb >> 8) as u8,
            blue: argb as u8,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let hex = s.trim().strip_prefix('#')?;
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            6 => Some(Self {
                red: byte(0)?,
                green: byte(2)?,
                blue: byte(4)?,
                alpha: 0xff,
            }),
            8 => Some(Self {
                red: byte(0)?,
                green: byte(2)?,
                blue: byte(4)?,
                alpha: byte(6)?,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.red, self.green, self.blue, self.alpha
        )
    }
}

impl Serialize for Color {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Color::parse(&s).ok_or_else(|| {
            DeError::custom(format!("invalid colour {:?}, expected #rrggbb or #rrggbbaa", s))
        })
    }
}
