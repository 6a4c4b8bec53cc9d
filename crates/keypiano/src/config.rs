//! Configuration file support for keypiano
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/keypiano/config.toml`
//! - macOS: `~/Library/Application Support/keypiano/config.toml`
//! - Windows: `%APPDATA%\keypiano\config.toml`
//!
//! The file only seeds the session. Layout, mode and waveform changes made
//! while playing are never written back.

use crate::error::{Error, Result};
use crate::keyboard::{KeyboardLayout, PlayMode, VirtualKeyboard};
use crate::synth::Waveform;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = r#"# keypiano configuration file

[piano]
# Keyboard layout: "qwerty" (Y plays G#) or "qwertz" (Z plays G#)
layout = "qwerty"

# Play mode: "simple" (white keys only) or "advanced" (white and black keys)
mode = "simple"

# Oscillator: "sine", "square", "sawtooth" or "triangle"
waveform = "sine"

[audio]
# Output device name, see `keypiano list-devices`
# Leave unset to use the system default
# device = "default"

[theme]
# Colors for the keyboard display
white_key_color = "white"
black_key_color = "dark_gray"
pressed_key_color = "cyan"
border_color = "cyan"

# Show note names on keys
show_note_names = true

# Show keyboard shortcuts help
show_help = true
"#;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial session selectors
    pub piano: PianoSettings,
    /// Audio output
    pub audio: AudioSettings,
    /// UI/Theme configuration
    pub theme: Theme,
}

impl Config {
    /// Load configuration from the default config file location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Err(Error::Config(format!("Config file not found at {:?}", path)))
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        log::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration or return default if not found
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default config file location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "keypiano") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Err(Error::Config("Could not determine config directory".to_string()))
        }
    }

    /// Create a default config file with comments
    pub fn create_default_config_file() -> Result<PathBuf> {
        let path = Self::config_path()?;
        Self::write_default_config(&path)?;
        Ok(path)
    }

    /// Write the commented default config to `path`
    pub fn write_default_config(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_CONFIG)?;
        Ok(())
    }

    /// Build the keyboard state the session starts with
    pub fn to_virtual_keyboard(&self) -> VirtualKeyboard {
        VirtualKeyboard::new(self.piano.layout, self.piano.mode, self.piano.waveform)
    }
}

/// Initial layout, mode and waveform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PianoSettings {
    /// Which key plays G#
    pub layout: KeyboardLayout,
    /// Whether black keys are shown
    pub mode: PlayMode,
    /// Oscillator for new notes
    pub waveform: Waveform,
}

/// Audio output settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Output device name (None = system default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Theme/UI settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    /// White key color
    pub white_key_color: String,
    /// Black key color
    pub black_key_color: String,
    /// Pressed key color
    pub pressed_key_color: String,
    /// Border color
    pub border_color: String,
    /// Show note names on keys
    pub show_note_names: bool,
    /// Show help text
    pub show_help: bool,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            white_key_color: "white".to_string(),
            black_key_color: "dark_gray".to_string(),
            pressed_key_color: "cyan".to_string(),
            border_color: "cyan".to_string(),
            show_note_names: true,
            show_help: true,
        }
    }
}

impl Theme {
    /// Parse a color string to ratatui Color
    pub fn parse_color(s: &str) -> ratatui::style::Color {
        use ratatui::style::Color;
        match s.to_lowercase().as_str() {
            "black" => Color::Black,
            "red" => Color::Red,
            "green" => Color::Green,
            "yellow" => Color::Yellow,
            "blue" => Color::Blue,
            "magenta" => Color::Magenta,
            "cyan" => Color::Cyan,
            "gray" | "grey" => Color::Gray,
            "dark_gray" | "dark_grey" | "darkgray" | "darkgrey" => Color::DarkGray,
            "light_red" | "lightred" => Color::LightRed,
            "light_green" | "lightgreen" => Color::LightGreen,
            "light_yellow" | "lightyellow" => Color::LightYellow,
            "light_blue" | "lightblue" => Color::LightBlue,
            "light_magenta" | "lightmagenta" => Color::LightMagenta,
            "light_cyan" | "lightcyan" => Color::LightCyan,
            "white" => Color::White,
            s if s.starts_with('#') && s.len() == 7 => {
                match (
                    u8::from_str_radix(&s[1..3], 16),
                    u8::from_str_radix(&s[3..5], 16),
                    u8::from_str_radix(&s[5..7], 16),
                ) {
                    (Ok(r), Ok(g), Ok(b)) => Color::Rgb(r, g, b),
                    _ => Color::White,
                }
            }
            _ => Color::White,
        }
    }

    pub fn white_key(&self) -> ratatui::style::Color {
        Self::parse_color(&self.white_key_color)
    }

    pub fn black_key(&self) -> ratatui::style::Color {
        Self::parse_color(&self.black_key_color)
    }

    pub fn pressed_key(&self) -> ratatui::style::Color {
        Self::parse_color(&self.pressed_key_color)
    }

    pub fn border(&self) -> ratatui::style::Color {
        Self::parse_color(&self.border_color)
    }
}
