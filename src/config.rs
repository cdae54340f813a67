//! Configuration and color scheme management for ideterm.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.ideterm/config.toml`
//! - Built-in color schemes (default, tokyo-night, solarized-dark, dracula)
//! - Runtime theme switching
//!
//! # Configuration File
//!
//! Every field is optional:
//!
//! ```toml
//! # Color scheme: default, tokyo-night, solarized-dark, dracula
//! color_scheme = "tokyo-night"
//!
//! [terminal]
//! scrollback = 1000
//! collapsed_rows = 10
//! settle_delay_ms = 250
//! start_expanded = false
//!
//! [router]
//! mode = "translate"          # or "direct"
//! execution_url = "http://127.0.0.1:3000/api/terminal"
//! command_marker = "$"
//! request_timeout_secs = 30
//!
//! [translator]
//! endpoint = "https://api.deepinfra.com/v1/openai/chat/completions"
//! model = "Qwen/Qwen2.5-72B-Instruct"
//! temperature = 0.3
//! max_tokens = 100
//! api_key = "..."
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core::remote::DEFAULT_SYSTEM_PROMPT;
use crate::core::router::DEFAULT_COMMAND_MARKER;

pub const DEFAULT_EXECUTION_URL: &str = "http://127.0.0.1:3000/api/terminal";
pub const DEFAULT_TRANSLATOR_ENDPOINT: &str = "https://api.deepinfra.com/v1/openai/chat/completions";
pub const DEFAULT_MODEL: &str = "Qwen/Qwen2.5-72B-Instruct";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Color scheme name
    pub color_scheme: String,
    pub terminal: TerminalConfig,
    pub router: RouterConfig,
    pub translator: TranslatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            color_scheme: "tokyo-night".to_string(),
            terminal: TerminalConfig::default(),
            router: RouterConfig::default(),
            translator: TranslatorConfig::default(),
        }
    }
}

/// Terminal panel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Lines kept above the visible grid
    pub scrollback: usize,
    /// Panel height (header included) while collapsed
    pub collapsed_rows: u16,
    /// Delay before the fit that follows expand/collapse
    pub settle_delay_ms: u64,
    pub start_expanded: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            scrollback: crate::core::term::DEFAULT_SCROLLBACK,
            collapsed_rows: 10,
            settle_delay_ms: 250,
            start_expanded: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterMode {
    /// Lines go straight to the execution endpoint
    Direct,
    /// Lines are translated into a shell command first
    Translate,
}

/// Routing of submitted lines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub mode: RouterMode,
    pub execution_url: String,
    /// Prefix a translated reply must start with
    pub command_marker: String,
    pub request_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mode: RouterMode::Direct,
            execution_url: DEFAULT_EXECUTION_URL.to_string(),
            command_marker: DEFAULT_COMMAND_MARKER.to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Chat-completion endpoint used in translate mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub endpoint: String,
    pub model: String,
    pub system_prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub api_key: Option<String>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_TRANSLATOR_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: Some(0.3),
            max_tokens: Some(100),
            api_key: None,
        }
    }
}

impl Config {
    /// Load from `~/.ideterm/config.toml`, falling back to defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_or_default(&path),
            None => Self::default(),
        }
    }

    /// Load from `path`; an unreadable or invalid file yields defaults
    pub fn load_or_default(path: &Path) -> Self {
        Self::load_from(path).unwrap_or_else(|e| {
            warn!("{}; using defaults", e);
            Self::default()
        })
    }

    /// Load from `path`. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `~/.ideterm`, created on first use
    pub fn config_dir() -> Option<PathBuf> {
        let dir = home_dir()?.join(".ideterm");
        if !dir.exists() {
            let _ = fs::create_dir_all(&dir);
        }
        Some(dir)
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("ideterm.log"))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.terminal.settle_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.router.request_timeout_secs.max(1))
    }

    /// Get the color scheme
    pub fn get_color_scheme(&self) -> ColorScheme {
        ColorScheme::by_name(&self.color_scheme)
    }
}

/// Color definition (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(&self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Color scheme definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorScheme {
    pub name: &'static str,

    // Title bar
    pub title_bg: Color,
    pub title_fg: Color,

    // Empty workspace above the panel
    pub workspace_bg: Color,
    pub workspace_fg: Color,

    // Panel header
    pub header_bg: Color,
    pub header_fg: Color,
    pub header_accent: Color,

    // Terminal grid
    pub terminal_bg: Color,
    pub terminal_fg: Color,
    pub cursor: Color,

    /// Indexed colors 0-15
    pub ansi: [Color; 16],
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::default_scheme()
    }
}

impl ColorScheme {
    /// Default color scheme
    pub fn default_scheme() -> Self {
        Self {
            name: "default",

            title_bg: Color::new(40, 40, 40),
            title_fg: Color::new(200, 200, 200),

            workspace_bg: Color::new(30, 30, 30),
            workspace_fg: Color::new(110, 110, 110),

            header_bg: Color::new(60, 60, 60),
            header_fg: Color::new(220, 220, 220),
            header_accent: Color::new(100, 150, 255),

            terminal_bg: Color::new(0, 0, 0),
            terminal_fg: Color::new(204, 204, 204),
            cursor: Color::new(255, 255, 255),

            ansi: [
                Color::new(0, 0, 0),
                Color::new(205, 0, 0),
                Color::new(0, 205, 0),
                Color::new(205, 205, 0),
                Color::new(0, 0, 238),
                Color::new(205, 0, 205),
                Color::new(0, 205, 205),
                Color::new(229, 229, 229),
                Color::new(127, 127, 127),
                Color::new(255, 0, 0),
                Color::new(0, 255, 0),
                Color::new(255, 255, 0),
                Color::new(92, 92, 255),
                Color::new(255, 0, 255),
                Color::new(0, 255, 255),
                Color::new(255, 255, 255),
            ],
        }
    }

    /// Tokyo Night scheme
    pub fn tokyo_night() -> Self {
        Self {
            name: "tokyo-night",

            title_bg: Color::new(22, 22, 30),
            title_fg: Color::new(169, 177, 214),

            workspace_bg: Color::new(36, 40, 59),
            workspace_fg: Color::new(86, 95, 137),

            header_bg: Color::new(41, 46, 66),
            header_fg: Color::new(192, 202, 245),
            header_accent: Color::new(122, 162, 247),

            terminal_bg: Color::new(26, 27, 38),
            terminal_fg: Color::new(169, 177, 214),
            cursor: Color::new(192, 202, 245),

            ansi: [
                Color::new(50, 52, 74),
                Color::new(247, 118, 142),
                Color::new(158, 206, 106),
                Color::new(224, 175, 104),
                Color::new(122, 162, 247),
                Color::new(173, 142, 230),
                Color::new(68, 157, 171),
                Color::new(120, 124, 153),
                Color::new(68, 75, 106),
                Color::new(255, 122, 147),
                Color::new(185, 242, 124),
                Color::new(255, 158, 100),
                Color::new(125, 166, 255),
                Color::new(187, 154, 247),
                Color::new(13, 185, 215),
                Color::new(172, 176, 208),
            ],
        }
    }

    /// Solarized Dark scheme
    pub fn solarized_dark() -> Self {
        Self {
            name: "solarized-dark",

            title_bg: Color::new(7, 54, 66),
            title_fg: Color::new(147, 161, 161),

            workspace_bg: Color::new(0, 43, 54),
            workspace_fg: Color::new(88, 110, 117),

            header_bg: Color::new(7, 54, 66),
            header_fg: Color::new(238, 232, 213),
            header_accent: Color::new(38, 139, 210),

            terminal_bg: Color::new(0, 43, 54),
            terminal_fg: Color::new(131, 148, 150),
            cursor: Color::new(147, 161, 161),

            ansi: [
                Color::new(7, 54, 66),
                Color::new(220, 50, 47),
                Color::new(133, 153, 0),
                Color::new(181, 137, 0),
                Color::new(38, 139, 210),
                Color::new(211, 54, 130),
                Color::new(42, 161, 152),
                Color::new(238, 232, 213),
                Color::new(0, 43, 54),
                Color::new(203, 75, 22),
                Color::new(88, 110, 117),
                Color::new(101, 123, 131),
                Color::new(131, 148, 150),
                Color::new(108, 113, 196),
                Color::new(147, 161, 161),
                Color::new(253, 246, 227),
            ],
        }
    }

    /// Dracula scheme
    pub fn dracula() -> Self {
        Self {
            name: "dracula",

            title_bg: Color::new(33, 34, 44),
            title_fg: Color::new(248, 248, 242),

            workspace_bg: Color::new(40, 42, 54),
            workspace_fg: Color::new(98, 114, 164),

            header_bg: Color::new(68, 71, 90),
            header_fg: Color::new(248, 248, 242),
            header_accent: Color::new(189, 147, 249),

            terminal_bg: Color::new(40, 42, 54),
            terminal_fg: Color::new(248, 248, 242),
            cursor: Color::new(248, 248, 242),

            ansi: [
                Color::new(33, 34, 44),
                Color::new(255, 85, 85),
                Color::new(80, 250, 123),
                Color::new(241, 250, 140),
                Color::new(189, 147, 249),
                Color::new(255, 121, 198),
                Color::new(139, 233, 253),
                Color::new(248, 248, 242),
                Color::new(98, 114, 164),
                Color::new(255, 110, 110),
                Color::new(105, 255, 148),
                Color::new(255, 255, 165),
                Color::new(214, 172, 255),
                Color::new(255, 146, 223),
                Color::new(164, 255, 255),
                Color::new(255, 255, 255),
            ],
        }
    }

    /// Look up a scheme by name or alias
    pub fn find(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "default" => Some(Self::default_scheme()),
            "tokyo-night" | "tokyo_night" | "tokyonight" => Some(Self::tokyo_night()),
            "solarized-dark" | "solarized_dark" | "solarized" => Some(Self::solarized_dark()),
            "dracula" => Some(Self::dracula()),
            _ => None,
        }
    }

    /// Get scheme by name, falling back to the default scheme
    pub fn by_name(name: &str) -> Self {
        Self::find(name).unwrap_or_else(|| {
            warn!("Unknown color scheme '{}'; using default", name);
            Self::default_scheme()
        })
    }

    /// List available schemes
    pub fn list() -> Vec<&'static str> {
        vec!["default", "tokyo-night", "solarized-dark", "dracula"]
    }

    /// The scheme after this one in [`ColorScheme::list`], wrapping around
    pub fn next(&self) -> Self {
        let names = Self::list();
        let index = names.iter().position(|n| *n == self.name).unwrap_or(0);
        Self::by_name(names[(index + 1) % names.len()])
    }

    /// Palette entry for an indexed color; 16-255 fall back to `None`
    pub fn ansi(&self, index: u8) -> Option<Color> {
        self.ansi.get(index as usize).copied()
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config.router.mode, RouterMode::Direct);
        assert_eq!(config.router.execution_url, DEFAULT_EXECUTION_URL);
        assert_eq!(config.terminal.scrollback, 1000);
        assert_eq!(config.settle_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let file = write_config(
            r#"
            color_scheme = "dracula"

            [router]
            mode = "translate"
            command_marker = ">"

            [translator]
            api_key = "secret"
            max_tokens = 50
            "#,
        );

        let config = Config::load_from(file.path()).unwrap();

        assert_eq!(config.get_color_scheme().name, "dracula");
        assert_eq!(config.router.mode, RouterMode::Translate);
        assert_eq!(config.router.command_marker, ">");
        assert_eq!(config.router.request_timeout_secs, 30);
        assert_eq!(config.translator.api_key.as_deref(), Some("secret"));
        assert_eq!(config.translator.max_tokens, Some(50));
        assert_eq!(config.translator.model, DEFAULT_MODEL);
        assert_eq!(config.terminal.collapsed_rows, 10);
    }

    #[test]
    fn test_invalid_file_is_reported_and_defaulted() {
        let file = write_config("[router]\nmode = \"sideways\"\n");

        assert!(matches!(
            Config::load_from(file.path()),
            Err(ConfigError::Parse { .. })
        ));
        assert_eq!(
            Config::load_or_default(file.path()).router.mode,
            RouterMode::Direct
        );
    }

    #[test]
    fn test_scheme_lookup_and_cycle() {
        assert_eq!(ColorScheme::by_name("TokyoNight").name, "tokyo-night");
        assert_eq!(ColorScheme::by_name("unknown").name, "default");
        assert!(ColorScheme::find("unknown").is_none());
        assert!(ColorScheme::list().iter().all(|n| ColorScheme::find(n).is_some()));

        let mut scheme = ColorScheme::default_scheme();
        let mut seen = Vec::new();
        for _ in 0..ColorScheme::list().len() {
            scheme = scheme.next();
            seen.push(scheme.name);
        }
        assert_eq!(seen, ["tokyo-night", "solarized-dark", "dracula", "default"]);
    }

    #[test]
    fn test_ansi_palette_lookup() {
        let scheme = ColorScheme::tokyo_night();
        assert_eq!(scheme.ansi(1), Some(Color::new(247, 118, 142)));
        assert_eq!(scheme.ansi(15), Some(Color::new(172, 176, 208)));
        assert_eq!(scheme.ansi(16), None);
    }
}
