//! Debugger Configuration Module
//!
//! This module provides the limits and settings shared by the debugger engine:
//! breakpoint capacity, the dynamic code page size used by compiled
//! expressions, the stack listing line budget and the expression engine limits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Maximum number of breakpoint records
pub const MAX_BREAKPOINTS: usize = 100;

/// Size of one page of dynamic (run-time generated) code in bytes
pub const DYNAMIC_CODE_PAGE_SIZE: usize = 16_384;

/// Size of the line buffer used for each stack listing entry
pub const STACK_LINE_BUFFER_SIZE: usize = 256;

/// Number of line records added each time a source file's line array grows
pub const LINE_RECORD_GROWTH: usize = 1024;

/// Allocation ceiling for a single source file's line records
pub const MAX_LINE_RECORDS: usize = 1 << 22;

/// Default value stack limit for compiled expression units
pub const DEFAULT_MAX_STACK_SIZE: usize = 1024;

/// Default instruction budget for a single compiled expression unit
pub const DEFAULT_MAX_INSTRUCTIONS: usize = 100_000;

/// Errors raised while loading or validating settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The settings file could not be read
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid TOML for [`DebuggerSettings`]
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// A setting has an unusable value
    #[error("Invalid setting `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Character set of the debugger user interface.
///
/// Decides which characters the value formatter may copy verbatim; anything
/// outside the set is written as a `\uXXXX` escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Charset {
    Ascii,
    Latin1,
    #[default]
    Utf8,
}

impl Charset {
    /// Returns true if the character can be displayed in this character set
    pub fn is_mappable(&self, ch: char) -> bool {
        match self {
            Charset::Ascii => (ch as u32) < 0x80,
            Charset::Latin1 => (ch as u32) < 0x100,
            Charset::Utf8 => true,
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Charset::Ascii => write!(f, "ascii"),
            Charset::Latin1 => write!(f, "latin1"),
            Charset::Utf8 => write!(f, "utf8"),
        }
    }
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ascii" | "us-ascii" => Ok(Charset::Ascii),
            "latin1" | "iso-8859-1" => Ok(Charset::Latin1),
            "utf8" | "utf-8" => Ok(Charset::Utf8),
            _ => Err(format!("Unknown character set: {}", s)),
        }
    }
}

/// Limits applied while running a compiled expression unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineLimits {
    /// The maximum number of values on the unit's evaluation stack
    pub max_stack_size: usize,

    /// The maximum number of instructions a unit may execute
    pub max_instructions: usize,
}

impl EngineLimits {
    /// The default engine limits.
    pub const DEFAULT: Self = Self {
        max_stack_size: DEFAULT_MAX_STACK_SIZE,
        max_instructions: DEFAULT_MAX_INSTRUCTIONS,
    };
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Debugger settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerSettings {
    pub max_breakpoints: usize,
    pub dynamic_code_page_size: usize,
    pub stack_line_buffer_size: usize,
    pub max_line_records: usize,
    pub ui_charset: Charset,
    /// Append `[file line N]` to stack listing entries
    pub source_in_stack_listing: bool,
    pub engine: EngineLimits,
}

impl Default for DebuggerSettings {
    fn default() -> Self {
        Self {
            max_breakpoints: MAX_BREAKPOINTS,
            dynamic_code_page_size: DYNAMIC_CODE_PAGE_SIZE,
            stack_line_buffer_size: STACK_LINE_BUFFER_SIZE,
            max_line_records: MAX_LINE_RECORDS,
            ui_charset: Charset::default(),
            source_in_stack_listing: true,
            engine: EngineLimits::default(),
        }
    }
}

impl DebuggerSettings {
    /// Parses settings from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let settings: DebuggerSettings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks that every limit is usable.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_breakpoints == 0 {
            return Err(ConfigError::Invalid {
                name: "max_breakpoints",
                reason: "at least one breakpoint record is required".to_string(),
            });
        }
        if self.dynamic_code_page_size < 16 {
            return Err(ConfigError::Invalid {
                name: "dynamic_code_page_size",
                reason: format!("{} bytes cannot hold a compiled expression", self.dynamic_code_page_size),
            });
        }
        if self.stack_line_buffer_size < 32 {
            return Err(ConfigError::Invalid {
                name: "stack_line_buffer_size",
                reason: format!("{} bytes is too short for a stack entry", self.stack_line_buffer_size),
            });
        }
        if self.engine.max_stack_size == 0 || self.engine.max_instructions == 0 {
            return Err(ConfigError::Invalid {
                name: "engine",
                reason: "engine limits must be positive".to_string(),
            });
        }
        Ok(())
    }
}
