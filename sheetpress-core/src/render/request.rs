//! Render request and result types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageFormat {
    #[default]
    #[serde(alias = "a4")]
    A4,
    #[serde(alias = "a3")]
    A3,
    #[serde(alias = "letter")]
    Letter,
}

impl PageFormat {
    /// Portrait width and height in millimetres
    pub fn size_mm(self) -> (f64, f64) {
        match self {
            PageFormat::A4 => (210.0, 297.0),
            PageFormat::A3 => (297.0, 420.0),
            PageFormat::Letter => (215.9, 279.4),
        }
    }
}

impl fmt::Display for PageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PageFormat::A4 => "A4",
            PageFormat::A3 => "A3",
            PageFormat::Letter => "Letter",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    #[default]
    Landscape,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    High,
    Medium,
    Low,
}

/// CSS lengths, e.g. `15mm`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margin {
    pub top: String,
    pub right: String,
    pub bottom: String,
    pub left: String,
}

impl Margin {
    pub fn uniform(length: impl Into<String>) -> Self {
        let length = length.into();
        Self {
            top: length.clone(),
            right: length.clone(),
            bottom: length.clone(),
            left: length,
        }
    }
}

impl Default for Margin {
    fn default() -> Self {
        Margin::uniform("15mm")
    }
}

/// Parse a CSS length into millimetres; `px` assumes 96 dpi
pub fn length_to_mm(length: &str) -> Option<f64> {
    let length = length.trim();
    let split = length
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(length.len());
    let (number, unit) = length.split_at(split);
    let value: f64 = number.trim().parse().ok()?;
    let factor = match unit {
        "mm" => 1.0,
        "cm" => 10.0,
        "in" => 25.4,
        "pt" => 25.4 / 72.0,
        "px" => 25.4 / 96.0,
        "" if value == 0.0 => 1.0,
        _ => return None,
    };
    Some(value * factor)
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Everything one conversion needs. Never mutated once handed to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub page_format: PageFormat,
    pub orientation: Orientation,
    pub quality: Quality,
    /// Only these sheets, when set
    pub include_sheets: Option<Vec<String>>,
    pub exclude_sheets: Option<Vec<String>>,
    pub watermark: Option<String>,
    pub margin: Margin,
    /// Budget for a whole attempt
    pub timeout: Duration,
    /// Budget for the engine to load the document before printing
    pub load_timeout: Duration,
    /// Attempts per engine
    pub max_retries: u32,
}

impl RenderRequest {
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source.into(),
            output_path: output.into(),
            page_format: PageFormat::default(),
            orientation: Orientation::default(),
            quality: Quality::default(),
            include_sheets: None,
            exclude_sheets: None,
            watermark: None,
            margin: Margin::default(),
            timeout: DEFAULT_TIMEOUT,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Same options against another source and output
    pub fn retarget(&self, source: &Path, output: &Path) -> Self {
        Self {
            source_path: source.to_path_buf(),
            output_path: output.to_path_buf(),
            ..self.clone()
        }
    }

    /// Page size in millimetres after applying the orientation
    pub fn page_size_mm(&self) -> (f64, f64) {
        let (w, h) = self.page_format.size_mm();
        match self.orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }

    /// Sheet names that pass the include filter, then the exclude filter
    pub fn filter_sheets<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        names
            .into_iter()
            .filter(|name| {
                self.include_sheets
                    .as_ref()
                    .filter(|list| !list.is_empty())
                    .is_none_or(|list| list.iter().any(|n| n == name))
            })
            .filter(|name| {
                !self
                    .exclude_sheets
                    .as_ref()
                    .is_some_and(|list| list.iter().any(|n| n == name))
            })
            .map(str::to_string)
            .collect()
    }
}

/// Final state of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Pending,
    Converting,
    Validating,
    Succeeded,
    FailedRetryable,
    FailedFatal,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttemptState::Pending => "pending",
            AttemptState::Converting => "converting",
            AttemptState::Validating => "validating",
            AttemptState::Succeeded => "succeeded",
            AttemptState::FailedRetryable => "failed (retryable)",
            AttemptState::FailedFatal => "failed (fatal)",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub engine: String,
    /// 1-based within the engine
    pub attempt: u32,
    pub state: AttemptState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub elapsed_ms: u64,
}

/// A validated PDF and how it was obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderResult {
    pub output_path: PathBuf,
    pub sheet_count: usize,
    pub sheet_names: Vec<String>,
    pub byte_size: u64,
    pub elapsed_ms: u64,
    pub engine_used: String,
    /// Attempts across every engine, including the successful one
    pub attempts: u32,
    pub attempt_log: Vec<AttemptRecord>,
    pub warnings: Vec<String>,
}
