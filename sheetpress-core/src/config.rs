//! `sheetpress.toml` loading and the defaults behind it

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::render::engine::{
    ChromiumEngine, ENGINE_NAMES, MockEngine, RenderEngine, WkhtmltopdfEngine,
};
use crate::render::request::{
    DEFAULT_LOAD_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT, Margin, Orientation, PageFormat,
    Quality, RenderRequest,
};
use crate::render::Orchestrator;
use crate::writer::SheetSelector;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PressConfig {
    #[serde(default)]
    pub strip: StripConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub engines: EnginesConfig,
    /// Delay before intermediate files are deleted
    #[serde(default)]
    pub cleanup_grace_ms: u64,
}

impl PressConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: PressConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// `path` when given, else `sheetpress.toml` in the working directory if present, else defaults
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let local = Path::new("sheetpress.toml");
                if local.is_file() {
                    Self::from_file(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.render.max_retries == 0 {
            bail!("Configuration error: render.max_retries must be at least 1");
        }
        if self.render.engines.is_empty() {
            bail!("Configuration error: render.engines must name at least one engine");
        }
        for name in &self.render.engines {
            if !ENGINE_NAMES.contains(&name.as_str()) {
                bail!(
                    "Configuration error: Unknown engine '{}' in render.engines (expected one of {})",
                    name,
                    ENGINE_NAMES.join(", ")
                );
            }
        }
        if self.render.engines.iter().any(|n| n == "remote") && self.engines.remote.url.is_none() {
            bail!("Configuration error: engine 'remote' requires engines.remote.url");
        }
        if self.strip.prefix.is_empty() {
            bail!("Configuration error: strip.prefix must not be empty");
        }
        Ok(())
    }

    /// Selector removing sheets whose name starts with `strip.prefix`
    pub fn strip_selector(&self) -> SheetSelector {
        if self.strip.case_insensitive {
            SheetSelector::PrefixIgnoreCase(self.strip.prefix.clone())
        } else {
            SheetSelector::Prefix(self.strip.prefix.clone())
        }
    }

    /// Request template carrying the `[render]` options
    pub fn render_request(&self, source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> RenderRequest {
        let render = &self.render;
        let mut request = RenderRequest::new(source, output);
        request.page_format = render.page_format;
        request.orientation = render.orientation;
        request.quality = render.quality;
        request.max_retries = render.max_retries;
        request.timeout = Duration::from_millis(render.timeout_ms);
        request.load_timeout = Duration::from_millis(render.load_timeout_ms);
        request.watermark = render.watermark.clone();
        request.margin = render.margin.clone();
        request
    }

    /// Engines for `names`, in order, configured from `[engines.*]`
    pub fn build_engines(&self, names: &[String]) -> Result<Vec<Box<dyn RenderEngine>>> {
        names.iter().map(|name| self.build_engine(name)).collect()
    }

    /// Orchestrator over `render.engines`
    pub fn orchestrator(&self) -> Result<Orchestrator> {
        Ok(Orchestrator::new(self.build_engines(&self.render.engines)?))
    }

    pub fn cleanup_grace(&self) -> Duration {
        Duration::from_millis(self.cleanup_grace_ms)
    }

    fn build_engine(&self, name: &str) -> Result<Box<dyn RenderEngine>> {
        let engine: Box<dyn RenderEngine> = match name {
            "chromium" => {
                let chromium = &self.engines.chromium;
                let mut engine = ChromiumEngine::new().with_args(chromium.extra_args.iter().cloned());
                if let Some(binary) = &chromium.binary {
                    engine = engine.with_binary(binary);
                }
                Box::new(engine)
            }
            "wkhtmltopdf" => match &self.engines.wkhtmltopdf.binary {
                Some(binary) => Box::new(WkhtmltopdfEngine::new().with_binary(binary)),
                None => Box::new(WkhtmltopdfEngine::new()),
            },
            "remote" => self.remote_engine()?,
            "mock" => Box::new(MockEngine::new()),
            other => bail!(
                "Unknown engine '{}' (expected one of {})",
                other,
                ENGINE_NAMES.join(", ")
            ),
        };
        Ok(engine)
    }

    #[cfg(feature = "remote-engine")]
    fn remote_engine(&self) -> Result<Box<dyn RenderEngine>> {
        let url = self
            .engines
            .remote
            .url
            .as_deref()
            .context("engine 'remote' requires engines.remote.url")?;
        Ok(Box::new(crate::render::engine::RemoteEngine::new(url)))
    }

    #[cfg(not(feature = "remote-engine"))]
    fn remote_engine(&self) -> Result<Box<dyn RenderEngine>> {
        bail!("engine 'remote' needs the remote-engine feature")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub case_insensitive: bool,
}

impl Default for StripConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            case_insensitive: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub page_format: PageFormat,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
    /// Tried in this order
    #[serde(default = "default_engines")]
    pub engines: Vec<String>,
    #[serde(default)]
    pub watermark: Option<String>,
    #[serde(default)]
    pub margin: Margin,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            page_format: PageFormat::default(),
            orientation: Orientation::default(),
            quality: Quality::default(),
            max_retries: default_max_retries(),
            timeout_ms: default_timeout_ms(),
            load_timeout_ms: default_load_timeout_ms(),
            engines: default_engines(),
            watermark: None,
            margin: Margin::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnginesConfig {
    #[serde(default)]
    pub chromium: ChromiumConfig,
    #[serde(default)]
    pub wkhtmltopdf: WkhtmltopdfConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChromiumConfig {
    /// Explicit executable instead of a `PATH` search
    #[serde(default)]
    pub binary: Option<PathBuf>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WkhtmltopdfConfig {
    #[serde(default)]
    pub binary: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub url: Option<String>,
}

fn default_prefix() -> String {
    "Input".to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_load_timeout_ms() -> u64 {
    DEFAULT_LOAD_TIMEOUT.as_millis() as u64
}

fn default_engines() -> Vec<String> {
    ["chromium", "wkhtmltopdf", "mock"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
