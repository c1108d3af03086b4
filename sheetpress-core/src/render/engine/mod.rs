//! Interchangeable PDF producers

pub mod chromium;
pub mod mock;
pub mod process;
#[cfg(feature = "remote-engine")]
pub mod remote;
pub mod wkhtmltopdf;

pub use chromium::ChromiumEngine;
pub use mock::MockEngine;
pub use process::ScopedProcess;
#[cfg(feature = "remote-engine")]
pub use remote::RemoteEngine;
pub use wkhtmltopdf::WkhtmltopdfEngine;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::request::RenderRequest;
use super::sheet_table::SheetTable;
use crate::error::{Error, Result};

/// Names accepted in configuration and on the command line
pub const ENGINE_NAMES: &[&str] = &["chromium", "wkhtmltopdf", "remote", "mock"];

/// Input for one attempt. A fresh job is built for every attempt.
#[derive(Debug)]
pub struct RenderJob<'a> {
    pub request: RenderRequest,
    pub markup: &'a str,
    pub sheets: &'a [SheetTable],
    /// Private to this attempt and removed afterwards
    pub work_dir: &'a Path,
    /// Where the engine must leave the PDF
    pub output: PathBuf,
}

impl RenderJob<'_> {
    /// Write the markup into the work directory for engines that load a file
    pub fn write_markup(&self) -> Result<PathBuf> {
        let path = self.work_dir.join("document.html");
        fs::write(&path, self.markup).map_err(|e| Error::write_failure(&path, e))?;
        Ok(path)
    }
}

pub trait RenderEngine: Send + Sync {
    fn name(&self) -> &str;

    /// `Err(EngineUnavailable)` when the engine cannot run on this machine
    fn probe(&self) -> Result<()>;

    /// Produce a PDF at `job.output`
    fn render(&self, job: &RenderJob<'_>) -> Result<()>;

    /// Caveats attached to results this engine produced
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }
}

/// First of `candidates` found as given (when it contains a path separator) or on `PATH`
pub fn find_binary(candidates: &[&str]) -> Option<PathBuf> {
    let search: Vec<PathBuf> = env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).collect())
        .unwrap_or_default();
    candidates.iter().find_map(|candidate| {
        let direct = Path::new(candidate);
        if direct.components().count() > 1 {
            return direct.is_file().then(|| direct.to_path_buf());
        }
        search
            .iter()
            .flat_map(|dir| executable_names(candidate).into_iter().map(move |n| dir.join(n)))
            .find(|path| path.is_file())
    })
}

fn executable_names(name: &str) -> Vec<String> {
    if cfg!(windows) {
        vec![format!("{name}.exe"), name.to_string()]
    } else {
        vec![name.to_string()]
    }
}

pub(crate) fn unavailable(engine: &str, reason: impl Into<String>) -> Error {
    Error::EngineUnavailable {
        engine: engine.to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn failure(engine: &str, reason: impl Into<String>) -> Error {
    Error::RenderFailure {
        engine: engine.to_string(),
        reason: reason.into(),
    }
}
