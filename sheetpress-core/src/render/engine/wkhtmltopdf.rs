//! wkhtmltopdf, lighter than a browser and without a content-load budget

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use super::process::{ScopedProcess, run_probe};
use super::{RenderEngine, RenderJob, find_binary, unavailable};
use crate::error::Result;
use crate::render::request::Orientation;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct WkhtmltopdfEngine {
    binary: Option<PathBuf>,
}

impl WkhtmltopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    fn binary(&self) -> Result<PathBuf> {
        match &self.binary {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(unavailable(self.name(), format!("{} does not exist", path.display()))),
            None => find_binary(&["wkhtmltopdf"])
                .ok_or_else(|| unavailable(self.name(), "wkhtmltopdf is not on PATH")),
        }
    }
}

impl RenderEngine for WkhtmltopdfEngine {
    fn name(&self) -> &str {
        "wkhtmltopdf"
    }

    fn probe(&self) -> Result<()> {
        let binary = self.binary()?;
        let scratch = tempfile::tempdir().map_err(|e| unavailable(self.name(), e.to_string()))?;
        let mut command = Command::new(binary);
        command.arg("--version");
        run_probe(self.name(), command, scratch.path(), PROBE_TIMEOUT)
    }

    fn render(&self, job: &RenderJob<'_>) -> Result<()> {
        let binary = self.binary()?;
        let document = job.write_markup()?;
        let request = &job.request;

        let mut command = Command::new(binary);
        command
            .arg("--quiet")
            .arg("--encoding")
            .arg("utf-8")
            .arg("--enable-local-file-access")
            .arg("--print-media-type")
            .arg("--page-size")
            .arg(request.page_format.to_string())
            .arg("--orientation")
            .arg(match request.orientation {
                Orientation::Portrait => "Portrait",
                Orientation::Landscape => "Landscape",
            })
            .args(["-T", &request.margin.top])
            .args(["-R", &request.margin.right])
            .args(["-B", &request.margin.bottom])
            .args(["-L", &request.margin.left])
            .arg(&document)
            .arg(&job.output);

        let mut process = ScopedProcess::spawn(self.name(), command, job.work_dir)?;
        process.finish(request.timeout)
    }
}
