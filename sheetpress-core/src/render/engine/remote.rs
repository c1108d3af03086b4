//! HTTP conversion service speaking the Gotenberg `forms/chromium/convert/html` API

use log::debug;
use reqwest::blocking::{Client, multipart};
use std::fs;
use std::time::{Duration, Instant};

use super::{RenderEngine, RenderJob, failure, unavailable};
use crate::error::{Error, Result};
use crate::render::request::length_to_mm;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const MM_PER_INCH: f64 = 25.4;

#[derive(Debug, Clone)]
pub struct RemoteEngine {
    base_url: String,
}

impl RemoteEngine {
    /// `base_url` such as `http://localhost:3000`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn client(&self, timeout: Duration) -> Result<Client> {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| unavailable(self.name(), format!("cannot build HTTP client: {e}")))
    }

    fn form(&self, job: &RenderJob<'_>) -> Result<multipart::Form> {
        let request = &job.request;
        let (width, height) = request.page_size_mm();
        let inches = |mm: f64| format!("{:.3}", mm / MM_PER_INCH);
        let margin = |length: &str| -> Result<String> {
            length_to_mm(length)
                .map(inches)
                .ok_or_else(|| failure(self.name(), format!("unsupported margin '{length}'")))
        };

        let document = multipart::Part::text(job.markup.to_string())
            .file_name("index.html")
            .mime_str("text/html")
            .map_err(|e| failure(self.name(), e.to_string()))?;

        Ok(multipart::Form::new()
            .part("files", document)
            .text("paperWidth", inches(width))
            .text("paperHeight", inches(height))
            .text("marginTop", margin(&request.margin.top)?)
            .text("marginRight", margin(&request.margin.right)?)
            .text("marginBottom", margin(&request.margin.bottom)?)
            .text("marginLeft", margin(&request.margin.left)?)
            .text("printBackground", "true")
            .text("preferCssPageSize", "true")
            .text("waitDelay", format!("{}ms", request.load_timeout.as_millis().min(1000))))
    }
}

impl RenderEngine for RemoteEngine {
    fn name(&self) -> &str {
        "remote"
    }

    fn probe(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client(PROBE_TIMEOUT)?
            .get(&url)
            .send()
            .map_err(|e| unavailable(self.name(), format!("{url}: {e}")))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(unavailable(self.name(), format!("{url} answered {}", response.status())))
        }
    }

    fn render(&self, job: &RenderJob<'_>) -> Result<()> {
        let started = Instant::now();
        let url = format!("{}/forms/chromium/convert/html", self.base_url);
        let timeout_or = |e: reqwest::Error| {
            if e.is_timeout() {
                Error::RenderTimeout {
                    engine: self.name().to_string(),
                    elapsed: started.elapsed(),
                }
            } else if e.is_connect() {
                unavailable(self.name(), format!("{url}: {e}"))
            } else {
                failure(self.name(), format!("{url}: {e}"))
            }
        };

        let response = self
            .client(job.request.timeout)?
            .post(&url)
            .multipart(self.form(job)?)
            .send()
            .map_err(timeout_or)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let body: String = body.chars().take(300).collect();
            return Err(failure(self.name(), format!("{url} answered {status}: {body}")));
        }

        let bytes = response.bytes().map_err(timeout_or)?;
        debug!("remote: received {} bytes in {:?}", bytes.len(), started.elapsed());
        fs::write(&job.output, &bytes).map_err(|e| Error::write_failure(&job.output, e))
    }
}
