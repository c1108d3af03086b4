//! Workbook to PDF: sheet tables, HTML markup, engines and the fallback orchestrator

pub mod cleanup;
pub mod engine;
pub mod markup;
pub mod orchestrator;
pub mod request;
pub mod sheet_table;
pub mod styles;
pub mod validate;

pub use cleanup::{CleanupReport, cleanup_temp_files};
pub use engine::{RenderEngine, RenderJob};
pub use orchestrator::{AttemptOutcome, Orchestrator, convert_to_pdf};
pub use request::{
    AttemptRecord, AttemptState, Margin, Orientation, PageFormat, Quality, RenderRequest,
    RenderResult,
};
pub use validate::validate_pdf;
