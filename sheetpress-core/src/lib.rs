//! sheetpress-core: sheet removal and PDF rendering for `.xlsx` workbooks
//!
//! Removal edits the OOXML package directly so that every surviving part keeps its exact
//! bytes. Rendering turns the remaining sheets into HTML and prints it through an ordered
//! chain of engines, falling back until one yields a valid PDF.

pub mod config;
pub mod error;
pub mod package;
pub mod pipeline;
pub mod render;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_fixture;

pub use config::PressConfig;
pub use error::{EngineFailure, Error, ErrorKind, Result};
pub use package::{ResolvedSheet, SheetDescriptor, SheetState};
pub use pipeline::{ProcessedWorkbook, process_workbook, process_workbook_with};
pub use render::{
    CleanupReport, Orchestrator, RenderEngine, RenderRequest, RenderResult, cleanup_temp_files,
    convert_to_pdf, validate_pdf,
};
pub use writer::{
    RemovalPlan, RemovalReport, SheetPredicate, SheetSelector, inspect_workbook, preview_removal,
    remove_sheets,
};
