//! OOXML package access: the ZIP part store, typed views over the parts sheet removal
//! edits, and the sheet -> part relationship graph

pub mod archive;
pub mod graph;
pub mod parts;
pub mod path;
pub mod xml;

pub use archive::Archive;
pub use graph::{ResolvedSheet, SheetGraph};
pub use parts::{
    ContentTypeDefault, ContentTypeOverride, ContentTypesPart, RelationshipEntry,
    RelationshipsPart, SheetDescriptor, SheetState, WorkbookPart,
};
