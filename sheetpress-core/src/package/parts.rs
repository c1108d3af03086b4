//! Typed views over the three package parts that sheet removal edits:
//! the workbook, its relationships, and `[Content_Types].xml`

use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::collections::HashSet;

use super::xml::{ElementEdit, XmlPart, attr, prefixed_attr, with_attr};
use crate::error::{Error, Result};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const ROOT_RELS_PART: &str = "_rels/.rels";
pub const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";

/// Relationship type suffixes. Transitional and strict packages use different
/// namespace prefixes, so types are compared by their last segment.
pub mod rel_type {
    pub const OFFICE_DOCUMENT: &str = "/officeDocument";
    pub const WORKSHEET: &str = "/worksheet";
    pub const CALC_CHAIN: &str = "/calcChain";
}

/// Visibility of a sheet tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SheetState {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

impl SheetState {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("hidden") => SheetState::Hidden,
            Some("veryHidden") => SheetState::VeryHidden,
            _ => SheetState::Visible,
        }
    }
}

/// One `<sheet>` element of the workbook, in tab order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetDescriptor {
    pub name: String,
    pub sheet_id: String,
    pub relationship_id: String,
    pub state: SheetState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinedName {
    pub name: String,
    /// Position (not sheetId) of the sheet the name is scoped to
    pub local_sheet_id: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkbookView {
    pub active_tab: Option<usize>,
    pub first_sheet: Option<usize>,
}

/// Parsed `xl/workbook.xml`
#[derive(Debug, Clone)]
pub struct WorkbookPart {
    xml: XmlPart,
    pub sheets: Vec<SheetDescriptor>,
    pub defined_names: Vec<DefinedName>,
    pub views: Vec<WorkbookView>,
}

impl WorkbookPart {
    pub fn parse(part_name: &str, bytes: &[u8]) -> Result<Self> {
        Self::from_xml(XmlPart::parse(part_name, bytes)?)
    }

    fn from_xml(xml: XmlPart) -> Result<Self> {
        let mut sheets = Vec::new();
        for element in xml.elements(b"sheet") {
            let name = attr(element, b"name")?
                .ok_or_else(|| Error::corrupt(xml.name(), "<sheet> without a name"))?;
            let relationship_id = prefixed_attr(element, b"id")?.ok_or_else(|| {
                Error::corrupt(xml.name(), format!("sheet '{name}' has no relationship id"))
            })?;
            let sheet_id = attr(element, b"sheetId")?.unwrap_or_default();
            let state = SheetState::parse(attr(element, b"state")?.as_deref());
            sheets.push(SheetDescriptor {
                name,
                sheet_id,
                relationship_id,
                state,
            });
        }

        let mut defined_names = Vec::new();
        for element in xml.elements(b"definedName") {
            defined_names.push(DefinedName {
                name: attr(element, b"name")?.unwrap_or_default(),
                local_sheet_id: parse_index(attr(element, b"localSheetId")?),
            });
        }

        let mut views = Vec::new();
        for element in xml.elements(b"workbookView") {
            views.push(WorkbookView {
                active_tab: parse_index(attr(element, b"activeTab")?),
                first_sheet: parse_index(attr(element, b"firstSheet")?),
            });
        }

        Ok(Self {
            xml,
            sheets,
            defined_names,
            views,
        })
    }

    pub fn part_name(&self) -> &str {
        self.xml.name()
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// New workbook document without the sheets whose relationship id is in `removed`
    ///
    /// `survivors` carries the final descriptors of the remaining sheets, in order; their
    /// `sheetId`s are written onto the kept elements. Sheet-scoped defined names and the
    /// workbook views are re-pointed at the new tab positions.
    pub fn without_sheets(
        &self,
        removed: &HashSet<String>,
        survivors: &[SheetDescriptor],
    ) -> Result<Self> {
        let positions = position_map(&self.sheets, removed);
        let mut kept = survivors.iter();

        let xml = self.xml.rebuild(b"sheet", |element| {
            let rel_id = prefixed_attr(element, b"id")?.unwrap_or_default();
            if removed.contains(&rel_id) {
                return Ok(ElementEdit::Drop);
            }
            let survivor = kept.next().ok_or_else(|| {
                Error::corrupt(self.xml.name(), "surviving sheet list is shorter than the workbook")
            })?;
            Ok(ElementEdit::Replace(with_attr(element, "sheetId", &survivor.sheet_id)?))
        })?;

        let xml = xml.rebuild(b"definedName", |element| {
            let Some(old) = parse_index(attr(element, b"localSheetId")?) else {
                return Ok(ElementEdit::Keep);
            };
            match positions.get(old).copied().flatten() {
                Some(new) if new == old => Ok(ElementEdit::Keep),
                Some(new) => Ok(ElementEdit::Replace(with_attr(
                    element,
                    "localSheetId",
                    &new.to_string(),
                )?)),
                None => Ok(ElementEdit::Drop),
            }
        })?;

        let xml = xml.rebuild(b"workbookView", |element| {
            let mut current = element.clone().into_owned();
            for key in ["activeTab", "firstSheet"] {
                if let Some(old) = parse_index(attr(&current, key.as_bytes())?) {
                    let new = remap_position(old, &positions);
                    if new != old {
                        current = with_attr(&current, key, &new.to_string())?;
                    }
                }
            }
            Ok(ElementEdit::Replace(current))
        })?;

        Self::from_xml(xml)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.xml.to_bytes()
    }
}

fn parse_index(value: Option<String>) -> Option<usize> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Old tab position -> new tab position (None for removed sheets)
fn position_map(sheets: &[SheetDescriptor], removed: &HashSet<String>) -> Vec<Option<usize>> {
    let mut next = 0;
    sheets
        .iter()
        .map(|sheet| {
            if removed.contains(&sheet.relationship_id) {
                None
            } else {
                next += 1;
                Some(next - 1)
            }
        })
        .collect()
}

/// New position for a view pointer; a pointer at a removed sheet falls back to the
/// nearest surviving sheet before it
fn remap_position(old: usize, positions: &[Option<usize>]) -> usize {
    let Some(last) = positions.len().checked_sub(1) else {
        return 0;
    };
    positions[..=old.min(last)]
        .iter()
        .rev()
        .find_map(|p| *p)
        .unwrap_or(0)
}

/// `<Relationship>` entry of a relationships part
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl RelationshipEntry {
    pub fn has_type(&self, suffix: &str) -> bool {
        self.rel_type.ends_with(suffix)
    }
}

/// Parsed `*.rels` part
#[derive(Debug, Clone)]
pub struct RelationshipsPart {
    xml: XmlPart,
    pub entries: Vec<RelationshipEntry>,
}

impl RelationshipsPart {
    pub fn parse(part_name: &str, bytes: &[u8]) -> Result<Self> {
        Self::from_xml(XmlPart::parse(part_name, bytes)?)
    }

    fn from_xml(xml: XmlPart) -> Result<Self> {
        let mut entries = Vec::new();
        for element in xml.elements(b"Relationship") {
            let Some(id) = attr(element, b"Id")? else {
                continue;
            };
            entries.push(RelationshipEntry {
                id,
                rel_type: attr(element, b"Type")?.unwrap_or_default(),
                target: attr(element, b"Target")?.unwrap_or_default(),
                external: attr(element, b"TargetMode")?.as_deref() == Some("External"),
            });
        }
        Ok(Self { xml, entries })
    }

    pub fn part_name(&self) -> &str {
        self.xml.name()
    }

    pub fn get(&self, id: &str) -> Option<&RelationshipEntry> {
        self.entries.iter().find(|r| r.id == id)
    }

    pub fn first_of_type(&self, suffix: &str) -> Option<&RelationshipEntry> {
        self.entries.iter().find(|r| r.has_type(suffix))
    }

    /// New relationships part without the entries whose id is in `ids`
    pub fn without_ids(&self, ids: &HashSet<String>) -> Result<Self> {
        let xml = self.xml.rebuild(b"Relationship", |element| {
            Ok(match attr(element, b"Id")? {
                Some(id) if ids.contains(&id) => ElementEdit::Drop,
                _ => ElementEdit::Keep,
            })
        })?;
        Self::from_xml(xml)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.xml.to_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypeDefault {
    pub extension: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypeOverride {
    pub part_name: String,
    pub content_type: String,
}

/// Parsed `[Content_Types].xml`
#[derive(Debug, Clone)]
pub struct ContentTypesPart {
    xml: XmlPart,
    pub defaults: Vec<ContentTypeDefault>,
    pub overrides: Vec<ContentTypeOverride>,
}

impl ContentTypesPart {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::from_xml(XmlPart::parse(CONTENT_TYPES_PART, bytes)?)
    }

    fn from_xml(xml: XmlPart) -> Result<Self> {
        let mut defaults = Vec::new();
        for element in xml.elements(b"Default") {
            defaults.push(ContentTypeDefault {
                extension: attr(element, b"Extension")?.unwrap_or_default(),
                content_type: attr(element, b"ContentType")?.unwrap_or_default(),
            });
        }
        let mut overrides = Vec::new();
        for element in xml.elements(b"Override") {
            overrides.push(ContentTypeOverride {
                part_name: attr(element, b"PartName")?.unwrap_or_default(),
                content_type: attr(element, b"ContentType")?.unwrap_or_default(),
            });
        }
        Ok(Self {
            xml,
            defaults,
            overrides,
        })
    }

    /// New content-types part without overrides whose decoded `PartName` is one of `part_names`
    pub fn without_overrides(&self, part_names: &HashSet<String>) -> Result<Self> {
        let xml = self.xml.rebuild(b"Override", |element| {
            Ok(match attr(element, b"PartName")? {
                Some(name) if part_names.contains(&*percent_decode_str(&name).decode_utf8_lossy()) => {
                    ElementEdit::Drop
                }
                _ => ElementEdit::Keep,
            })
        })?;
        Self::from_xml(xml)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.xml.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<bookViews><workbookView xWindow="0" yWindow="0" activeTab="2" firstSheet="1"/></bookViews>
<sheets>
<sheet name="Input" sheetId="4" r:id="rId1"/>
<sheet name="Summary" sheetId="7" state="hidden" r:id="rId2"/>
<sheet name="Detail" sheetId="9" r:id="rId3"/>
</sheets>
<definedNames>
<definedName name="_xlnm.Print_Area" localSheetId="0">Input!$A$1:$C$3</definedName>
<definedName name="_xlnm.Print_Area" localSheetId="2">Detail!$A$1:$F$40</definedName>
<definedName name="Total">Summary!$B$2</definedName>
</definedNames>
</workbook>"#;

    fn descriptor(name: &str, id: &str, rel: &str) -> SheetDescriptor {
        SheetDescriptor {
            name: name.into(),
            sheet_id: id.into(),
            relationship_id: rel.into(),
            state: SheetState::Visible,
        }
    }

    #[test]
    fn test_parse_workbook() -> Result<()> {
        let workbook = WorkbookPart::parse("xl/workbook.xml", WORKBOOK.as_bytes())?;
        assert_eq!(workbook.sheet_names(), vec!["Input", "Summary", "Detail"]);
        assert_eq!(workbook.sheets[1].sheet_id, "7");
        assert_eq!(workbook.sheets[1].relationship_id, "rId2");
        assert_eq!(workbook.sheets[1].state, SheetState::Hidden);
        assert_eq!(workbook.defined_names.len(), 3);
        assert_eq!(workbook.defined_names[1].local_sheet_id, Some(2));
        assert_eq!(workbook.views[0].active_tab, Some(2));
        Ok(())
    }

    #[test]
    fn test_without_sheets_remaps_positions() -> Result<()> {
        let workbook = WorkbookPart::parse("xl/workbook.xml", WORKBOOK.as_bytes())?;
        let removed: HashSet<String> = ["rId1".to_string()].into();
        let survivors = vec![descriptor("Summary", "1", "rId2"), descriptor("Detail", "2", "rId3")];

        let updated = workbook.without_sheets(&removed, &survivors)?;
        assert_eq!(updated.sheet_names(), vec!["Summary", "Detail"]);
        assert_eq!(updated.sheets[0].sheet_id, "1");
        assert_eq!(updated.sheets[1].sheet_id, "2");
        assert_eq!(updated.sheets[0].state, SheetState::Hidden);

        // Print area of the removed sheet is gone, the other one follows its sheet
        assert_eq!(updated.defined_names.len(), 2);
        assert_eq!(updated.defined_names[0].local_sheet_id, Some(1));
        assert_eq!(updated.defined_names[1].local_sheet_id, None);
        assert_eq!(updated.views[0].active_tab, Some(1));
        assert_eq!(updated.views[0].first_sheet, Some(0));

        let xml = String::from_utf8(updated.to_bytes()?).unwrap();
        assert!(!xml.contains("Input!$A$1"));
        assert!(xml.contains(r#"<sheet name="Summary" sheetId="1" state="hidden" r:id="rId2"/>"#));
        Ok(())
    }

    #[test]
    fn test_remap_position_falls_back_to_previous_survivor() {
        let positions = vec![Some(0), None, None, Some(1)];
        assert_eq!(remap_position(0, &positions), 0);
        assert_eq!(remap_position(2, &positions), 0);
        assert_eq!(remap_position(3, &positions), 1);
        assert_eq!(remap_position(10, &positions), 1);
        assert_eq!(remap_position(0, &[None, Some(0)]), 0);
    }

    #[test]
    fn test_relationships_without_ids() -> Result<()> {
        let rels = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/></Relationships>"#;
        let part = RelationshipsPart::parse("xl/_rels/workbook.xml.rels", rels.as_bytes())?;
        assert_eq!(part.entries.len(), 3);
        assert!(part.get("rId3").map(|r| r.external).unwrap_or(false));
        assert!(part.get("rId1").map(|r| r.has_type(rel_type::WORKSHEET)).unwrap_or(false));

        // Matching is by id: rId2 shares rId1's target but stays
        let updated = part.without_ids(&["rId1".to_string()].into())?;
        let ids: Vec<_> = updated.entries.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["rId2", "rId3"]);
        Ok(())
    }

    #[test]
    fn test_content_types_keep_defaults() -> Result<()> {
        let ct = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="ws"/><Override PartName="/xl/worksheets/sheet10.xml" ContentType="ws"/></Types>"#;
        let part = ContentTypesPart::parse(ct.as_bytes())?;
        let updated = part.without_overrides(&["/xl/worksheets/sheet1.xml".to_string()].into())?;
        assert_eq!(updated.defaults, part.defaults);
        assert_eq!(updated.overrides.len(), 1);
        assert_eq!(updated.overrides[0].part_name, "/xl/worksheets/sheet10.xml");
        Ok(())
    }

    #[test]
    fn test_escaped_override_names_match_decoded_parts() -> Result<()> {
        let ct = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/worksheets/sheet%201.xml" ContentType="ws"/><Override PartName="/xl/worksheets/sheet2.xml" ContentType="ws"/></Types>"#;
        let part = ContentTypesPart::parse(ct.as_bytes())?;
        let updated = part.without_overrides(&["/xl/worksheets/sheet 1.xml".to_string()].into())?;
        assert_eq!(updated.overrides.len(), 1);
        assert_eq!(updated.overrides[0].part_name, "/xl/worksheets/sheet2.xml");
        Ok(())
    }
}
