#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

pub const WORKSHEET_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";

/// In-memory description of a workbook, written as a real `.xlsx`
///
/// Sheet `n` (1-based) lives at `xl/worksheets/sheet{n}.xml` behind `rId{n}`; shared
/// parts take the ids after the sheets.
#[derive(Debug, Default)]
pub struct XlsxBuilder {
    sheets: Vec<String>,
    defined_names: Vec<(String, Option<usize>, String)>,
    active_tab: Option<usize>,
    calc_chain: bool,
    drawing_on: Vec<usize>,
}

impl XlsxBuilder {
    pub fn new(sheets: &[&str]) -> Self {
        Self {
            sheets: sheets.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn defined_name(mut self, name: &str, local_sheet_id: Option<usize>, formula: &str) -> Self {
        self.defined_names
            .push((name.to_string(), local_sheet_id, formula.to_string()));
        self
    }

    pub fn active_tab(mut self, tab: usize) -> Self {
        self.active_tab = Some(tab);
        self
    }

    pub fn calc_chain(mut self) -> Self {
        self.calc_chain = true;
        self
    }

    /// Give sheet at 0-based `position` a drawing through its own rels part
    pub fn drawing_on(mut self, position: usize) -> Self {
        self.drawing_on.push(position);
        self
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        let count = self.sheets.len();

        let mut content_types = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
        );
        for n in 1..=count {
            content_types.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            ));
        }
        for &position in &self.drawing_on {
            content_types.push_str(&format!(
                r#"<Override PartName="/xl/drawings/drawing{}.xml" ContentType="application/vnd.openxmlformats-officedocument.drawing+xml"/>"#,
                position + 1
            ));
        }
        content_types.push_str(r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#);
        if self.calc_chain {
            content_types.push_str(r#"<Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/>"#);
        }
        content_types.push_str("</Types>");
        put(&mut zip, options, "[Content_Types].xml", &content_types)?;

        put(
            &mut zip,
            options,
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
        )?;

        let mut workbook = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
        );
        if let Some(tab) = self.active_tab {
            workbook.push_str(&format!(
                r#"<bookViews><workbookView xWindow="0" yWindow="0" windowWidth="28800" windowHeight="12300" activeTab="{tab}"/></bookViews>"#
            ));
        }
        workbook.push_str("<sheets>");
        for (i, name) in self.sheets.iter().enumerate() {
            let n = i + 1;
            workbook.push_str(&format!(
                r#"<sheet name="{name}" sheetId="{}" r:id="rId{n}"/>"#,
                n * 3
            ));
        }
        workbook.push_str("</sheets>");
        if !self.defined_names.is_empty() {
            workbook.push_str("<definedNames>");
            for (name, local, formula) in &self.defined_names {
                match local {
                    Some(id) => workbook.push_str(&format!(
                        r#"<definedName name="{name}" localSheetId="{id}">{formula}</definedName>"#
                    )),
                    None => workbook.push_str(&format!(
                        r#"<definedName name="{name}">{formula}</definedName>"#
                    )),
                }
            }
            workbook.push_str("</definedNames>");
        }
        workbook.push_str(r#"<calcPr calcId="191029"/></workbook>"#);
        put(&mut zip, options, "xl/workbook.xml", &workbook)?;

        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for n in 1..=count {
            rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="{WORKSHEET_REL}" Target="worksheets/sheet{n}.xml"/>"#
            ));
        }
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/><Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
            count + 1,
            count + 2
        ));
        if self.calc_chain {
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/>"#,
                count + 3
            ));
        }
        rels.push_str("</Relationships>");
        put(&mut zip, options, "xl/_rels/workbook.xml.rels", &rels)?;

        for (i, name) in self.sheets.iter().enumerate() {
            let n = i + 1;
            let drawing = if self.drawing_on.contains(&i) {
                r#"<drawing r:id="rId1"/>"#
            } else {
                ""
            };
            put(
                &mut zip,
                options,
                &format!("xl/worksheets/sheet{n}.xml"),
                &format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><dimension ref="A1:B2"/><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s" s="1"><v>1</v></c></row><row r="2"><c r="A2" t="inlineStr"><is><t>{name}</t></is></c><c r="B2"><v>{}</v></c></row></sheetData>{drawing}</worksheet>"#,
                    n * 100
                ),
            )?;
            if !drawing.is_empty() {
                put(
                    &mut zip,
                    options,
                    &format!("xl/worksheets/_rels/sheet{n}.xml.rels"),
                    &format!(
                        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing" Target="../drawings/drawing{n}.xml"/></Relationships>"#
                    ),
                )?;
                put(
                    &mut zip,
                    options,
                    &format!("xl/drawings/drawing{n}.xml"),
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing"/>"#,
                )?;
            }
        }

        put(
            &mut zip,
            options,
            "xl/sharedStrings.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="2" uniqueCount="2"><si><t>품목</t></si><si><t>수량</t></si></sst>"#,
        )?;
        put(
            &mut zip,
            options,
            "xl/styles.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="12"/><color rgb="FF1F4E79"/><name val="Calibri"/></font></fonts><fills count="1"><fill><patternFill patternType="none"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" applyFont="1"><alignment horizontal="center"/></xf></cellXfs></styleSheet>"#,
        )?;
        if self.calc_chain {
            put(
                &mut zip,
                options,
                "xl/calcChain.xml",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><c r="B2" i="1"/></calcChain>"#,
            )?;
        }

        zip.finish()?;
        Ok(())
    }
}

fn put(
    zip: &mut ZipWriter<File>,
    options: SimpleFileOptions,
    name: &str,
    content: &str,
) -> anyhow::Result<()> {
    zip.start_file(name, options)?;
    zip.write_all(content.as_bytes())?;
    Ok(())
}

/// Every entry of a ZIP file, by name
pub fn read_parts(path: &Path) -> anyhow::Result<BTreeMap<String, Vec<u8>>> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut parts = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        parts.insert(entry.name().to_string(), data);
    }
    Ok(parts)
}

pub fn part_text(parts: &BTreeMap<String, Vec<u8>>, name: &str) -> anyhow::Result<String> {
    let data = parts
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("missing part {name}"))?;
    Ok(String::from_utf8(data.clone())?)
}

/// Values of `attribute` on every `<element ...>` start tag, in document order
pub fn attribute_values(xml: &str, element: &str, attribute: &str) -> Vec<String> {
    let open = format!("<{element} ");
    let key = format!(" {attribute}=\"");
    xml.match_indices(&open)
        .filter_map(|(start, _)| {
            let tag_end = xml[start..].find('>')? + start;
            let tag = &xml[start..tag_end];
            let value_start = tag.find(&key)? + key.len();
            let value_len = tag[value_start..].find('"')?;
            Some(tag[value_start..value_start + value_len].to_string())
        })
        .collect()
}
