//! Cell formatting from `xl/styles.xml`, reduced to what the HTML markup can express

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};
use crate::package::xml::attr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BorderSides {
    pub top: bool,
    pub right: bool,
    pub bottom: bool,
    pub left: bool,
}

impl BorderSides {
    pub fn any(&self) -> bool {
        self.top || self.right || self.bottom || self.left
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub font_size: Option<f64>,
    /// `#RRGGBB`
    pub color: Option<String>,
    pub fill: Option<String>,
    pub border: BorderSides,
    pub horizontal: Option<String>,
    pub vertical: Option<String>,
    pub wrap: bool,
}

impl CellStyle {
    /// Inline CSS declarations, empty for the default style
    pub fn css(&self) -> String {
        let mut rules = Vec::new();
        if self.bold {
            rules.push("font-weight: bold".to_string());
        }
        if self.italic {
            rules.push("font-style: italic".to_string());
        }
        if self.underline {
            rules.push("text-decoration: underline".to_string());
        }
        if let Some(size) = self.font_size {
            rules.push(format!("font-size: {size}pt"));
        }
        if let Some(color) = &self.color {
            rules.push(format!("color: {color}"));
        }
        if let Some(fill) = &self.fill {
            rules.push(format!("background-color: {fill}"));
        }
        for (side, on) in [
            ("top", self.border.top),
            ("right", self.border.right),
            ("bottom", self.border.bottom),
            ("left", self.border.left),
        ] {
            if on {
                rules.push(format!("border-{side}: 1px solid #000"));
            }
        }
        if let Some(align) = &self.horizontal {
            let align = match align.as_str() {
                "centerContinuous" => "center",
                "distributed" => "justify",
                other => other,
            };
            rules.push(format!("text-align: {align}"));
        }
        if let Some(align) = &self.vertical {
            let align = match align.as_str() {
                "center" => "middle",
                "distributed" | "justify" => "middle",
                other => other,
            };
            rules.push(format!("vertical-align: {align}"));
        }
        if self.wrap {
            rules.push("white-space: pre-wrap".to_string());
        }
        rules.join("; ")
    }
}

#[derive(Debug, Clone, Default)]
struct Font {
    bold: bool,
    italic: bool,
    underline: bool,
    size: Option<f64>,
    color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Other,
    Fonts,
    Fills,
    Borders,
    CellXfs,
}

/// Resolved `cellXfs`, indexed by the `s` attribute of worksheet cells
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    xfs: Vec<CellStyle>,
}

impl Stylesheet {
    pub fn parse(part_name: &str, bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);

        let mut fonts: Vec<Font> = Vec::new();
        let mut fills: Vec<Option<String>> = Vec::new();
        let mut borders: Vec<BorderSides> = Vec::new();
        let mut raw_xfs: Vec<(usize, usize, usize, CellStyle)> = Vec::new();

        let mut section = Section::Other;
        let mut font = Font::default();
        let mut fill: Option<String> = None;
        let mut solid = false;
        let mut border = BorderSides::default();

        let mut buf = Vec::new();
        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| Error::corrupt(part_name, e))?;
            let empty = matches!(event, Event::Empty(_));
            match event {
                Event::Start(e) | Event::Empty(e) => match (section, e.local_name().as_ref()) {
                    (_, b"fonts") if !empty => section = Section::Fonts,
                    (_, b"fills") if !empty => section = Section::Fills,
                    (_, b"borders") if !empty => section = Section::Borders,
                    (_, b"cellXfs") if !empty => section = Section::CellXfs,
                    (Section::Fonts, b"font") => {
                        font = Font::default();
                        if empty {
                            fonts.push(Font::default());
                        }
                    }
                    (Section::Fonts, b"b") => font.bold = flag(&e)?,
                    (Section::Fonts, b"i") => font.italic = flag(&e)?,
                    (Section::Fonts, b"u") => font.underline = attr(&e, b"val")?.as_deref() != Some("none"),
                    (Section::Fonts, b"sz") => font.size = attr(&e, b"val")?.and_then(|v| v.parse().ok()),
                    (Section::Fonts, b"color") => font.color = rgb(&e)?,
                    (Section::Fills, b"fill") => {
                        fill = None;
                        solid = false;
                        if empty {
                            fills.push(None);
                        }
                    }
                    (Section::Fills, b"patternFill") => {
                        solid = attr(&e, b"patternType")?.as_deref() == Some("solid");
                    }
                    (Section::Fills, b"fgColor") if solid => fill = rgb(&e)?,
                    (Section::Borders, b"border") => {
                        border = BorderSides::default();
                        if empty {
                            borders.push(BorderSides::default());
                        }
                    }
                    (Section::Borders, side @ (b"top" | b"right" | b"bottom" | b"left")) => {
                        let drawn = attr(&e, b"style")?.is_some_and(|s| s != "none");
                        match side {
                            b"top" => border.top = drawn,
                            b"right" => border.right = drawn,
                            b"bottom" => border.bottom = drawn,
                            _ => border.left = drawn,
                        }
                    }
                    (Section::CellXfs, b"xf") => {
                        let index = |key: &[u8]| -> Result<usize> {
                            Ok(attr(&e, key)?.and_then(|v| v.parse().ok()).unwrap_or(0))
                        };
                        raw_xfs.push((
                            index(b"fontId")?,
                            index(b"fillId")?,
                            index(b"borderId")?,
                            CellStyle::default(),
                        ));
                    }
                    (Section::CellXfs, b"alignment") => {
                        if let Some((_, _, _, style)) = raw_xfs.last_mut() {
                            style.horizontal = attr(&e, b"horizontal")?.filter(|h| h != "general");
                            style.vertical = attr(&e, b"vertical")?;
                            style.wrap = attr(&e, b"wrapText")?.is_some_and(|w| w == "1" || w == "true");
                        }
                    }
                    _ => {}
                },
                Event::End(e) => match (section, e.local_name().as_ref()) {
                    (Section::Fonts, b"font") => fonts.push(std::mem::take(&mut font)),
                    (Section::Fills, b"fill") => fills.push(fill.take()),
                    (Section::Borders, b"border") => borders.push(border),
                    (_, b"fonts" | b"fills" | b"borders" | b"cellXfs") => section = Section::Other,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        let xfs = raw_xfs
            .into_iter()
            .map(|(font_id, fill_id, border_id, mut style)| {
                if let Some(font) = fonts.get(font_id) {
                    style.bold = font.bold;
                    style.italic = font.italic;
                    style.underline = font.underline;
                    // The default font size is left to the page stylesheet
                    style.font_size = font.size.filter(|_| font_id != 0);
                    style.color = font.color.clone().filter(|c| c != "#000000");
                }
                style.fill = fills.get(fill_id).cloned().flatten();
                style.border = borders.get(border_id).copied().unwrap_or_default();
                style
            })
            .collect();
        Ok(Self { xfs })
    }

    pub fn get(&self, index: usize) -> Option<&CellStyle> {
        self.xfs.get(index)
    }

    pub fn len(&self) -> usize {
        self.xfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xfs.is_empty()
    }
}

/// `<b/>` means on; `<b val="0"/>` means off
fn flag(element: &BytesStart) -> Result<bool> {
    Ok(!matches!(attr(element, b"val")?.as_deref(), Some("0" | "false")))
}

/// ARGB `FFRRGGBB` to `#RRGGBB`; theme and indexed colours are not resolved
fn rgb(element: &BytesStart) -> Result<Option<String>> {
    Ok(attr(element, b"rgb")?
        .filter(|v| v.is_ascii() && (v.len() == 8 || v.len() == 6))
        .map(|v| format!("#{}", &v[v.len() - 6..]).to_ascii_uppercase()))
}
