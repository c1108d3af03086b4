//! HTML document handed to browser-based engines

use std::fmt::Write as _;

use super::request::{Quality, RenderRequest};
use super::sheet_table::SheetTable;

/// Excel character width to CSS pixels, close enough for Calibri 11
const PX_PER_CHAR: f64 = 7.0;

/// One section per sheet, in order, with a page break between sheets
pub fn build_markup(tables: &[SheetTable], request: &RenderRequest) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<style>\n");
    html.push_str(&stylesheet(request));
    html.push_str("</style>\n</head>\n<body>\n");

    if let Some(watermark) = request.watermark.as_deref().filter(|w| !w.is_empty()) {
        let _ = writeln!(html, "<div class=\"watermark\">{}</div>", escape_html(watermark));
    }

    for (index, table) in tables.iter().enumerate() {
        let page_break = if index + 1 < tables.len() {
            " style=\"page-break-after: always;\""
        } else {
            ""
        };
        let _ = writeln!(html, "<section class=\"sheet-container\"{page_break}>");
        let _ = writeln!(html, "<h2 class=\"sheet-title\">{}</h2>", escape_html(&table.name));
        write_table(&mut html, table);
        html.push_str("</section>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn write_table(html: &mut String, table: &SheetTable) {
    html.push_str("<table class=\"excel-table\">\n");
    if table.column_widths.iter().any(Option::is_some) {
        html.push_str("<colgroup>");
        for width in &table.column_widths {
            match width {
                Some(w) => {
                    let _ = write!(html, "<col style=\"width: {:.0}px\">", w * PX_PER_CHAR);
                }
                None => html.push_str("<col>"),
            }
        }
        html.push_str("</colgroup>\n");
    }

    for row in &table.rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str("<td");
            if cell.row_span > 1 {
                let _ = write!(html, " rowspan=\"{}\"", cell.row_span);
            }
            if cell.col_span > 1 {
                let _ = write!(html, " colspan=\"{}\"", cell.col_span);
            }
            if cell.numeric {
                html.push_str(" class=\"num\"");
            }
            let css = cell.style.as_ref().map(|s| s.css()).unwrap_or_default();
            if !css.is_empty() {
                let _ = write!(html, " style=\"{}\"", escape_html(&css));
            }
            html.push('>');
            if cell.is_empty() {
                html.push_str("&nbsp;");
            } else {
                html.push_str(&escape_html(&cell.text).replace('\n', "<br>"));
            }
            html.push_str("</td>");
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n");
}

fn stylesheet(request: &RenderRequest) -> String {
    let cell_font = match request.quality {
        Quality::Low => "8px",
        _ => "10px",
    };
    let margin = &request.margin;
    let mut css = format!(
        r#"body {{
  font-family: 'Noto Sans KR', 'NotoSansKR', 'Malgun Gothic', '맑은 고딕', 'Apple SD Gothic Neo', sans-serif;
  margin: 0;
  padding: 20px;
  font-size: 12px;
  position: relative;
}}
.sheet-container {{ margin-bottom: 20px; }}
.sheet-title {{
  font-size: 16px;
  font-weight: bold;
  margin-bottom: 10px;
  border-bottom: 2px solid #333;
  padding-bottom: 5px;
}}
.excel-table {{ width: 100%; border-collapse: collapse; table-layout: auto; }}
.excel-table td {{
  border: 1px solid #ccc;
  padding: 4px 8px;
  text-align: left;
  vertical-align: top;
  font-size: {cell_font};
  line-height: 1.2;
}}
.excel-table td.num {{ text-align: right; }}
.watermark {{
  position: fixed;
  top: 50%;
  left: 50%;
  transform: translate(-50%, -50%) rotate(-45deg);
  font-size: 48px;
  color: rgba(0, 0, 0, 0.1);
  z-index: -1;
  pointer-events: none;
  font-weight: bold;
}}
@page {{
  size: {format} {orientation};
  margin: {top} {right} {bottom} {left};
}}
"#,
        format = request.page_format,
        orientation = request.orientation,
        top = margin.top,
        right = margin.right,
        bottom = margin.bottom,
        left = margin.left,
    );
    if request.quality == Quality::High {
        css.push_str(
            "* { -webkit-print-color-adjust: exact; print-color-adjust: exact; }\nimg { image-rendering: crisp-edges; }\n",
        );
    }
    css
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::request::{Orientation, PageFormat};
    use crate::render::sheet_table::TableCell;
    use crate::render::styles::CellStyle;

    fn cell(text: &str) -> TableCell {
        TableCell {
            row: 0,
            col: 0,
            text: text.to_string(),
            numeric: false,
            style: None,
            row_span: 1,
            col_span: 1,
        }
    }

    fn table(name: &str, rows: Vec<Vec<TableCell>>) -> SheetTable {
        SheetTable {
            name: name.to_string(),
            rows,
            column_widths: Vec::new(),
        }
    }

    #[test]
    fn test_page_breaks_between_sheets_only() {
        let request = RenderRequest::new("in.xlsx", "out.pdf");
        let html = build_markup(
            &[table("갑지", vec![vec![cell("a")]]), table("을지", vec![vec![cell("b")]])],
            &request,
        );
        assert_eq!(html.matches("page-break-after: always").count(), 1);
        let first = html.find("갑지").unwrap_or(usize::MAX);
        let second = html.find("을지").unwrap_or(0);
        assert!(first < second);
        assert!(html.contains("size: A4 landscape"));
        assert!(html.contains("margin: 15mm 15mm 15mm 15mm"));
    }

    #[test]
    fn test_cells_are_escaped_and_styled() {
        let mut request = RenderRequest::new("in.xlsx", "out.pdf");
        request.page_format = PageFormat::Letter;
        request.orientation = Orientation::Portrait;
        request.watermark = Some("<DRAFT>".into());

        let mut bold = cell("Tom & \"Jerry\"");
        bold.style = Some(CellStyle {
            bold: true,
            ..CellStyle::default()
        });
        bold.col_span = 2;
        let mut amount = cell("1,200");
        amount.numeric = true;

        let html = build_markup(&[table("S", vec![vec![bold], vec![amount, cell("")]])], &request);
        assert!(html.contains("<div class=\"watermark\">&lt;DRAFT&gt;</div>"));
        assert!(html.contains(
            "<td colspan=\"2\" style=\"font-weight: bold\">Tom &amp; &quot;Jerry&quot;</td>"
        ));
        assert!(html.contains("<td class=\"num\">1,200</td><td>&nbsp;</td>"));
        assert!(html.contains("size: Letter portrait"));
    }

    #[test]
    fn test_quality_changes_css() {
        let mut request = RenderRequest::new("in.xlsx", "out.pdf");
        assert!(build_markup(&[], &request).contains("print-color-adjust: exact"));
        request.quality = Quality::Low;
        let html = build_markup(&[], &request);
        assert!(!html.contains("print-color-adjust"));
        assert!(html.contains("font-size: 8px"));
    }
}
