// src/export.rs

use crate::error::Result;
use crate::report::{Cell, Sheet};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, StringFormat, dictionary};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const PAGE_WIDTH: i64 = 842;
const PAGE_HEIGHT: i64 = 595;
const MARGIN: i64 = 36;
const ROW_HEIGHT: i64 = 14;
const COLUMN_WIDTH: i64 = 110;
const MIN_FIT_WIDTH: i64 = 40;
const FONT_SIZE: i64 = 9;
const FONT_NAME: &str = "MSung-Light";
const FONT_CMAP: &str = "UniCNS-UTF16-H";
const ROWS_PER_PAGE: u32 = ((PAGE_HEIGHT - 2 * MARGIN) / ROW_HEIGHT) as u32;

/// Writes each finished sheet as `<stem>.json` (cells and formats) plus a
/// printable `<stem>.pdf` next to it.
pub struct SheetExporter {
    dir: PathBuf,
}

impl SheetExporter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Returns the path of the JSON file.
    pub fn export(&self, sheet: &Sheet) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let stem = sheet.file_stem();

        let json_path = self.dir.join(format!("{stem}.json"));
        fs::write(&json_path, serde_json::to_string_pretty(sheet)?)?;

        let pdf_path = self.dir.join(format!("{stem}.pdf"));
        let mut doc = render_pdf(sheet)?;
        doc.save(&pdf_path)?;

        info!(
            title = %sheet.title,
            cells = sheet.cells.len(),
            json = %json_path.display(),
            pdf = %pdf_path.display(),
            "Sheet exported"
        );
        Ok(json_path)
    }
}

fn render_pdf(sheet: &Sheet) -> Result<Document> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = add_cjk_font(&mut doc);
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    // page index -> cells on that page
    let mut pages: BTreeMap<u32, Vec<&Cell>> = BTreeMap::new();
    for cell in &sheet.cells {
        let page = cell.row.saturating_sub(1) / ROWS_PER_PAGE;
        pages.entry(page).or_default().push(cell);
    }
    if pages.is_empty() {
        pages.insert(0, Vec::new());
    }

    let offsets = column_offsets(sheet);
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for (page, cells) in &pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), int(FONT_SIZE)]),
        ];
        if *page == 0 {
            operations.extend(text_at(MARGIN, PAGE_HEIGHT - MARGIN / 2, &sheet.title));
        }
        for cell in cells {
            let line = i64::from(cell.row.saturating_sub(1) % ROWS_PER_PAGE);
            let x = offsets
                .get(cell.col.saturating_sub(1) as usize)
                .copied()
                .unwrap_or(MARGIN);
            let y = PAGE_HEIGHT - MARGIN - (line + 1) * ROW_HEIGHT;
            operations.extend(text_at(x, y, &cell.value.to_string()));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![int(0), int(0), int(PAGE_WIDTH), int(PAGE_HEIGHT)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();
    Ok(doc)
}

/// Left edge of every used column. Auto-fit columns are as wide as their
/// longest value, the rest get `COLUMN_WIDTH`.
fn column_offsets(sheet: &Sheet) -> Vec<i64> {
    let columns = sheet.cells.iter().map(|c| c.col).max().unwrap_or(0) as usize;
    let mut widths = vec![COLUMN_WIDTH; columns];
    if let Some(fit) = sheet.auto_fit {
        for col in fit.start..fit.end.min(columns as u32) {
            let longest = sheet
                .cells
                .iter()
                .filter(|c| c.col == col + 1)
                .map(|c| half_ems(&c.value.to_string()))
                .max()
                .unwrap_or(0);
            widths[col as usize] = (longest * FONT_SIZE / 2 + FONT_SIZE).max(MIN_FIT_WIDTH);
        }
    }
    widths
        .iter()
        .scan(MARGIN, |x, width| {
            let left = *x;
            *x += width;
            Some(left)
        })
        .collect()
}

/// Registers a Type0 font over the Adobe-CNS1 `MSung-Light` CID font.
/// Text goes through the predefined `UniCNS-UTF16-H` CMap, so strings are
/// written as UTF-16BE and viewers substitute their own CJK face.
fn add_cjk_font(doc: &mut Document) -> ObjectId {
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => FONT_NAME,
        "Flags" => int(6),
        "FontBBox" => vec![int(-160), int(-259), int(1015), int(888)],
        "ItalicAngle" => int(0),
        "Ascent" => int(880),
        "Descent" => int(-120),
        "CapHeight" => int(880),
        "StemV" => int(93),
    });
    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType0",
        "BaseFont" => FONT_NAME,
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("CNS1"),
            "Supplement" => int(4),
        },
        "FontDescriptor" => descriptor_id,
        "DW" => int(1000),
        // half-width Latin glyphs
        "W" => vec![int(1), int(95), int(500)],
    });
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => FONT_NAME,
        "Encoding" => FONT_CMAP,
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
    })
}

/// Position the text matrix at (x, y) and show `text`.
fn text_at(x: i64, y: i64, text: &str) -> [Operation; 2] {
    [
        Operation::new(
            "Tm",
            vec![int(1), int(0), int(0), int(1), int(x), int(y)],
        ),
        Operation::new("Tj", vec![utf16_string(text)]),
    ]
}

fn utf16_string(text: &str) -> Object {
    let bytes = text.encode_utf16().flat_map(u16::to_be_bytes).collect();
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Width in half-em units: ASCII is half width, everything else full.
fn half_ems(text: &str) -> i64 {
    text.chars().map(|c| if c.is_ascii() { 1 } else { 2 }).sum()
}

fn int(n: i64) -> Object {
    Object::Integer(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_writes_json_and_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let mut sheet = Sheet::new("Store", "2/19");
        sheet.append_cell(1, 1, "Product");
        sheet.append_cell(2, 1, "Tofu");
        sheet.append_cell(2, 3, 4_i64);

        let json_path = SheetExporter::new(dir.path()).export(&sheet).unwrap();
        assert_eq!(json_path, dir.path().join("Store 2_19.json"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["title"], "Store 2/19");
        assert_eq!(json["cells"][2]["value"], 4);
        assert_eq!(json["cells"][1]["value"], "Tofu");

        let pdf = Document::load(dir.path().join("Store 2_19.pdf")).unwrap();
        assert_eq!(pdf.get_pages().len(), 1);
    }

    #[test]
    fn test_long_sheet_spans_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut sheet = Sheet::new("人客", "2/19");
        for row in 1..=ROWS_PER_PAGE * 2 + 1 {
            sheet.append_cell(row, 1, format!("line {row}"));
        }
        SheetExporter::new(dir.path()).export(&sheet).unwrap();

        let pdf = Document::load(dir.path().join("人客 2_19.pdf")).unwrap();
        assert_eq!(pdf.get_pages().len(), 3);
    }

    #[test]
    fn test_auto_fit_columns_follow_content() {
        let mut sheet = Sheet::new("Store", "2/19");
        sheet.append_cell(1, 1, "a very long product name indeed");
        sheet.append_cell(1, 2, "x");
        sheet.append_cell(1, 4, "y");
        sheet.auto_fit = Some(crate::report::AutoFit { start: 0, end: 2 });

        let offsets = column_offsets(&sheet);
        assert_eq!(offsets.len(), 4);
        assert_eq!(offsets[0], MARGIN);
        assert!(offsets[1] - offsets[0] > COLUMN_WIDTH);
        assert_eq!(offsets[2] - offsets[1], MIN_FIT_WIDTH);
        assert_eq!(offsets[3] - offsets[2], COLUMN_WIDTH);
    }

    /// Every string shown on the first page, decoded back from UTF-16BE.
    fn shown_text(doc: &Document) -> Vec<String> {
        let page_id = *doc.get_pages().get(&1).unwrap();
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        content
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .map(|op| {
                let bytes = op.operands[0].as_str().unwrap();
                let units: Vec<u16> = bytes
                    .chunks(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16(&units).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_chinese_text_survives_the_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let mut sheet = Sheet::new("人客", "2/19");
        sheet.append_cell(1, 1, "豆花店");
        sheet.append_cell(1, 2, "$21.78");
        SheetExporter::new(dir.path()).export(&sheet).unwrap();

        let doc = Document::load(dir.path().join("人客 2_19.pdf")).unwrap();
        assert_eq!(shown_text(&doc), vec!["人客 2/19", "豆花店", "$21.78"]);

        let font = doc
            .objects
            .values()
            .filter_map(|o| o.as_dict().ok())
            .find(|d| d.get(b"Subtype").and_then(Object::as_name).ok() == Some(b"Type0".as_slice()))
            .unwrap();
        assert_eq!(font.get(b"Encoding").unwrap().as_name().unwrap(), FONT_CMAP.as_bytes());
    }

    #[test]
    fn test_wide_characters_widen_fitted_columns() {
        let mut sheet = Sheet::new("Store", "2/19");
        sheet.append_cell(1, 1, "傳統客家小炒傳統客家小炒");
        sheet.append_cell(1, 2, "abcdefghijkl");
        sheet.append_cell(1, 3, "x");
        sheet.auto_fit = Some(crate::report::AutoFit { start: 0, end: 2 });

        let offsets = column_offsets(&sheet);
        let chinese = offsets[1] - offsets[0];
        let latin = offsets[2] - offsets[1];
        assert_eq!(chinese, 12 * FONT_SIZE + FONT_SIZE);
        assert_eq!(latin, 6 * FONT_SIZE + FONT_SIZE);
    }

    #[test]
    fn test_empty_sheet_still_has_a_page() {
        let doc = render_pdf(&Sheet::new("Empty", "ALL")).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }
}
