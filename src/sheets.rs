//! Spreadsheet capability layer.
//!
//! The renderer talks to a destination spreadsheet only through [`SheetStore`]
//! and the typed request vocabulary below, mirroring the subset of a
//! batch-update style sheets API the report needs: merged regions, repeated
//! cell formats, borders, dimension changes, conditional formats, and charts.
//! [`SpreadsheetFile`] is the bundled implementation: one JSON document per
//! spreadsheet id, kept under the workspace.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bad A1 range: {0}")]
    BadRange(String),
    #[error("no sheet titled '{0}' in spreadsheet")]
    UnknownSheet(String),
    #[error("sheet titled '{0}' already exists")]
    DuplicateSheet(String),
}

/// Zero-based column index to A1 letters ("A", "Z", "AA", ...).
pub fn col_letters(col: usize) -> String {
    let mut n = col + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).expect("ascii letters")
}

/// A1 notation for a single anchor cell, zero-based row/col.
pub fn a1_cell(sheet: &str, row: usize, col: usize) -> String {
    format!("'{}'!{}{}", sheet, col_letters(col), row + 1)
}

/// Parses an anchor range produced by [`a1_cell`] back into
/// (sheet title, row, col), both zero-based.
pub fn parse_a1(range: &str) -> Result<(String, usize, usize), StoreError> {
    let bad = || StoreError::BadRange(range.to_string());
    let (sheet, cell) = range.rsplit_once('!').ok_or_else(bad)?;
    let sheet = sheet.trim_matches('\'').to_string();

    let letters: String = cell.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &cell[letters.len()..];
    if letters.is_empty() || digits.is_empty() {
        return Err(bad());
    }
    let mut col: usize = 0;
    for ch in letters.chars() {
        col = col * 26 + (ch.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    let row: usize = digits.parse().map_err(|_| bad())?;
    if row == 0 {
        return Err(bad());
    }
    Ok((sheet, row - 1, col - 1))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

pub const RED: Color = Color {
    red: 1.0,
    green: 0.0,
    blue: 0.0,
};
pub const YELLOW: Color = Color {
    red: 1.0,
    green: 1.0,
    blue: 0.0,
};
pub const BLUE_ACCENT: Color = Color {
    red: 0.0,
    green: 0.4,
    blue: 0.8,
};
pub const BROWN_ACCENT: Color = Color {
    red: 0.6,
    green: 0.2,
    blue: 0.0,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextFormat {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<i64>,
    #[serde(default)]
    pub bold: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreground_color: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
}

pub fn text_format(font_size: i64, bold: bool) -> TextFormat {
    TextFormat {
        font_size: Some(font_size),
        bold,
        foreground_color: None,
        font_family: None,
    }
}

pub fn colored_text(font_size: i64, bold: bool, color: Color) -> TextFormat {
    TextFormat {
        foreground_color: Some(color),
        ..text_format(font_size, bold)
    }
}

/// Solid border widths per edge; `None` leaves the edge untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BorderWidths {
    pub top: Option<u8>,
    pub bottom: Option<u8>,
    pub left: Option<u8>,
    pub right: Option<u8>,
}

pub fn borders(top: u8, bottom: u8, left: u8, right: u8) -> BorderWidths {
    BorderWidths {
        top: Some(top),
        bottom: Some(bottom),
        left: Some(left),
        right: Some(right),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Padding {
    pub top: i64,
    pub bottom: i64,
    pub left: i64,
    pub right: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HorizontalAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellFormat {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_format: Option<TextFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub borders: Option<BorderWidths>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizontal_alignment: Option<HorizontalAlign>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<Padding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRange {
    pub sheet_id: i64,
    pub start_row: usize,
    pub end_row: usize,
    pub start_col: usize,
    pub end_col: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Dimension {
    Rows,
    Columns,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    TextEq { value: String },
    NumberLess { value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalFormatRule {
    pub ranges: Vec<GridRange>,
    pub condition: Condition,
    pub format: CellFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    pub title: String,
    pub domain: GridRange,
    pub series: Vec<GridRange>,
    pub anchor_row: usize,
    pub anchor_col: usize,
    pub width_pixels: i64,
    pub height_pixels: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SheetRequest {
    MergeCells {
        range: GridRange,
    },
    RepeatCell {
        range: GridRange,
        format: CellFormat,
    },
    UpdateBorders {
        range: GridRange,
        widths: BorderWidths,
    },
    UpdateDimensions {
        sheet_id: i64,
        dimension: Dimension,
        start_index: usize,
        end_index: usize,
        pixel_size: i64,
    },
    AutoResizeRows {
        sheet_id: i64,
        start_index: usize,
        end_index: usize,
    },
    AddConditionalFormat {
        rule: ConditionalFormatRule,
        index: usize,
    },
    AddChart {
        chart: ChartSpec,
    },
    SetDefaultFontFamily {
        sheet_id: i64,
        family: String,
    },
}

pub fn grid_range(
    sheet_id: i64,
    start_row: usize,
    end_row: usize,
    start_col: usize,
    end_col: usize,
) -> GridRange {
    GridRange {
        sheet_id,
        start_row,
        end_row,
        start_col,
        end_col,
    }
}

pub fn merge_cells(
    sheet_id: i64,
    start_row: usize,
    end_row: usize,
    start_col: usize,
    end_col: usize,
) -> SheetRequest {
    SheetRequest::MergeCells {
        range: grid_range(sheet_id, start_row, end_row, start_col, end_col),
    }
}

/// Repeated cell format; report cells default to centered alignment, which a
/// caller overrides through `format.horizontal_alignment` when needed.
pub fn repeat_cell(
    sheet_id: i64,
    start_row: usize,
    end_row: usize,
    start_col: usize,
    end_col: usize,
    mut format: CellFormat,
) -> SheetRequest {
    if format.horizontal_alignment.is_none() {
        format.horizontal_alignment = Some(HorizontalAlign::Center);
    }
    SheetRequest::RepeatCell {
        range: grid_range(sheet_id, start_row, end_row, start_col, end_col),
        format,
    }
}

pub fn update_borders(
    sheet_id: i64,
    start_row: usize,
    end_row: usize,
    start_col: usize,
    end_col: usize,
    widths: BorderWidths,
) -> SheetRequest {
    SheetRequest::UpdateBorders {
        range: grid_range(sheet_id, start_row, end_row, start_col, end_col),
        widths,
    }
}

pub fn update_dimensions(
    sheet_id: i64,
    dimension: Dimension,
    start_index: usize,
    end_index: usize,
    pixel_size: i64,
) -> SheetRequest {
    SheetRequest::UpdateDimensions {
        sheet_id,
        dimension,
        start_index,
        end_index,
        pixel_size,
    }
}

/// One A1-anchored block of rows, matching a values batch-update entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub range: String,
    pub values: Vec<Vec<serde_json::Value>>,
}

/// The destination-spreadsheet contract. A single implementation covers one
/// backend; the daemon ships [`SpreadsheetFile`].
pub trait SheetStore {
    fn sheet_id(&self, spreadsheet_id: &str, title: &str) -> Result<Option<i64>, StoreError>;
    fn create_sheet(&mut self, spreadsheet_id: &str, title: &str) -> Result<i64, StoreError>;
    fn batch_format(
        &mut self,
        spreadsheet_id: &str,
        requests: Vec<SheetRequest>,
    ) -> Result<(), StoreError>;
    fn write_values(
        &mut self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<serde_json::Value>>,
    ) -> Result<(), StoreError>;
    fn write_values_batch(
        &mut self,
        spreadsheet_id: &str,
        data: Vec<ValueRange>,
    ) -> Result<(), StoreError>;
    fn shareable_link(&self, spreadsheet_id: &str) -> String;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetDoc {
    sheet_id: i64,
    title: String,
    /// Sparse cell map keyed "r{row}c{col}", zero-based.
    cells: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpreadsheetDoc {
    next_sheet_id: i64,
    sheets: Vec<SheetDoc>,
    requests: Vec<SheetRequest>,
}

impl Default for SpreadsheetDoc {
    fn default() -> Self {
        SpreadsheetDoc {
            next_sheet_id: 1,
            sheets: Vec::new(),
            requests: Vec::new(),
        }
    }
}

pub fn cell_key(row: usize, col: usize) -> String {
    format!("r{}c{}", row, col)
}

/// File-backed spreadsheet store: one JSON document per spreadsheet id under
/// `root`. Every mutation is persisted immediately, so a failed later write
/// leaves earlier writes visible (same partial-write semantics as a remote
/// batch API).
pub struct SpreadsheetFile {
    root: PathBuf,
}

impl SpreadsheetFile {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SpreadsheetFile { root: root.into() }
    }

    fn doc_path(&self, spreadsheet_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", spreadsheet_id))
    }

    fn load(&self, spreadsheet_id: &str) -> Result<SpreadsheetDoc, StoreError> {
        let path = self.doc_path(spreadsheet_id);
        if !path.is_file() {
            return Ok(SpreadsheetDoc::default());
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save(&self, spreadsheet_id: &str, doc: &SpreadsheetDoc) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let text = serde_json::to_string_pretty(doc)?;
        fs::write(self.doc_path(spreadsheet_id), text)?;
        Ok(())
    }

    fn place(
        doc: &mut SpreadsheetDoc,
        range: &str,
        rows: &[Vec<serde_json::Value>],
    ) -> Result<(), StoreError> {
        let (title, start_row, start_col) = parse_a1(range)?;
        let sheet = doc
            .sheets
            .iter_mut()
            .find(|s| s.title == title)
            .ok_or(StoreError::UnknownSheet(title))?;
        for (i, row) in rows.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                sheet
                    .cells
                    .insert(cell_key(start_row + i, start_col + j), value.clone());
            }
        }
        Ok(())
    }
}

impl SheetStore for SpreadsheetFile {
    fn sheet_id(&self, spreadsheet_id: &str, title: &str) -> Result<Option<i64>, StoreError> {
        let doc = self.load(spreadsheet_id)?;
        Ok(doc
            .sheets
            .iter()
            .find(|s| s.title == title)
            .map(|s| s.sheet_id))
    }

    fn create_sheet(&mut self, spreadsheet_id: &str, title: &str) -> Result<i64, StoreError> {
        let mut doc = self.load(spreadsheet_id)?;
        if doc.sheets.iter().any(|s| s.title == title) {
            return Err(StoreError::DuplicateSheet(title.to_string()));
        }
        let sheet_id = doc.next_sheet_id;
        doc.next_sheet_id += 1;
        doc.sheets.push(SheetDoc {
            sheet_id,
            title: title.to_string(),
            cells: BTreeMap::new(),
        });
        self.save(spreadsheet_id, &doc)?;
        Ok(sheet_id)
    }

    fn batch_format(
        &mut self,
        spreadsheet_id: &str,
        requests: Vec<SheetRequest>,
    ) -> Result<(), StoreError> {
        let mut doc = self.load(spreadsheet_id)?;
        doc.requests.extend(requests);
        self.save(spreadsheet_id, &doc)
    }

    fn write_values(
        &mut self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<serde_json::Value>>,
    ) -> Result<(), StoreError> {
        let mut doc = self.load(spreadsheet_id)?;
        Self::place(&mut doc, range, &rows)?;
        self.save(spreadsheet_id, &doc)
    }

    fn write_values_batch(
        &mut self,
        spreadsheet_id: &str,
        data: Vec<ValueRange>,
    ) -> Result<(), StoreError> {
        let mut doc = self.load(spreadsheet_id)?;
        for entry in &data {
            Self::place(&mut doc, &entry.range, &entry.values)?;
        }
        self.save(spreadsheet_id, &doc)
    }

    fn shareable_link(&self, spreadsheet_id: &str) -> String {
        format!(
            "file://{}",
            self.doc_path(spreadsheet_id).to_string_lossy()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_root(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn col_letters_cover_multi_letter_columns() {
        assert_eq!(col_letters(0), "A");
        assert_eq!(col_letters(25), "Z");
        assert_eq!(col_letters(26), "AA");
        assert_eq!(col_letters(27), "AB");
        assert_eq!(col_letters(51), "AZ");
        assert_eq!(col_letters(52), "BA");
    }

    #[test]
    fn a1_roundtrip() {
        let range = a1_cell("TE 09 SEM-1 2023-24", 7, 28);
        assert_eq!(range, "'TE 09 SEM-1 2023-24'!AC8");
        let (sheet, row, col) = parse_a1(&range).expect("parse");
        assert_eq!(sheet, "TE 09 SEM-1 2023-24");
        assert_eq!(row, 7);
        assert_eq!(col, 28);
    }

    #[test]
    fn create_sheet_rejects_duplicate_titles() {
        let mut store = SpreadsheetFile::new(temp_root("sheetstore-dup"));
        let id = store.create_sheet("master", "TE 09").expect("create");
        assert_eq!(store.sheet_id("master", "TE 09").expect("lookup"), Some(id));
        assert!(matches!(
            store.create_sheet("master", "TE 09"),
            Err(StoreError::DuplicateSheet(_))
        ));
    }

    #[test]
    fn values_land_at_parsed_anchor() {
        let mut store = SpreadsheetFile::new(temp_root("sheetstore-values"));
        store.create_sheet("master", "S").expect("create");
        store
            .write_values(
                "master",
                &a1_cell("S", 2, 1),
                vec![vec![json!("x"), json!(30)], vec![json!("y"), json!(12)]],
            )
            .expect("write");
        let doc = store.load("master").expect("load");
        let cells = &doc.sheets[0].cells;
        assert_eq!(cells.get(&cell_key(2, 1)), Some(&json!("x")));
        assert_eq!(cells.get(&cell_key(3, 2)), Some(&json!(12)));
    }

    #[test]
    fn write_to_missing_sheet_is_an_error() {
        let mut store = SpreadsheetFile::new(temp_root("sheetstore-missing"));
        let res = store.write_values("master", "'Nope'!A1", vec![vec![json!(1)]]);
        assert!(matches!(res, Err(StoreError::UnknownSheet(_))));
    }
}
