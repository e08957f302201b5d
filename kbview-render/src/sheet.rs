use std::io::Cursor;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use calamine::{open_workbook_auto_from_rs, Reader};
use kbview_core::search::find_byte_ranges;
use kbview_core::{
    DocumentFormat, DocumentView, MatchNavigator, MatchStatus, SpanStyle, StyledLine, StyledSpan,
    ViewAction, ViewError, ViewFrame,
};
use tracing::{debug, instrument, warn};

use crate::{spans_with_matches, TextMatch};

const MAX_COLUMN_WIDTH: usize = 24;
const COLUMN_SEPARATOR: &str = " │ ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    #[instrument(skip_all, fields(len = bytes.len()))]
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .context("failed to open workbook")?;
        let mut sheets = Vec::new();
        for name in workbook.sheet_names().to_owned() {
            let range = workbook
                .worksheet_range(&name)
                .with_context(|| format!("failed to read sheet {name:?}"))?;
            let rows = range
                .rows()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect();
            sheets.push(Sheet { name, rows });
        }
        if sheets.is_empty() {
            return Err(anyhow!("workbook has no sheets"));
        }
        debug!(sheets = sheets.len(), "workbook parsed");
        Ok(Self { sheets })
    }
}

#[derive(Debug, Clone)]
struct CellMatch {
    row: usize,
    column: usize,
    found: TextMatch,
}

/// Spreadsheet fallback: the active sheet as a row-limited table.
pub struct SheetView {
    title: String,
    format: DocumentFormat,
    workbook: Workbook,
    error: Option<ViewError>,
    active: usize,
    page_size: usize,
    visible_rows: usize,
    query: String,
    matches: Vec<CellMatch>,
    navigator: MatchNavigator,
    bytes: Option<Bytes>,
}

impl SheetView {
    pub fn from_bytes(title: String, format: DocumentFormat, bytes: Bytes, page_size: usize) -> Self {
        let mut view = match Workbook::parse(&bytes) {
            Ok(workbook) => Self::new(title, format, workbook, page_size),
            Err(err) => {
                warn!(?err, %title, "workbook conversion failed");
                let error = ViewError::Conversion {
                    format,
                    message: format!("{err:#}"),
                };
                Self::failed(title, format, error, page_size)
            }
        };
        view.bytes = Some(bytes);
        view
    }

    pub fn new(title: String, format: DocumentFormat, workbook: Workbook, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let mut view = Self {
            title,
            format,
            workbook,
            error: None,
            active: 0,
            page_size,
            visible_rows: 0,
            query: String::new(),
            matches: Vec::new(),
            navigator: MatchNavigator::new(),
            bytes: None,
        };
        view.visible_rows = view.total_rows().min(page_size);
        view
    }

    pub fn failed(title: String, format: DocumentFormat, error: ViewError, page_size: usize) -> Self {
        let mut view = Self::new(title, format, Workbook::default(), page_size);
        view.error = Some(error);
        view
    }

    pub fn sheet(&self) -> Option<&Sheet> {
        self.workbook.sheets.get(self.active)
    }

    pub fn total_rows(&self) -> usize {
        self.sheet().map(|sheet| sheet.rows.len()).unwrap_or(0)
    }

    pub fn visible_rows(&self) -> usize {
        self.visible_rows
    }

    /// Grows the visible window by one page, never past the sheet's row count.
    pub fn load_more(&mut self) -> bool {
        let next = (self.visible_rows + self.page_size).min(self.total_rows());
        if next == self.visible_rows {
            return false;
        }
        self.visible_rows = next;
        if !self.query.is_empty() {
            let query = self.query.clone();
            self.scan(&query);
            self.navigator.retain(self.matches.len());
        }
        true
    }

    /// Switches sheets, resetting the row window and search state.
    pub fn select_sheet(&mut self, index: usize) -> bool {
        if index >= self.workbook.sheets.len() || index == self.active {
            return false;
        }
        self.active = index;
        self.visible_rows = self.total_rows().min(self.page_size);
        self.query.clear();
        self.matches.clear();
        self.navigator.reset(0);
        true
    }

    fn scan(&mut self, query: &str) {
        self.matches.clear();
        if query.trim().is_empty() {
            return;
        }
        let Some(sheet) = self.workbook.sheets.get(self.active) else {
            return;
        };
        for (row, cells) in sheet.rows.iter().take(self.visible_rows).enumerate() {
            for (column, cell) in cells.iter().enumerate() {
                for range in find_byte_ranges(cell, query) {
                    let match_index = self.matches.len();
                    self.matches.push(CellMatch {
                        row,
                        column,
                        found: TextMatch { range, match_index },
                    });
                }
            }
        }
    }

    fn column_widths(&self, sheet: &Sheet) -> Vec<usize> {
        let mut widths: Vec<usize> = Vec::new();
        for cells in sheet.rows.iter().take(self.visible_rows) {
            for (column, cell) in cells.iter().enumerate() {
                let width = cell.chars().count().min(MAX_COLUMN_WIDTH);
                match widths.get_mut(column) {
                    Some(existing) => *existing = (*existing).max(width),
                    None => widths.push(width),
                }
            }
        }
        widths
    }

    fn render_rows(&self, sheet: &Sheet) -> (Vec<StyledLine>, Option<usize>) {
        let widths = self.column_widths(sheet);
        let current = self.navigator.current();
        let mut lines = Vec::with_capacity(self.visible_rows + 2);

        let header: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(column, width)| format!("{:<width$}", column_name(column), width = (*width).max(1)))
            .collect();
        lines.push(StyledLine::styled(
            format!("     {}", header.join(COLUMN_SEPARATOR)),
            SpanStyle::Header,
        ));

        let mut focus = None;
        for (row, cells) in sheet.rows.iter().take(self.visible_rows).enumerate() {
            let mut spans = vec![StyledSpan::new(format!("{:>4} ", row + 1), SpanStyle::Header)];
            for (column, width) in widths.iter().enumerate() {
                if column > 0 {
                    spans.push(StyledSpan::plain(COLUMN_SEPARATOR));
                }
                let cell = cells.get(column).map(String::as_str).unwrap_or("");
                let found: Vec<TextMatch> = self
                    .matches
                    .iter()
                    .filter(|m| m.row == row && m.column == column)
                    .map(|m| m.found.clone())
                    .collect();
                if found.iter().any(|m| Some(m.match_index) == current) {
                    focus = Some(lines.len());
                }
                spans.extend(spans_with_matches(cell, &found, current, SpanStyle::Plain));
                let padding = width.saturating_sub(cell.chars().count());
                if padding > 0 {
                    spans.push(StyledSpan::plain(" ".repeat(padding)));
                }
            }
            lines.push(StyledLine::new(spans));
        }

        if self.visible_rows < self.total_rows() {
            lines.push(StyledLine::styled(
                format!(
                    "… {} more rows (L to load {} more)",
                    self.total_rows() - self.visible_rows,
                    self.page_size.min(self.total_rows() - self.visible_rows)
                ),
                SpanStyle::Notice,
            ));
        }
        (lines, focus)
    }
}

fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

impl DocumentView for SheetView {
    fn format(&self) -> DocumentFormat {
        self.format
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn search(&mut self, query: &str) -> MatchStatus {
        self.query = query.to_string();
        self.scan(query);
        self.navigator.reset(self.matches.len());
        self.navigator.status()
    }

    fn query(&self) -> &str {
        &self.query
    }

    fn next_match(&mut self) -> MatchStatus {
        self.navigator.next();
        self.navigator.status()
    }

    fn prev_match(&mut self) -> MatchStatus {
        self.navigator.prev();
        self.navigator.status()
    }

    fn match_status(&self) -> MatchStatus {
        self.navigator.status()
    }

    fn handle(&mut self, action: ViewAction, _now: Instant) -> bool {
        if self.error.is_some() {
            return false;
        }
        let sheets = self.workbook.sheets.len();
        match action {
            ViewAction::LoadMoreRows => self.load_more(),
            ViewAction::NextSheet if sheets > 1 => self.select_sheet((self.active + 1) % sheets),
            ViewAction::PrevSheet if sheets > 1 => {
                self.select_sheet((self.active + sheets - 1) % sheets)
            }
            _ => false,
        }
    }

    fn frame(&self) -> ViewFrame<'_> {
        if let Some(err) = &self.error {
            return ViewFrame::Message {
                title: self.title.clone(),
                body: err.to_string(),
            };
        }
        match self.sheet() {
            Some(sheet) => {
                let (lines, focus) = self.render_rows(sheet);
                ViewFrame::Lines { lines, focus }
            }
            None => ViewFrame::Message {
                title: self.title.clone(),
                body: "Workbook is empty".to_string(),
            },
        }
    }

    fn location_label(&self) -> String {
        match self.sheet() {
            Some(sheet) => format!(
                "{} ({}/{}) · rows {}/{}",
                sheet.name,
                self.active + 1,
                self.workbook.sheets.len(),
                self.visible_rows,
                self.total_rows()
            ),
            None => String::new(),
        }
    }

    fn error(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    fn source_bytes(&self) -> Option<&Bytes> {
        self.bytes.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(name: &str, rows: usize) -> Sheet {
        Sheet {
            name: name.to_string(),
            rows: (1..=rows)
                .map(|row| vec![format!("item {row}"), format!("{}", row * 10)])
                .collect(),
        }
    }

    fn view() -> SheetView {
        let workbook = Workbook {
            sheets: vec![sheet("Inventory", 120), sheet("Archive", 3)],
        };
        SheetView::new("stock.xlsx".into(), DocumentFormat::Xlsx, workbook, 50)
    }

    #[test]
    fn load_more_grows_window_up_to_row_count() {
        let mut view = view();
        let now = Instant::now();
        assert_eq!(view.visible_rows(), 50);
        assert!(view.handle(ViewAction::LoadMoreRows, now));
        assert_eq!(view.visible_rows(), 100);
        assert!(view.handle(ViewAction::LoadMoreRows, now));
        assert_eq!(view.visible_rows(), 120);
        assert!(!view.handle(ViewAction::LoadMoreRows, now));
        assert_eq!(view.visible_rows(), 120);
    }

    #[test]
    fn search_is_scoped_to_visible_rows() {
        let mut view = view();
        // "item 1", "item 10".."item 19", "item 100".."item 119"
        assert_eq!(view.search("item 1").total, 11);
        view.load_more();
        assert_eq!(view.match_status().total, 12);
        view.load_more();
        assert_eq!(view.match_status().total, 31);
    }

    #[test]
    fn switching_sheets_resets_rows_and_search() {
        let mut view = view();
        view.load_more();
        view.search("item");
        assert!(view.handle(ViewAction::NextSheet, Instant::now()));
        assert_eq!(view.sheet().unwrap().name, "Archive");
        assert_eq!(view.visible_rows(), 3);
        assert_eq!(view.match_status(), MatchStatus::default());
        assert_eq!(view.query(), "");
        assert!(view.handle(ViewAction::PrevSheet, Instant::now()));
        assert_eq!(view.visible_rows(), 50);
    }

    #[test]
    fn frame_marks_current_match_and_more_rows_notice() {
        let mut view = view();
        view.search("item 2");
        view.next_match();
        match view.frame() {
            ViewFrame::Lines { lines, focus } => {
                // header + 50 rows + notice
                assert_eq!(lines.len(), 52);
                let focus = focus.unwrap();
                assert!(lines[focus].text().contains("item 20"));
                assert!(lines[focus].has_style(SpanStyle::CurrentMatch));
                assert!(lines.last().unwrap().has_style(SpanStyle::Notice));
            }
            _ => panic!("expected lines"),
        }
        assert_eq!(view.location_label(), "Inventory (1/2) · rows 50/120");
    }

    #[test]
    fn column_names_follow_spreadsheet_convention() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
    }

    #[test]
    fn unreadable_workbook_is_an_isolated_error() {
        let view = SheetView::from_bytes(
            "broken.xlsx".into(),
            DocumentFormat::Xlsx,
            Bytes::from_static(b"not a workbook"),
            50,
        );
        assert!(view.error().is_some());
        assert!(matches!(view.frame(), ViewFrame::Message { .. }));
        assert!(view.source_bytes().is_some());
    }
}
