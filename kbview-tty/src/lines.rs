use std::io::Write;

use anyhow::Result;
use crossterm::cursor::MoveTo;
use crossterm::style::{
    Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor,
};
use crossterm::terminal::{Clear, ClearType};
use kbview_core::{SpanStyle, StyledLine, StyledSpan};

/// Screen cells reserved for text output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextArea {
    pub col: u16,
    pub row: u16,
    pub width: u16,
    pub height: u16,
}

/// Vertical scroll position of a line view. Follows the focused line only
/// when the focus moves, so manual scrolling sticks between redraws.
#[derive(Debug, Clone, Default)]
pub struct LineScroll {
    offset: usize,
    last_focus: Option<usize>,
}

impl LineScroll {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn scroll_by(&mut self, delta: isize, total_rows: usize, height: usize) {
        let next = if delta < 0 {
            self.offset.saturating_sub(delta.unsigned_abs())
        } else {
            self.offset.saturating_add(delta as usize)
        };
        self.offset = next.min(max_offset(total_rows, height));
    }

    fn follow(
        &mut self,
        focus: Option<usize>,
        focus_row: Option<usize>,
        total_rows: usize,
        height: usize,
    ) {
        if focus != self.last_focus {
            self.last_focus = focus;
            if let Some(row) = focus_row {
                if row < self.offset || row >= self.offset + height.max(1) {
                    self.offset = row.saturating_sub(height / 3);
                }
            }
        }
        self.offset = self.offset.min(max_offset(total_rows, height));
    }
}

fn max_offset(total_rows: usize, height: usize) -> usize {
    total_rows.saturating_sub(height.max(1))
}

/// Splits a styled line into rows of at most `width` characters, keeping
/// span styles intact across the break.
pub fn wrap_line(line: &StyledLine, width: usize) -> Vec<Vec<StyledSpan>> {
    let width = width.max(1);
    let mut rows = vec![Vec::new()];
    let mut used = 0;
    for span in &line.spans {
        let mut chunk = String::new();
        for ch in span.text.chars() {
            if used == width {
                if !chunk.is_empty() {
                    push_span(&mut rows, std::mem::take(&mut chunk), span.style);
                }
                rows.push(Vec::new());
                used = 0;
            }
            chunk.push(ch);
            used += 1;
        }
        if !chunk.is_empty() {
            push_span(&mut rows, chunk, span.style);
        }
    }
    rows
}

fn push_span(rows: &mut [Vec<StyledSpan>], text: String, style: SpanStyle) {
    if let Some(row) = rows.last_mut() {
        row.push(StyledSpan::new(text, style));
    }
}

/// Draws `lines` into `area`, wrapped, keeping `focus` visible when it moves.
pub fn draw_lines<W: Write>(
    writer: &mut W,
    lines: &[StyledLine],
    focus: Option<usize>,
    scroll: &mut LineScroll,
    area: TextArea,
) -> Result<usize> {
    let width = usize::from(area.width);
    let height = usize::from(area.height);
    let mut rows = Vec::new();
    let mut focus_row = None;
    for (index, line) in lines.iter().enumerate() {
        if Some(index) == focus {
            focus_row = Some(rows.len());
        }
        rows.extend(wrap_line(line, width));
    }
    scroll.follow(focus, focus_row, rows.len(), height);

    for screen_row in 0..area.height {
        crossterm::queue!(
            writer,
            MoveTo(area.col, area.row + screen_row),
            Clear(ClearType::UntilNewLine)
        )?;
        let Some(spans) = rows.get(scroll.offset + usize::from(screen_row)) else {
            continue;
        };
        for span in spans {
            apply_style(writer, span.style)?;
            crossterm::queue!(
                writer,
                Print(&span.text),
                SetAttribute(Attribute::Reset),
                ResetColor
            )?;
        }
    }
    writer.flush()?;
    Ok(rows.len())
}

fn apply_style<W: Write>(writer: &mut W, style: SpanStyle) -> Result<()> {
    match style {
        SpanStyle::Plain => {}
        SpanStyle::Heading => {
            crossterm::queue!(writer, SetAttribute(Attribute::Bold))?;
        }
        SpanStyle::Header => {
            crossterm::queue!(
                writer,
                SetAttribute(Attribute::Bold),
                SetAttribute(Attribute::Underlined)
            )?;
        }
        SpanStyle::Match => {
            crossterm::queue!(
                writer,
                SetBackgroundColor(Color::Yellow),
                SetForegroundColor(Color::Black)
            )?;
        }
        SpanStyle::CurrentMatch => {
            crossterm::queue!(
                writer,
                SetBackgroundColor(Color::Rgb { r: 255, g: 120, b: 0 }),
                SetForegroundColor(Color::Black),
                SetAttribute(Attribute::Bold)
            )?;
        }
        SpanStyle::Notice => {
            crossterm::queue!(writer, SetAttribute(Attribute::Dim))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(rows: &[Vec<StyledSpan>]) -> Vec<String> {
        rows.iter()
            .map(|row| row.iter().map(|span| span.text.as_str()).collect())
            .collect()
    }

    #[test]
    fn wrapping_splits_spans_at_the_width() {
        let line = StyledLine::new(vec![
            StyledSpan::plain("abc"),
            StyledSpan::new("defg", SpanStyle::CurrentMatch),
            StyledSpan::plain("h"),
        ]);
        let rows = wrap_line(&line, 4);
        assert_eq!(texts(&rows), vec!["abcd", "efgh"]);
        assert_eq!(rows[0][1].style, SpanStyle::CurrentMatch);
        assert_eq!(rows[1][0], StyledSpan::new("efg", SpanStyle::CurrentMatch));
    }

    #[test]
    fn empty_line_keeps_one_row() {
        assert_eq!(wrap_line(&StyledLine::default(), 10).len(), 1);
    }

    #[test]
    fn scroll_follows_a_moving_focus_only() {
        let lines: Vec<StyledLine> = (0..50)
            .map(|n| StyledLine::plain(format!("line {n}")))
            .collect();
        let area = TextArea {
            col: 0,
            row: 0,
            width: 20,
            height: 9,
        };
        let mut scroll = LineScroll::new();
        let mut out = Vec::new();

        draw_lines(&mut out, &lines, Some(30), &mut scroll, area).unwrap();
        assert_eq!(scroll.offset(), 27);

        scroll.scroll_by(-20, 50, 9);
        draw_lines(&mut out, &lines, Some(30), &mut scroll, area).unwrap();
        assert_eq!(scroll.offset(), 7);

        draw_lines(&mut out, &lines, Some(49), &mut scroll, area).unwrap();
        assert_eq!(scroll.offset(), 41);
    }

    #[test]
    fn match_spans_are_colored() {
        let lines = vec![StyledLine::new(vec![
            StyledSpan::plain("a "),
            StyledSpan::new("hit", SpanStyle::Match),
        ])];
        let mut out = Vec::new();
        let area = TextArea {
            col: 0,
            row: 0,
            width: 20,
            height: 1,
        };
        let rows = draw_lines(&mut out, &lines, None, &mut LineScroll::new(), area).unwrap();
        assert_eq!(rows, 1);
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("hit"));
        assert!(text.contains("48;5;11"));
    }
}
