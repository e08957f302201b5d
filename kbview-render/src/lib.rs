//! Concrete renderers: pdfium for PDF plus the word-processor, spreadsheet,
//! presentation and plain-text fallbacks, and the one-time dispatch between them.

pub mod mount;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod sheet;
pub mod slides;
pub mod text;
pub mod word;

use std::ops::Range;

use kbview_core::{SpanStyle, StyledSpan};

pub use mount::{mount, MountedDocument};
#[cfg(feature = "pdf")]
pub use pdf::PdfiumEngine;
pub use sheet::{Sheet, SheetView, Workbook};
pub use slides::SlidesView;
pub use text::TextView;
pub use word::{Block, BlockKind, Inline, MarkupTree, WordView};

/// A match inside a piece of text, tagged with its global match index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TextMatch {
    pub range: Range<usize>,
    pub match_index: usize,
}

/// Splits `text` into spans, styling matched byte ranges and the current match.
pub(crate) fn spans_with_matches(
    text: &str,
    matches: &[TextMatch],
    current: Option<usize>,
    base: SpanStyle,
) -> Vec<StyledSpan> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    for found in matches {
        if found.range.start > cursor {
            spans.push(StyledSpan::new(&text[cursor..found.range.start], base));
        }
        let style = if Some(found.match_index) == current {
            SpanStyle::CurrentMatch
        } else {
            SpanStyle::Match
        };
        spans.push(StyledSpan::new(&text[found.range.clone()], style));
        cursor = found.range.end;
    }
    if cursor < text.len() || spans.is_empty() {
        spans.push(StyledSpan::new(&text[cursor..], base));
    }
    spans
}
