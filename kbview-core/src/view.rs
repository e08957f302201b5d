use std::time::Instant;

use bytes::Bytes;
use thiserror::Error;

use crate::format::DocumentFormat;
use crate::navigator::MatchStatus;
use crate::search::Hit;
use crate::surface::PageSurface;

/// Failure owned by a single fallback renderer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ViewError {
    #[error("could not convert {format} document: {message}")]
    Conversion {
        format: DocumentFormat,
        message: String,
    },
    #[error("{0} documents cannot be previewed here; download to open locally")]
    Unsupported(DocumentFormat),
    #[error("failed to fetch document: {0}")]
    Fetch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStyle {
    Plain,
    Heading,
    Header,
    Match,
    CurrentMatch,
    Notice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    pub text: String,
    pub style: SpanStyle,
}

impl StyledSpan {
    pub fn new(text: impl Into<String>, style: SpanStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, SpanStyle::Plain)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyledLine {
    pub spans: Vec<StyledSpan>,
}

impl StyledLine {
    pub fn new(spans: Vec<StyledSpan>) -> Self {
        Self { spans }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(vec![StyledSpan::plain(text)])
    }

    pub fn styled(text: impl Into<String>, style: SpanStyle) -> Self {
        Self::new(vec![StyledSpan::new(text, style)])
    }

    pub fn text(&self) -> String {
        self.spans.iter().map(|span| span.text.as_str()).collect()
    }

    pub fn has_style(&self, style: SpanStyle) -> bool {
        self.spans.iter().any(|span| span.style == style)
    }
}

/// What the terminal host should draw for a view.
pub enum ViewFrame<'a> {
    Page {
        surface: &'a PageSurface,
        page_count: u32,
    },
    Lines {
        lines: Vec<StyledLine>,
        /// Line holding the current match, kept in view by the host.
        focus: Option<usize>,
    },
    Message {
        title: String,
        body: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
    NextPage { count: usize },
    PrevPage { count: usize },
    GotoPage { page: usize },
    ZoomIn,
    ZoomOut,
    FitWidth,
    LoadMoreRows,
    NextSheet,
    PrevSheet,
    SelectHit { index: usize },
}

/// Common render/search contract of every mounted document.
pub trait DocumentView {
    fn format(&self) -> DocumentFormat;
    fn title(&self) -> &str;

    /// Replaces the current query; a blank query clears all highlights.
    fn search(&mut self, query: &str) -> MatchStatus;
    fn query(&self) -> &str;
    fn next_match(&mut self) -> MatchStatus;
    fn prev_match(&mut self) -> MatchStatus;
    fn match_status(&self) -> MatchStatus;

    fn hits(&self) -> &[Hit] {
        &[]
    }

    /// Returns `true` when the view changed and needs a redraw.
    fn handle(&mut self, action: ViewAction, now: Instant) -> bool;

    /// Drives debounced work; returns `true` when something was recomputed.
    fn tick(&mut self, _now: Instant) -> bool {
        false
    }

    fn frame(&self) -> ViewFrame<'_>;
    fn location_label(&self) -> String;
    fn error(&self) -> Option<String>;
    fn source_bytes(&self) -> Option<&Bytes>;
}
