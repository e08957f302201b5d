use std::time::Instant;

use bytes::Bytes;
use kbview_core::{
    DocumentFormat, DocumentView, MatchStatus, ViewAction, ViewError, ViewFrame,
};

/// Presentations are not previewed; the only action is downloading the file.
pub struct SlidesView {
    title: String,
    format: DocumentFormat,
    query: String,
    bytes: Option<Bytes>,
    error: Option<ViewError>,
}

impl SlidesView {
    pub fn new(title: String, format: DocumentFormat, bytes: Bytes) -> Self {
        Self {
            title,
            format,
            query: String::new(),
            bytes: Some(bytes),
            error: None,
        }
    }

    pub fn failed(title: String, format: DocumentFormat, error: ViewError) -> Self {
        Self {
            title,
            format,
            query: String::new(),
            bytes: None,
            error: Some(error),
        }
    }
}

impl DocumentView for SlidesView {
    fn format(&self) -> DocumentFormat {
        self.format
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn search(&mut self, query: &str) -> MatchStatus {
        self.query = query.to_string();
        MatchStatus::default()
    }

    fn query(&self) -> &str {
        &self.query
    }

    fn next_match(&mut self) -> MatchStatus {
        MatchStatus::default()
    }

    fn prev_match(&mut self) -> MatchStatus {
        MatchStatus::default()
    }

    fn match_status(&self) -> MatchStatus {
        MatchStatus::default()
    }

    fn handle(&mut self, _action: ViewAction, _now: Instant) -> bool {
        false
    }

    fn frame(&self) -> ViewFrame<'_> {
        let body = match &self.error {
            Some(err) => err.to_string(),
            None => format!(
                "{}\n\nPress s to save a copy and open it in a presentation app.",
                ViewError::Unsupported(self.format)
            ),
        };
        ViewFrame::Message {
            title: self.title.clone(),
            body,
        }
    }

    fn location_label(&self) -> String {
        match &self.bytes {
            Some(bytes) => format!("{} KiB", bytes.len().div_ceil(1024)),
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
