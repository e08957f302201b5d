use std::time::Instant;

use anyhow::{Context, Result};
use bytes::Bytes;
use kbview_core::{
    DocumentFormat, DocumentView, MatchNavigator, MatchStatus, SpanStyle, StyledLine, ViewAction,
    ViewError, ViewFrame,
};
use regex::{Regex, RegexBuilder};
use tracing::{error, warn};

use crate::{spans_with_matches, TextMatch};

/// Plain-text fallback: whole-document highlight, no virtualization.
pub struct TextView {
    title: String,
    content: String,
    query: String,
    matches: Vec<TextMatch>,
    navigator: MatchNavigator,
    bytes: Option<Bytes>,
    error: Option<ViewError>,
}

fn query_regex(query: &str) -> Result<Regex> {
    RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
        .with_context(|| format!("failed to build pattern for {query:?}"))
}

impl TextView {
    pub fn from_bytes(title: String, bytes: Bytes) -> Self {
        let content = match std::str::from_utf8(&bytes) {
            Ok(text) => text.to_string(),
            Err(err) => {
                warn!(%err, %title, "text is not valid UTF-8; decoding lossily");
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };
        Self {
            title,
            content,
            query: String::new(),
            matches: Vec::new(),
            navigator: MatchNavigator::new(),
            bytes: Some(bytes),
            error: None,
        }
    }

    pub fn failed(title: String, error: ViewError) -> Self {
        Self {
            title,
            content: String::new(),
            query: String::new(),
            matches: Vec::new(),
            navigator: MatchNavigator::new(),
            bytes: None,
            error: Some(error),
        }
    }

    fn lines(&self) -> (Vec<StyledLine>, Option<usize>) {
        let current = self.navigator.current();
        let mut lines = Vec::new();
        let mut focus = None;
        let mut offset = 0;
        let mut pending = self.matches.iter().peekable();

        for (number, line) in self.content.split('\n').enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let end = offset + line.len();
            let mut found = Vec::new();
            while let Some(m) = pending.next_if(|m| m.range.start < end) {
                if Some(m.match_index) == current {
                    focus = Some(number);
                }
                // Nothing of a match that sits inside a "\r\n" break is visible here.
                if m.range.end <= offset {
                    continue;
                }
                let start = m.range.start.max(offset) - offset;
                let stop = m.range.end.min(end) - offset;
                found.push(TextMatch {
                    range: start..stop,
                    match_index: m.match_index,
                });
            }
            lines.push(StyledLine::new(spans_with_matches(
                line,
                &found,
                current,
                SpanStyle::Plain,
            )));
            offset = self.content[offset..]
                .find('\n')
                .map(|idx| offset + idx + 1)
                .unwrap_or(self.content.len());
        }
        (lines, focus)
    }
}

impl DocumentView for TextView {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Txt
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn search(&mut self, query: &str) -> MatchStatus {
        self.query = query.to_string();
        self.matches.clear();
        if !query.trim().is_empty() {
            match query_regex(query) {
                Ok(pattern) => {
                    self.matches = pattern
                        .find_iter(&self.content)
                        .enumerate()
                        .map(|(match_index, found)| TextMatch {
                            range: found.range(),
                            match_index,
                        })
                        .collect();
                }
                Err(err) => error!(?err, "text search failed"),
            }
        }
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

    fn handle(&mut self, _action: ViewAction, _now: Instant) -> bool {
        false
    }

    fn frame(&self) -> ViewFrame<'_> {
        if let Some(err) = &self.error {
            return ViewFrame::Message {
                title: self.title.clone(),
                body: err.to_string(),
            };
        }
        let (lines, focus) = self.lines();
        ViewFrame::Lines { lines, focus }
    }

    fn location_label(&self) -> String {
        format!("{} lines", self.content.lines().count())
    }

    fn error(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    fn source_bytes(&self) -> Option<&Bytes> {
        self.bytes.as_ref()
    }
}
