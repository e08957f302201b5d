use std::collections::BTreeMap;
use std::ops::Range;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, error, instrument, warn};

use crate::config::ViewerConfig;
use crate::document::PdfDocumentHandle;
use crate::geometry::{CoordinateMapper, Viewport};
use crate::surface::{OverlayRect, PageSurfaces};

const SNIPPET_CONTEXT: usize = 40;

/// Entry in the results panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hit {
    pub page_number: u32,
    pub snippet: String,
    pub match_index: usize,
}

/// Highlight rectangle in displayed pixels of its page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Highlight {
    pub page_number: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub is_current: bool,
    pub match_index: usize,
    pub rotated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub hits: Vec<Hit>,
    pub highlights: Vec<Highlight>,
}

impl SearchResult {
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn total_matches(&self) -> usize {
        self.highlights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.highlights.is_empty()
    }

    pub fn restyle(&mut self, current: Option<usize>) {
        for highlight in &mut self.highlights {
            highlight.is_current = Some(highlight.match_index) == current;
        }
    }

    pub fn page_of(&self, match_index: usize) -> Option<u32> {
        self.highlights
            .get(match_index)
            .map(|highlight| highlight.page_number)
    }
}

/// Case-insensitive, non-overlapping occurrences of `needle` in `haystack`
/// as `(char_offset, char_len)` pairs, scanned left to right.
pub fn find_occurrences(haystack: &str, needle: &str) -> Vec<(usize, usize)> {
    let hay = fold_case(haystack);
    let pattern = fold_case(needle);
    let mut found = Vec::new();
    if pattern.is_empty() || pattern.len() > hay.len() {
        return found;
    }

    let mut from = 0;
    while from + pattern.len() <= hay.len() {
        match hay[from..]
            .windows(pattern.len())
            .position(|window| window == pattern.as_slice())
        {
            Some(position) => {
                let start = from + position;
                found.push((start, pattern.len()));
                from = start + pattern.len();
            }
            None => break,
        }
    }
    found
}

/// Same as [`find_occurrences`] but expressed as byte ranges into `haystack`.
pub fn find_byte_ranges(haystack: &str, needle: &str) -> Vec<Range<usize>> {
    let occurrences = find_occurrences(haystack, needle);
    if occurrences.is_empty() {
        return Vec::new();
    }
    let mut boundaries: Vec<usize> = haystack.char_indices().map(|(idx, _)| idx).collect();
    boundaries.push(haystack.len());
    occurrences
        .into_iter()
        .map(|(start, len)| boundaries[start]..boundaries[start + len])
        .collect()
}

// One lowercase char per input char, so character offsets survive folding.
fn fold_case(text: &str) -> Vec<char> {
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

pub struct SearchEngine {
    mapper: CoordinateMapper,
    page_limit: Option<u32>,
}

impl SearchEngine {
    pub fn new(mapper: CoordinateMapper, page_limit: Option<u32>) -> Self {
        Self { mapper, page_limit }
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        Self::new(
            CoordinateMapper::new(config.highlight_min_width, config.highlight_padding),
            config.search_page_limit(),
        )
    }

    /// Runs a search and rewrites every page overlay.
    ///
    /// A blank query clears all overlays. Failures are logged and resolve to
    /// an empty result rather than propagating.
    #[instrument(skip(self, document, surfaces))]
    pub fn search(
        &self,
        document: &dyn PdfDocumentHandle,
        surfaces: &mut PageSurfaces,
        query: &str,
        scale: f32,
        current: Option<usize>,
    ) -> SearchResult {
        surfaces.clear_overlays();
        if query.trim().is_empty() {
            return SearchResult::default();
        }

        match self.try_search(document, surfaces, query, scale, current) {
            Ok(result) => result,
            Err(err) => {
                error!(?err, query, "search failed");
                surfaces.clear_overlays();
                SearchResult::empty(query)
            }
        }
    }

    fn pages_to_scan(&self, page_count: u32) -> u32 {
        match self.page_limit {
            Some(limit) => page_count.min(limit),
            None => page_count,
        }
    }

    fn try_search(
        &self,
        document: &dyn PdfDocumentHandle,
        surfaces: &mut PageSurfaces,
        query: &str,
        scale: f32,
        current: Option<usize>,
    ) -> Result<SearchResult> {
        let mut result = SearchResult::empty(query);
        let mut overlays: BTreeMap<u32, Vec<OverlayRect>> = BTreeMap::new();
        let mut rotated = 0usize;

        for page_number in 1..=self.pages_to_scan(document.page_count()) {
            let runs = document
                .text_runs(page_number)
                .with_context(|| format!("failed to read text of page {page_number}"))?;
            let (viewport, ratio) = match surfaces.get(page_number) {
                Some(surface) => (surface.viewport(), surface.display_ratio()),
                None => {
                    let size = document.page_size(page_number)?;
                    (Viewport::for_page(size, scale), 1.0)
                }
            };

            let page_text = PageText::new(&runs);
            for (run_index, run) in runs.iter().enumerate() {
                for (offset, len) in find_occurrences(&run.text, query) {
                    let match_index = result.highlights.len();
                    let mapped = self.mapper.map(run, offset, len, &viewport, ratio);
                    if mapped.rotated {
                        rotated += 1;
                    }
                    let is_current = current == Some(match_index);
                    result.highlights.push(Highlight {
                        page_number,
                        x: mapped.rect.x,
                        y: mapped.rect.y,
                        width: mapped.rect.width,
                        height: mapped.rect.height,
                        is_current,
                        match_index,
                        rotated: mapped.rotated,
                    });
                    result.hits.push(Hit {
                        page_number,
                        snippet: page_text.snippet(run_index, offset, len),
                        match_index,
                    });
                    overlays.entry(page_number).or_default().push(OverlayRect {
                        rect: mapped.rect,
                        match_index,
                        is_current,
                        rotated: mapped.rotated,
                    });
                }
            }
        }

        for (page_number, rects) in overlays {
            match surfaces.get_mut(page_number) {
                Some(surface) => surface.replace_overlay(rects),
                None => debug!(page_number, "no surface for page yet; overlay skipped"),
            }
        }

        if rotated > 0 {
            warn!(
                rotated,
                query, "highlights on rotated or mirrored text are approximate"
            );
        }

        Ok(result)
    }
}

/// Runs of one page joined with spaces, used to cut snippets across run boundaries.
struct PageText {
    chars: Vec<char>,
    run_starts: Vec<usize>,
}

impl PageText {
    fn new(runs: &[crate::geometry::TextRun]) -> Self {
        let mut chars = Vec::new();
        let mut run_starts = Vec::with_capacity(runs.len());
        for run in runs {
            if !chars.is_empty() {
                chars.push(' ');
            }
            run_starts.push(chars.len());
            chars.extend(run.text.chars());
        }
        Self { chars, run_starts }
    }

    fn snippet(&self, run_index: usize, offset: usize, len: usize) -> String {
        let start = self.run_starts.get(run_index).copied().unwrap_or(0) + offset;
        let from = start.saturating_sub(SNIPPET_CONTEXT);
        let to = (start + len + SNIPPET_CONTEXT).min(self.chars.len());
        let body: String = self.chars[from..to].iter().collect();
        let body = body.split_whitespace().collect::<Vec<_>>().join(" ");

        let mut snippet = String::new();
        if from > 0 {
            snippet.push('…');
        }
        snippet.push_str(&body);
        if to < self.chars.len() {
            snippet.push('…');
        }
        snippet
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SearchTicket(u64);

/// Issues tickets for search invocations; only the latest one may publish results.
#[derive(Debug, Default)]
pub struct SearchTickets {
    latest: u64,
}

impl SearchTickets {
    pub fn issue(&mut self) -> SearchTicket {
        self.latest += 1;
        SearchTicket(self.latest)
    }

    pub fn is_current(&self, ticket: SearchTicket) -> bool {
        ticket.0 == self.latest
    }
}
