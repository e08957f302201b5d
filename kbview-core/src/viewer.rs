use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, info};

use crate::config::ViewerConfig;
use crate::document::PdfEngine;
use crate::format::DocumentFormat;
use crate::loader::{CancellationFlag, LoadProgress, LoadState, LoadedDocument, PageRenderer};
use crate::navigator::{MatchNavigator, MatchStatus};
use crate::search::{Hit, SearchEngine, SearchResult};
use crate::source::{ByteSource, DocumentSource};
use crate::view::{DocumentView, ViewAction, ViewFrame};
use crate::zoom::ZoomController;

/// Rasterized PDF with search highlights, match cursor and visual zoom.
pub struct PdfViewer {
    title: String,
    state: LoadState,
    document: Option<LoadedDocument>,
    engine: SearchEngine,
    result: SearchResult,
    navigator: MatchNavigator,
    zoom: ZoomController,
    current_page: u32,
}

impl PdfViewer {
    /// Loads `source` and applies its initial page and query.
    ///
    /// Never fails: fetch, parse and render failures become the viewer's
    /// terminal error state.
    pub async fn open<S, E, F>(
        fetcher: &S,
        engine: &E,
        source: &DocumentSource,
        config: &ViewerConfig,
        cancel: &CancellationFlag,
        on_progress: F,
    ) -> Self
    where
        S: ByteSource + ?Sized,
        E: PdfEngine + ?Sized,
        F: FnMut(LoadProgress),
    {
        let mut renderer = PageRenderer::new(config.container_width, config);
        let loaded = renderer
            .load(fetcher, engine, source, cancel, on_progress)
            .await;
        let title = source.file_name();
        match loaded {
            Ok(document) => {
                let mut viewer = Self::from_loaded(title, document, config);
                if let Some(query) = &source.initial_query {
                    viewer.run_search(query);
                }
                if let Some(page) = source.initial_page {
                    viewer.anchor_at_page(page);
                }
                viewer
            }
            Err(_) => Self::failed(title, renderer.state().clone(), config),
        }
    }

    pub fn from_loaded(title: String, document: LoadedDocument, config: &ViewerConfig) -> Self {
        let zoom = ZoomController::new(document.base_scale, config);
        Self {
            title,
            state: LoadState::Ready,
            document: Some(document),
            engine: SearchEngine::from_config(config),
            result: SearchResult::default(),
            navigator: MatchNavigator::new(),
            zoom,
            current_page: 1,
        }
    }

    pub fn failed(title: String, state: LoadState, config: &ViewerConfig) -> Self {
        Self {
            title,
            state,
            document: None,
            engine: SearchEngine::from_config(config),
            result: SearchResult::default(),
            navigator: MatchNavigator::new(),
            zoom: ZoomController::new(1.0, config),
            current_page: 1,
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn page_count(&self) -> u32 {
        self.document
            .as_ref()
            .map(LoadedDocument::page_count)
            .unwrap_or(0)
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn zoom(&self) -> &ZoomController {
        &self.zoom
    }

    pub fn result(&self) -> &SearchResult {
        &self.result
    }

    pub fn document(&self) -> Option<&LoadedDocument> {
        self.document.as_ref()
    }

    /// Drops surfaces and search state.
    pub fn close(&mut self) {
        if let Some(mut document) = self.document.take() {
            document.surfaces.clear();
        }
        self.result = SearchResult::default();
        self.navigator.reset(0);
        self.state = LoadState::Idle;
    }

    pub fn goto_page(&mut self, page: u32) -> bool {
        let count = self.page_count();
        if count == 0 {
            return false;
        }
        let next = page.clamp(1, count);
        if next == self.current_page {
            return false;
        }
        self.current_page = next;
        true
    }

    /// Shows `page` and moves the cursor to the first match on or after it.
    fn anchor_at_page(&mut self, page: u32) {
        let first_after = (0..self.result.total_matches())
            .find(|&index| self.result.page_of(index).is_some_and(|p| p >= page));
        match first_after {
            Some(index) if self.navigator.select(index) => self.restyle(),
            _ => {
                self.goto_page(page);
            }
        }
    }

    /// Fresh search: the cursor starts at the first match.
    pub fn run_search(&mut self, query: &str) -> MatchStatus {
        let Some(document) = self.document.as_mut() else {
            return MatchStatus::default();
        };
        self.result = self.engine.search(
            document.handle.as_ref(),
            &mut document.surfaces,
            query,
            self.zoom.base_scale(),
            None,
        );
        self.navigator.reset(self.result.total_matches());
        self.navigator
            .restyle(&mut self.result, &mut document.surfaces);
        self.follow_cursor();
        debug!(query, total = self.result.total_matches(), "search applied");
        self.navigator.status()
    }

    /// Re-runs the current query after a zoom change, keeping the cursor.
    fn recompute_highlights(&mut self) {
        let Some(document) = self.document.as_mut() else {
            return;
        };
        if self.result.query.trim().is_empty() {
            return;
        }
        let query = self.result.query.clone();
        self.result = self.engine.search(
            document.handle.as_ref(),
            &mut document.surfaces,
            &query,
            self.zoom.base_scale(),
            self.navigator.current(),
        );
        self.navigator.retain(self.result.total_matches());
        self.navigator
            .restyle(&mut self.result, &mut document.surfaces);
        info!(
            multiplier = self.zoom.multiplier(),
            total = self.result.total_matches(),
            "highlights recomputed after zoom"
        );
    }

    fn restyle(&mut self) {
        if let Some(document) = self.document.as_mut() {
            self.navigator
                .restyle(&mut self.result, &mut document.surfaces);
        }
        self.follow_cursor();
    }

    fn follow_cursor(&mut self) {
        if let Some(page) = self
            .navigator
            .current()
            .and_then(|index| self.result.page_of(index))
        {
            self.current_page = page;
        }
    }

    fn apply_zoom(&mut self, changed: bool) -> bool {
        if changed {
            if let Some(document) = self.document.as_mut() {
                document
                    .surfaces
                    .apply_display_multiplier(self.zoom.multiplier());
            }
        }
        changed
    }
}

impl DocumentView for PdfViewer {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn search(&mut self, query: &str) -> MatchStatus {
        self.run_search(query)
    }

    fn query(&self) -> &str {
        &self.result.query
    }

    fn next_match(&mut self) -> MatchStatus {
        if self.navigator.next().is_some() {
            self.restyle();
        }
        self.navigator.status()
    }

    fn prev_match(&mut self) -> MatchStatus {
        if self.navigator.prev().is_some() {
            self.restyle();
        }
        self.navigator.status()
    }

    fn match_status(&self) -> MatchStatus {
        self.navigator.status()
    }

    fn hits(&self) -> &[Hit] {
        &self.result.hits
    }

    fn handle(&mut self, action: ViewAction, now: Instant) -> bool {
        if self.document.is_none() {
            return false;
        }
        match action {
            ViewAction::NextPage { count } => {
                let target = self.current_page.saturating_add(count.max(1) as u32);
                self.goto_page(target)
            }
            ViewAction::PrevPage { count } => {
                let target = self.current_page.saturating_sub(count.max(1) as u32);
                self.goto_page(target.max(1))
            }
            ViewAction::GotoPage { page } => {
                self.goto_page(u32::try_from(page).unwrap_or(u32::MAX))
            }
            ViewAction::ZoomIn => {
                let changed = self.zoom.zoom_in(now);
                self.apply_zoom(changed)
            }
            ViewAction::ZoomOut => {
                let changed = self.zoom.zoom_out(now);
                self.apply_zoom(changed)
            }
            ViewAction::FitWidth => {
                let changed = self.zoom.fit(now);
                self.apply_zoom(changed)
            }
            ViewAction::SelectHit { index } => {
                if self.navigator.select(index) {
                    self.restyle();
                    true
                } else {
                    false
                }
            }
            ViewAction::LoadMoreRows | ViewAction::NextSheet | ViewAction::PrevSheet => false,
        }
    }

    fn tick(&mut self, now: Instant) -> bool {
        if !self.zoom.recompute_due(now) {
            return false;
        }
        self.recompute_highlights();
        true
    }

    fn frame(&self) -> ViewFrame<'_> {
        if let Some(message) = self.error() {
            return ViewFrame::Message {
                title: self.title.clone(),
                body: message,
            };
        }
        match self
            .document
            .as_ref()
            .and_then(|document| document.surfaces.get(self.current_page))
        {
            Some(surface) => ViewFrame::Page {
                surface,
                page_count: self.page_count(),
            },
            None => ViewFrame::Message {
                title: self.title.clone(),
                body: "Loading document…".to_string(),
            },
        }
    }

    fn location_label(&self) -> String {
        format!(
            "page {}/{} · {:.0}%",
            self.current_page,
            self.page_count(),
            self.zoom.multiplier() * 100.0
        )
    }

    fn error(&self) -> Option<String> {
        match &self.state {
            LoadState::Error(message) => Some(message.clone()),
            LoadState::Cancelled => Some("Loading was cancelled.".to_string()),
            _ => None,
        }
    }

    fn source_bytes(&self) -> Option<&Bytes> {
        self.document.as_ref().map(|document| &document.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::geometry::{PageSize, TextRun, Transform};
    use crate::testing::{FakeDocument, FakeEngine, FakePage, StaticSource};

    fn run(text: &str, x: f32, y: f32) -> TextRun {
        let width = text.chars().count() as f32 * 5.0;
        TextRun::new(text, Transform::new(10.0, 0.0, 0.0, 10.0, x, y), width, 10.0)
    }

    fn document() -> FakeDocument {
        FakeDocument::new(vec![
            FakePage::new(
                PageSize::new(600.0, 800.0),
                vec![run("Quarterly report", 50.0, 700.0)],
            ),
            FakePage::new(
                PageSize::new(600.0, 800.0),
                vec![run("report appendix and report summary", 50.0, 600.0)],
            ),
            FakePage::new(PageSize::new(600.0, 800.0), vec![run("contacts", 50.0, 500.0)]),
        ])
    }

    async fn open(source: DocumentSource) -> PdfViewer {
        let engine = FakeEngine {
            document: Some(document()),
        };
        PdfViewer::open(
            &StaticSource::ok(b"%PDF"),
            &engine,
            &source,
            &ViewerConfig::default(),
            &CancellationFlag::new(),
            |_| {},
        )
        .await
    }

    fn source() -> DocumentSource {
        DocumentSource::new("https://kb.example.com/files/report.pdf", None).unwrap()
    }

    #[tokio::test]
    async fn initial_page_anchors_the_cursor_after_load() {
        let viewer = open(
            source()
                .with_initial_page(Some(2))
                .with_initial_query(Some("report".into())),
        )
        .await;

        assert_eq!(viewer.state(), &LoadState::Ready);
        assert_eq!(viewer.match_status().total, 3);
        assert_eq!(viewer.match_status().current, Some(1));
        assert_eq!(viewer.current_page(), 2);
        assert_eq!(viewer.query(), "report");
    }

    #[tokio::test]
    async fn initial_page_without_later_matches_is_kept() {
        let viewer = open(
            source()
                .with_initial_page(Some(3))
                .with_initial_query(Some("report".into())),
        )
        .await;

        assert_eq!(viewer.match_status().total, 3);
        assert_eq!(viewer.current_page(), 3);
    }

    #[tokio::test]
    async fn huge_goto_page_clamps_to_the_last_page() {
        let mut viewer = open(source()).await;
        let page = u32::MAX as usize + 2;
        assert!(viewer.handle(ViewAction::GotoPage { page }, Instant::now()));
        assert_eq!(viewer.current_page(), 3);
    }

    #[tokio::test]
    async fn next_match_moves_to_the_page_of_the_match() {
        let mut viewer = open(source()).await;
        viewer.search("report");
        assert_eq!(viewer.current_page(), 1);

        let status = viewer.next_match();
        assert_eq!(status.current, Some(1));
        assert_eq!(viewer.current_page(), 2);

        let surface = viewer.document().unwrap().surfaces.get(2).unwrap();
        let current: Vec<_> = surface
            .overlay()
            .iter()
            .filter(|rect| rect.is_current)
            .map(|rect| rect.match_index)
            .collect();
        assert_eq!(current, vec![1]);
    }

    #[tokio::test]
    async fn clearing_the_query_resets_matches_and_overlays() {
        let mut viewer = open(source()).await;
        viewer.search("report");
        assert!(viewer.document().unwrap().surfaces.overlay_count() > 0);

        let status = viewer.search("");
        assert_eq!(status.total, 0);
        assert_eq!(status.current, None);
        assert_eq!(viewer.document().unwrap().surfaces.overlay_count(), 0);
    }

    #[tokio::test]
    async fn zoom_recompute_scales_highlights_and_keeps_cursor() {
        let mut viewer = open(source()).await;
        viewer.search("report");
        viewer.next_match();
        let before = viewer.result().highlights.clone();

        let start = Instant::now();
        assert!(viewer.handle(ViewAction::ZoomIn, start));
        assert!(viewer.handle(ViewAction::ZoomIn, start));
        assert!(!viewer.tick(start + Duration::from_millis(50)));
        assert!(viewer.tick(start + Duration::from_millis(200)));

        let ratio = viewer.zoom().multiplier();
        let after = &viewer.result().highlights;
        assert_eq!(after.len(), before.len());
        for (old, new) in before.iter().zip(after) {
            assert_eq!(old.match_index, new.match_index);
            assert!((new.x - old.x * ratio).abs() < 1e-3);
        }
        assert_eq!(viewer.match_status().current, Some(1));
    }

    #[tokio::test]
    async fn selecting_a_hit_moves_cursor_and_page() {
        let mut viewer = open(source()).await;
        viewer.search("report");
        assert!(viewer.handle(ViewAction::SelectHit { index: 2 }, Instant::now()));
        assert_eq!(viewer.match_status().current, Some(2));
        assert_eq!(viewer.current_page(), 2);
        assert!(!viewer.handle(ViewAction::SelectHit { index: 9 }, Instant::now()));
    }

    #[tokio::test]
    async fn page_navigation_is_clamped() {
        let mut viewer = open(source()).await;
        let now = Instant::now();
        assert!(viewer.handle(ViewAction::NextPage { count: 10 }, now));
        assert_eq!(viewer.current_page(), 3);
        assert!(!viewer.handle(ViewAction::NextPage { count: 1 }, now));
        assert!(viewer.handle(ViewAction::PrevPage { count: 5 }, now));
        assert_eq!(viewer.current_page(), 1);
        assert!(viewer.location_label().starts_with("page 1/3"));
    }

    #[tokio::test]
    async fn unauthorized_source_becomes_error_frame() {
        let engine = FakeEngine { document: None };
        let viewer = PdfViewer::open(
            &StaticSource::status(401),
            &engine,
            &source(),
            &ViewerConfig::default(),
            &CancellationFlag::new(),
            |_| {},
        )
        .await;

        assert!(viewer.source_bytes().is_none());
        let message = viewer.error().unwrap();
        assert!(message.contains("not signed in"));
        assert!(matches!(viewer.frame(), ViewFrame::Message { .. }));
    }

    #[tokio::test]
    async fn close_releases_surfaces() {
        let mut viewer = open(source()).await;
        viewer.search("report");
        viewer.close();
        assert_eq!(viewer.page_count(), 0);
        assert_eq!(viewer.match_status().total, 0);
        assert_eq!(viewer.state(), &LoadState::Idle);
    }
}
