use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::ViewerConfig;
use crate::document::{PdfDocumentHandle, PdfEngine};
use crate::geometry::Viewport;
use crate::source::{ByteSource, DocumentSource, FetchError};
use crate::surface::PageSurfaces;
use crate::zoom::fit_scale;

/// `Idle → Loading → Rendering(page) → {Ready | Error | Cancelled}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Rendering { page: u32, total: u32 },
    Ready,
    Error(String),
    Cancelled,
}

impl LoadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoadState::Ready | LoadState::Error(_) | LoadState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadProgress {
    pub current: u32,
    pub total: u32,
}

/// Cooperative cancellation, checked at every page boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to parse document: {0}")]
    Parse(String),
    #[error("document has no pages")]
    Empty,
    #[error("failed to render page {page}: {message}")]
    Render { page: u32, message: String },
    #[error("loading was cancelled")]
    Cancelled,
}

/// A fully rasterized document: the handle plus one surface per page.
pub struct LoadedDocument {
    pub handle: Box<dyn PdfDocumentHandle>,
    pub surfaces: PageSurfaces,
    pub base_scale: f32,
    pub bytes: Bytes,
}

impl LoadedDocument {
    pub fn page_count(&self) -> u32 {
        self.handle.page_count()
    }
}

/// Fetches, parses and rasterizes a document page by page, in order.
pub struct PageRenderer {
    container_width: f32,
    min_fit_scale: f32,
    max_fit_scale: f32,
    state: LoadState,
    progress: LoadProgress,
}

impl PageRenderer {
    pub fn new(container_width: f32, config: &ViewerConfig) -> Self {
        Self {
            container_width,
            min_fit_scale: config.min_fit_scale,
            max_fit_scale: config.max_fit_scale,
            state: LoadState::Idle,
            progress: LoadProgress::default(),
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn progress(&self) -> LoadProgress {
        self.progress
    }

    #[instrument(skip_all, fields(location = %source.location))]
    pub async fn load<S, E, F>(
        &mut self,
        fetcher: &S,
        engine: &E,
        source: &DocumentSource,
        cancel: &CancellationFlag,
        mut on_progress: F,
    ) -> Result<LoadedDocument, LoadError>
    where
        S: ByteSource + ?Sized,
        E: PdfEngine + ?Sized,
        F: FnMut(LoadProgress),
    {
        self.state = LoadState::Loading;
        self.progress = LoadProgress::default();
        on_progress(self.progress);

        let bytes = match fetcher.fetch(&source.location).await {
            Ok(bytes) => bytes,
            Err(err) => return Err(self.fail(err.into())),
        };
        if cancel.is_cancelled() {
            return Err(self.cancelled(None));
        }

        let handle = match engine.parse(bytes.clone()) {
            Ok(handle) => handle,
            Err(err) => return Err(self.fail(LoadError::Parse(format!("{err:#}")))),
        };
        let total = handle.page_count();
        if total == 0 {
            return Err(self.fail(LoadError::Empty));
        }

        let first = match handle.page_size(1) {
            Ok(size) => size,
            Err(err) => {
                return Err(self.fail(LoadError::Render {
                    page: 1,
                    message: format!("{err:#}"),
                }))
            }
        };
        let base_scale = fit_scale(
            self.container_width,
            first.width,
            self.min_fit_scale,
            self.max_fit_scale,
        );
        debug!(total, base_scale, "document parsed");

        self.progress = LoadProgress { current: 0, total };
        on_progress(self.progress);

        let mut surfaces = PageSurfaces::new();
        for page in 1..=total {
            if cancel.is_cancelled() {
                return Err(self.cancelled(Some(&mut surfaces)));
            }
            self.state = LoadState::Rendering { page, total };

            let rendered = handle.page_size(page).and_then(|size| {
                let viewport = Viewport::for_page(size, base_scale);
                handle
                    .rasterize(page, &viewport)
                    .map(|raster| (size, viewport, raster))
            });
            match rendered {
                Ok((size, viewport, raster)) => surfaces.upsert(page, size, viewport, raster),
                Err(err) => {
                    surfaces.clear();
                    return Err(self.fail(LoadError::Render {
                        page,
                        message: format!("{err:#}"),
                    }));
                }
            }

            self.progress = LoadProgress {
                current: page,
                total,
            };
            on_progress(self.progress);
            tokio::task::yield_now().await;
        }

        self.state = LoadState::Ready;
        info!(pages = total, "document ready");
        Ok(LoadedDocument {
            handle,
            surfaces,
            base_scale,
            bytes,
        })
    }

    fn fail(&mut self, err: LoadError) -> LoadError {
        warn!(error = %err, "document load failed");
        self.state = LoadState::Error(err.to_string());
        err
    }

    fn cancelled(&mut self, surfaces: Option<&mut PageSurfaces>) -> LoadError {
        if let Some(surfaces) = surfaces {
            surfaces.clear();
        }
        info!(progress = ?self.progress, "document load cancelled");
        self.state = LoadState::Cancelled;
        LoadError::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PageSize, TextRun, Transform};
    use crate::testing::{FakeDocument, FakeEngine, FakePage, StaticSource};

    fn pages(count: usize) -> Vec<FakePage> {
        (0..count)
            .map(|idx| {
                FakePage::new(
                    PageSize::new(600.0, 800.0),
                    vec![TextRun::new(
                        format!("page {}", idx + 1),
                        Transform::new(10.0, 0.0, 0.0, 10.0, 50.0, 700.0),
                        30.0,
                        10.0,
                    )],
                )
            })
            .collect()
    }

    fn source() -> DocumentSource {
        DocumentSource::new("https://kb.example.com/files/manual.pdf", None).unwrap()
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_ends_at_page_count() {
        let document = FakeDocument::new(pages(4));
        let engine = FakeEngine {
            document: Some(document.clone()),
        };
        let config = ViewerConfig::default();
        let mut renderer = PageRenderer::new(900.0, &config);
        let mut seen = Vec::new();

        let loaded = renderer
            .load(
                &StaticSource::ok(b"%PDF"),
                &engine,
                &source(),
                &CancellationFlag::new(),
                |progress| seen.push(progress),
            )
            .await
            .unwrap();

        assert_eq!(seen.first(), Some(&LoadProgress { current: 0, total: 0 }));
        assert_eq!(seen.last(), Some(&LoadProgress { current: 4, total: 4 }));
        assert!(seen.windows(2).all(|w| w[0].current <= w[1].current));
        assert_eq!(renderer.state(), &LoadState::Ready);
        assert_eq!(loaded.surfaces.len(), 4);
        assert!((loaded.base_scale - 1.5).abs() < 1e-6);
        assert_eq!(document.rasterized.get(), 4);
    }

    #[tokio::test]
    async fn cancellation_stops_further_raster_writes() {
        let document = FakeDocument::new(pages(6));
        let engine = FakeEngine {
            document: Some(document.clone()),
        };
        let config = ViewerConfig::default();
        let mut renderer = PageRenderer::new(600.0, &config);
        let cancel = CancellationFlag::new();
        let trigger = cancel.clone();

        let result = renderer
            .load(
                &StaticSource::ok(b"%PDF"),
                &engine,
                &source(),
                &cancel,
                move |progress| {
                    if progress.current == 2 {
                        trigger.cancel();
                    }
                },
            )
            .await;

        assert!(matches!(result, Err(LoadError::Cancelled)));
        assert_eq!(renderer.state(), &LoadState::Cancelled);
        assert_eq!(document.rasterized.get(), 2);
        assert_eq!(renderer.progress(), LoadProgress { current: 2, total: 6 });
    }

    #[tokio::test]
    async fn render_failure_is_terminal() {
        let document = FakeDocument::new(pages(5)).failing_raster_on(3);
        let engine = FakeEngine {
            document: Some(document.clone()),
        };
        let config = ViewerConfig::default();
        let mut renderer = PageRenderer::new(600.0, &config);

        let result = renderer
            .load(
                &StaticSource::ok(b"%PDF"),
                &engine,
                &source(),
                &CancellationFlag::new(),
                |_| {},
            )
            .await;

        assert!(matches!(result, Err(LoadError::Render { page: 3, .. })));
        assert!(matches!(renderer.state(), LoadState::Error(_)));
        assert_eq!(document.rasterized.get(), 2);
    }

    #[tokio::test]
    async fn unauthorized_fetch_surfaces_one_message() {
        let engine = FakeEngine { document: None };
        let config = ViewerConfig::default();
        let mut renderer = PageRenderer::new(600.0, &config);

        let result = renderer
            .load(
                &StaticSource::status(401),
                &engine,
                &source(),
                &CancellationFlag::new(),
                |_| {},
            )
            .await;

        assert!(matches!(
            result,
            Err(LoadError::Fetch(FetchError::Unauthorized { .. }))
        ));
        match renderer.state() {
            LoadState::Error(message) => assert!(message.contains("HTTP 401")),
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[tokio::test]
    async fn parse_failure_sets_error_state() {
        let engine = FakeEngine { document: None };
        let config = ViewerConfig::default();
        let mut renderer = PageRenderer::new(600.0, &config);

        let result = renderer
            .load(
                &StaticSource::ok(b"garbage"),
                &engine,
                &source(),
                &CancellationFlag::new(),
                |_| {},
            )
            .await;

        assert!(matches!(result, Err(LoadError::Parse(_))));
        assert!(renderer.state().is_terminal());
    }
}
