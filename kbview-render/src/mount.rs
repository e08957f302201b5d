use kbview_core::{
    ByteSource, CancellationFlag, DocumentFormat, DocumentSource, DocumentView, FormatFamily,
    LoadProgress, LoadState, PdfEngine, PdfViewer, ViewError, ViewerConfig,
};
use tracing::{info, instrument, warn};

use crate::sheet::SheetView;
use crate::slides::SlidesView;
use crate::text::TextView;
use crate::word::WordView;

/// Renderer selected once from the format tag at mount time.
pub enum MountedDocument {
    Pdf(PdfViewer),
    Word(WordView),
    Sheet(SheetView),
    Slides(SlidesView),
    Text(TextView),
}

impl MountedDocument {
    pub fn family(&self) -> FormatFamily {
        match self {
            MountedDocument::Pdf(_) => FormatFamily::Pdf,
            MountedDocument::Word(_) => FormatFamily::WordProcessor,
            MountedDocument::Sheet(_) => FormatFamily::Spreadsheet,
            MountedDocument::Slides(_) => FormatFamily::Presentation,
            MountedDocument::Text(_) => FormatFamily::PlainText,
        }
    }

    pub fn as_view(&self) -> &dyn DocumentView {
        match self {
            MountedDocument::Pdf(view) => view,
            MountedDocument::Word(view) => view,
            MountedDocument::Sheet(view) => view,
            MountedDocument::Slides(view) => view,
            MountedDocument::Text(view) => view,
        }
    }

    pub fn into_view(self) -> Box<dyn DocumentView> {
        match self {
            MountedDocument::Pdf(view) => Box::new(view),
            MountedDocument::Word(view) => Box::new(view),
            MountedDocument::Sheet(view) => Box::new(view),
            MountedDocument::Slides(view) => Box::new(view),
            MountedDocument::Text(view) => Box::new(view),
        }
    }

    fn search(&mut self, query: &str) {
        match self {
            MountedDocument::Pdf(view) => view.search(query),
            MountedDocument::Word(view) => view.search(query),
            MountedDocument::Sheet(view) => view.search(query),
            MountedDocument::Slides(view) => view.search(query),
            MountedDocument::Text(view) => view.search(query),
        };
    }
}

/// Fetches and mounts `source`. Never fails: every failure is held as the
/// returned view's own error state.
///
/// `engine` may be `None` when pdfium is unavailable; PDF sources then mount
/// in an error state while other formats are unaffected.
#[instrument(skip_all, fields(location = %source.location, format = %source.format))]
pub async fn mount<F>(
    fetcher: &dyn ByteSource,
    engine: Option<&dyn PdfEngine>,
    source: &DocumentSource,
    config: &ViewerConfig,
    cancel: &CancellationFlag,
    on_progress: F,
) -> MountedDocument
where
    F: FnMut(LoadProgress),
{
    let title = source.file_name();
    let format = source.format;
    let family = format.family();

    if family == FormatFamily::Pdf {
        let viewer = match engine {
            Some(engine) => {
                PdfViewer::open(fetcher, engine, source, config, cancel, on_progress).await
            }
            None => PdfViewer::failed(
                title,
                LoadState::Error("PDF rendering is unavailable: pdfium library not found".into()),
                config,
            ),
        };
        return MountedDocument::Pdf(viewer);
    }

    let mut mounted = match fetcher.fetch(&source.location).await {
        Ok(bytes) => {
            info!(len = bytes.len(), "document fetched");
            match family {
                FormatFamily::WordProcessor => {
                    MountedDocument::Word(WordView::from_bytes(title, format, bytes))
                }
                FormatFamily::Spreadsheet => MountedDocument::Sheet(SheetView::from_bytes(
                    title,
                    format,
                    bytes,
                    config.spreadsheet_page_size(),
                )),
                FormatFamily::Presentation => {
                    MountedDocument::Slides(SlidesView::new(title, format, bytes))
                }
                FormatFamily::PlainText | FormatFamily::Pdf => {
                    MountedDocument::Text(TextView::from_bytes(title, bytes))
                }
            }
        }
        Err(err) => {
            warn!(%err, "document fetch failed");
            failed(title, format, ViewError::Fetch(err.to_string()), config)
        }
    };

    if let Some(query) = &source.initial_query {
        mounted.search(query);
    }
    mounted
}

fn failed(
    title: String,
    format: DocumentFormat,
    error: ViewError,
    config: &ViewerConfig,
) -> MountedDocument {
    match format.family() {
        FormatFamily::WordProcessor => MountedDocument::Word(WordView::failed(title, format, error)),
        FormatFamily::Spreadsheet => MountedDocument::Sheet(SheetView::failed(
            title,
            format,
            error,
            config.spreadsheet_page_size(),
        )),
        FormatFamily::Presentation => {
            MountedDocument::Slides(SlidesView::failed(title, format, error))
        }
        FormatFamily::PlainText | FormatFamily::Pdf => {
            MountedDocument::Text(TextView::failed(title, error))
        }
    }
}
