use std::convert::TryFrom;
use std::mem;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use kbview_core::{
    PageSize, PdfDocumentHandle, PdfEngine, RenderImage, TextRun, Transform, Viewport,
};
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

const LIBRARY_PATH_ENV: &str = "KBVIEW_PDFIUM_LIBRARY_PATH";

/// Parser and rasterizer backed by a dynamically bound pdfium library.
pub struct PdfiumEngine {
    pdfium: Arc<Pdfium>,
}

impl PdfiumEngine {
    /// Binds pdfium from `library`, then `$KBVIEW_PDFIUM_LIBRARY_PATH`, then
    /// the working directory, then the system library path.
    pub fn new(library: Option<&Path>) -> Result<Self> {
        let pdfium = match bind_pdfium_from_hint(library) {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

impl PdfEngine for PdfiumEngine {
    #[instrument(skip_all, fields(len = bytes.len()))]
    fn parse(&self, bytes: Bytes) -> Result<Box<dyn PdfDocumentHandle>> {
        let document = self
            .pdfium
            .load_pdf_from_byte_vec(bytes.to_vec(), None)
            .context("failed to parse PDF document")?;
        // SAFETY: the document borrows the bindings owned by `self.pdfium`. The
        // Arc is cloned into `PdfiumDocument`, whose `document` field is declared
        // before `pdfium` and therefore dropped first, so the borrow never
        // outlives the bindings.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        debug!(pages = document.pages().len(), "pdf parsed");
        Ok(Box::new(PdfiumDocument {
            document,
            pdfium: Arc::clone(&self.pdfium),
        }))
    }
}

struct PdfiumDocument {
    document: PdfDocument<'static>,
    #[allow(dead_code)]
    pdfium: Arc<Pdfium>,
}

impl PdfiumDocument {
    fn page(&self, page_number: u32) -> Result<PdfPage<'_>> {
        let index = page_number
            .checked_sub(1)
            .and_then(|index| PdfPageIndex::try_from(index).ok())
            .ok_or_else(|| anyhow!("page {page_number} is out of supported range"))?;
        self.document
            .pages()
            .get(index)
            .with_context(|| format!("page {page_number} out of range"))
    }
}

impl PdfDocumentHandle for PdfiumDocument {
    fn page_count(&self) -> u32 {
        u32::from(self.document.pages().len())
    }

    fn page_size(&self, page_number: u32) -> Result<PageSize> {
        let page = self.page(page_number)?;
        Ok(PageSize::new(page.width().value, page.height().value))
    }

    // pdfium reports segment bounds rather than per-glyph matrices, so each
    // segment becomes an unrotated run whose font size is its box height.
    fn text_runs(&self, page_number: u32) -> Result<Vec<TextRun>> {
        let page = self.page(page_number)?;
        let text = page
            .text()
            .with_context(|| format!("failed to extract text for page {page_number}"))?;

        let mut runs = Vec::new();
        for segment in text.segments().iter() {
            let content = segment.text();
            if content.trim().is_empty() {
                continue;
            }
            let bounds = segment.bounds();
            let left = bounds.left().value;
            let bottom = bounds.bottom().value;
            let width = (bounds.right().value - left).max(0.0);
            let height = (bounds.top().value - bottom).max(0.0);
            if height <= 0.0 {
                warn!(page_number, "skipping text segment with empty bounds");
                continue;
            }
            runs.push(TextRun::new(
                content,
                Transform::new(height, 0.0, 0.0, height, left, bottom),
                width,
                height,
            ));
        }
        Ok(runs)
    }

    #[instrument(skip(self, viewport), fields(scale = viewport.scale))]
    fn rasterize(&self, page_number: u32, viewport: &Viewport) -> Result<RenderImage> {
        let page = self.page(page_number)?;
        let config = PdfRenderConfig::new().scale_page_by_factor(viewport.scale.max(0.1));
        let bitmap = page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {page_number}"))?;
        let pixels = bitmap.as_image().to_rgba8().into_raw();

        Ok(RenderImage {
            width: u32::try_from(bitmap.width()).unwrap_or_default(),
            height: u32::try_from(bitmap.height()).unwrap_or_default(),
            pixels,
        })
    }
}

fn bind_pdfium_from_hint(library: Option<&Path>) -> Option<Pdfium> {
    let from_env = std::env::var_os(LIBRARY_PATH_ENV).filter(|path| !path.is_empty());
    let path = match (library, from_env.as_deref()) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(path)) => Path::new(path).to_path_buf(),
        (None, None) => return None,
    };
    match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!(
                "failed to load Pdfium from configured path {}: {}",
                path.display(),
                err
            );
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set pdfium_library or {} ({})",
                LIBRARY_PATH_ENV,
                errors.join(", ")
            ))
        }
    }
}
