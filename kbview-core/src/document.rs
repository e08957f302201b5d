use anyhow::Result;
use bytes::Bytes;

use crate::geometry::{PageSize, TextRun, Viewport};
use crate::surface::RenderImage;

/// Parsed document supplied by an external PDF library. Page numbers are 1-based.
pub trait PdfDocumentHandle {
    fn page_count(&self) -> u32;
    fn page_size(&self, page_number: u32) -> Result<PageSize>;
    /// Text runs in parser order; recomputed on every call.
    fn text_runs(&self, page_number: u32) -> Result<Vec<TextRun>>;
    fn rasterize(&self, page_number: u32, viewport: &Viewport) -> Result<RenderImage>;
}

pub trait PdfEngine {
    fn parse(&self, bytes: Bytes) -> Result<Box<dyn PdfDocumentHandle>>;
}
