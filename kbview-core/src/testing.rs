use std::cell::Cell;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;

use crate::document::{PdfDocumentHandle, PdfEngine};
use crate::geometry::{PageSize, TextRun, Viewport};
use crate::source::{ByteSource, FetchError, SourceLocation};
use crate::surface::RenderImage;

#[derive(Clone)]
pub struct FakePage {
    pub size: PageSize,
    pub runs: Vec<TextRun>,
}

impl FakePage {
    pub fn new(size: PageSize, runs: Vec<TextRun>) -> Self {
        Self { size, runs }
    }
}

#[derive(Clone)]
pub struct FakeDocument {
    pages: Vec<FakePage>,
    fail_text_on: Option<u32>,
    fail_raster_on: Option<u32>,
    pub rasterized: Rc<Cell<u32>>,
}

impl FakeDocument {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            pages,
            fail_text_on: None,
            fail_raster_on: None,
            rasterized: Rc::new(Cell::new(0)),
        }
    }

    pub fn failing_text_on(mut self, page_number: u32) -> Self {
        self.fail_text_on = Some(page_number);
        self
    }

    pub fn failing_raster_on(mut self, page_number: u32) -> Self {
        self.fail_raster_on = Some(page_number);
        self
    }

    fn page(&self, page_number: u32) -> Result<&FakePage> {
        page_number
            .checked_sub(1)
            .and_then(|idx| self.pages.get(idx as usize))
            .ok_or_else(|| anyhow!("page {page_number} out of range"))
    }
}

impl PdfDocumentHandle for FakeDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_size(&self, page_number: u32) -> Result<PageSize> {
        Ok(self.page(page_number)?.size)
    }

    fn text_runs(&self, page_number: u32) -> Result<Vec<TextRun>> {
        if self.fail_text_on == Some(page_number) {
            return Err(anyhow!("text layer of page {page_number} is corrupt"));
        }
        Ok(self.page(page_number)?.runs.clone())
    }

    fn rasterize(&self, page_number: u32, viewport: &Viewport) -> Result<RenderImage> {
        self.page(page_number)?;
        if self.fail_raster_on == Some(page_number) {
            return Err(anyhow!("rasterizer crashed on page {page_number}"));
        }
        self.rasterized.set(self.rasterized.get() + 1);
        let width = viewport.width.round().max(1.0) as u32;
        let height = viewport.height.round().max(1.0) as u32;
        Ok(RenderImage {
            width,
            height,
            pixels: vec![255; (width * height * 4) as usize],
        })
    }
}

pub struct FakeEngine {
    pub document: Option<FakeDocument>,
}

impl PdfEngine for FakeEngine {
    fn parse(&self, _bytes: Bytes) -> Result<Box<dyn PdfDocumentHandle>> {
        match &self.document {
            Some(document) => Ok(Box::new(document.clone())),
            None => Err(anyhow!("not a PDF file")),
        }
    }
}

pub struct StaticSource {
    pub result: std::result::Result<Bytes, u16>,
}

impl StaticSource {
    pub fn ok(bytes: &'static [u8]) -> Self {
        Self {
            result: Ok(Bytes::from_static(bytes)),
        }
    }

    pub fn status(status: u16) -> Self {
        Self { result: Err(status) }
    }
}

#[async_trait]
impl ByteSource for StaticSource {
    async fn fetch(&self, location: &SourceLocation) -> std::result::Result<Bytes, FetchError> {
        match &self.result {
            Ok(bytes) => Ok(bytes.clone()),
            Err(status) => Err(FetchError::from_status(location.to_string(), *status)),
        }
    }
}
