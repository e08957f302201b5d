use std::collections::BTreeMap;

use crate::geometry::{PageSize, PixelRect, Viewport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// One highlight rectangle on a page overlay, tagged with its global match index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayRect {
    pub rect: PixelRect,
    pub match_index: usize,
    pub is_current: bool,
    pub rotated: bool,
}

/// Raster surface of one page plus its highlight overlay.
///
/// Raster and overlay share a single displayed size, so they can never drift
/// apart when a visual zoom is applied.
#[derive(Debug, Clone)]
pub struct PageSurface {
    page_number: u32,
    page_size: PageSize,
    viewport: Viewport,
    raster: RenderImage,
    displayed_width: f32,
    displayed_height: f32,
    overlay: Vec<OverlayRect>,
}

impl PageSurface {
    pub fn new(page_number: u32, page_size: PageSize, viewport: Viewport, raster: RenderImage) -> Self {
        let displayed_width = raster.width as f32;
        let displayed_height = raster.height as f32;
        Self {
            page_number,
            page_size,
            viewport,
            raster,
            displayed_width,
            displayed_height,
            overlay: Vec::new(),
        }
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn raster(&self) -> &RenderImage {
        &self.raster
    }

    pub fn displayed_size(&self) -> (f32, f32) {
        (self.displayed_width, self.displayed_height)
    }

    /// Displayed width over intrinsic raster width.
    pub fn display_ratio(&self) -> f32 {
        if self.raster.width == 0 {
            1.0
        } else {
            self.displayed_width / self.raster.width as f32
        }
    }

    pub fn set_display_multiplier(&mut self, multiplier: f32) {
        self.displayed_width = self.raster.width as f32 * multiplier;
        self.displayed_height = self.raster.height as f32 * multiplier;
    }

    pub fn overlay(&self) -> &[OverlayRect] {
        &self.overlay
    }

    pub fn replace_overlay(&mut self, rects: Vec<OverlayRect>) {
        self.overlay = rects;
    }

    pub fn clear_overlay(&mut self) {
        self.overlay.clear();
    }

    /// Updates `is_current` from the match-index tags without touching geometry.
    pub fn restyle(&mut self, current: Option<usize>) {
        for rect in &mut self.overlay {
            rect.is_current = Some(rect.match_index) == current;
        }
    }

    fn replace_raster(&mut self, page_size: PageSize, viewport: Viewport, raster: RenderImage) {
        let multiplier = self.display_ratio();
        self.page_size = page_size;
        self.viewport = viewport;
        self.raster = raster;
        self.overlay.clear();
        self.set_display_multiplier(multiplier);
    }
}

/// Page number to surface map owned by a loaded document.
#[derive(Debug, Clone, Default)]
pub struct PageSurfaces {
    pages: BTreeMap<u32, PageSurface>,
}

impl PageSurfaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the raster for a page, reusing the existing surface if there is one.
    pub fn upsert(&mut self, page_number: u32, page_size: PageSize, viewport: Viewport, raster: RenderImage) {
        match self.pages.get_mut(&page_number) {
            Some(surface) => surface.replace_raster(page_size, viewport, raster),
            None => {
                self.pages.insert(
                    page_number,
                    PageSurface::new(page_number, page_size, viewport, raster),
                );
            }
        }
    }

    pub fn get(&self, page_number: u32) -> Option<&PageSurface> {
        self.pages.get(&page_number)
    }

    pub fn get_mut(&mut self, page_number: u32) -> Option<&mut PageSurface> {
        self.pages.get_mut(&page_number)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageSurface> {
        self.pages.values()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Drops every surface, releasing raster memory.
    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn clear_overlays(&mut self) {
        for surface in self.pages.values_mut() {
            surface.clear_overlay();
        }
    }

    pub fn apply_display_multiplier(&mut self, multiplier: f32) {
        for surface in self.pages.values_mut() {
            surface.set_display_multiplier(multiplier);
        }
    }

    pub fn restyle(&mut self, current: Option<usize>) {
        for surface in self.pages.values_mut() {
            surface.restyle(current);
        }
    }

    pub fn overlay_count(&self) -> usize {
        self.pages.values().map(|surface| surface.overlay.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(width: u32, height: u32) -> RenderImage {
        RenderImage {
            width,
            height,
            pixels: vec![255; (width * height * 4) as usize],
        }
    }

    fn overlay_rect(match_index: usize) -> OverlayRect {
        OverlayRect {
            rect: PixelRect::new(1.0, 1.0, 4.0, 2.0),
            match_index,
            is_current: false,
            rotated: false,
        }
    }

    #[test]
    fn display_multiplier_moves_raster_and_overlay_together() {
        let size = PageSize::new(100.0, 200.0);
        let mut surface = PageSurface::new(1, size, Viewport::for_page(size, 1.0), raster(100, 200));
        surface.set_display_multiplier(1.5);
        assert_eq!(surface.displayed_size(), (150.0, 300.0));
        assert!((surface.display_ratio() - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn restyle_only_flips_current_flag() {
        let size = PageSize::new(10.0, 10.0);
        let mut surface = PageSurface::new(1, size, Viewport::for_page(size, 1.0), raster(10, 10));
        surface.replace_overlay(vec![overlay_rect(3), overlay_rect(4)]);
        surface.restyle(Some(4));
        assert!(!surface.overlay()[0].is_current);
        assert!(surface.overlay()[1].is_current);
        assert_eq!(surface.overlay()[1].rect, overlay_rect(4).rect);
    }

    #[test]
    fn upsert_reuses_surface_and_keeps_zoom() {
        let size = PageSize::new(10.0, 10.0);
        let mut surfaces = PageSurfaces::new();
        surfaces.upsert(1, size, Viewport::for_page(size, 1.0), raster(10, 10));
        surfaces.apply_display_multiplier(2.0);
        surfaces.upsert(1, size, Viewport::for_page(size, 2.0), raster(20, 20));

        assert_eq!(surfaces.len(), 1);
        let surface = surfaces.get(1).unwrap();
        assert_eq!(surface.raster().width, 20);
        assert_eq!(surface.displayed_size(), (40.0, 40.0));
    }
}
