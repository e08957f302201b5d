//! Composites a page raster with its highlight overlay at displayed size.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use kbview_core::{OverlayRect, PageSurface, RenderImage};
use tracing::debug;

const MATCH_COLOR: [u8; 3] = [255, 200, 0];
const MATCH_ALPHA: f32 = 0.3;
const CURRENT_COLOR: [u8; 3] = [255, 120, 0];
const CURRENT_ALPHA: f32 = 0.5;

/// Returns the surface raster scaled to its displayed size with every
/// overlay rectangle blended on top. The current match is drawn last, in a
/// stronger color.
pub fn compose_page(surface: &PageSurface) -> RenderImage {
    let mut image = scale_to_display(surface);
    let (others, current): (Vec<&OverlayRect>, Vec<&OverlayRect>) =
        surface.overlay().iter().partition(|rect| !rect.is_current);
    for rect in others {
        fill_rect(&mut image, rect, MATCH_COLOR, MATCH_ALPHA);
    }
    for rect in current {
        fill_rect(&mut image, rect, CURRENT_COLOR, CURRENT_ALPHA);
    }
    image
}

fn scale_to_display(surface: &PageSurface) -> RenderImage {
    let raster = surface.raster();
    let (width, height) = surface.displayed_size();
    let target_width = width.round().max(1.0) as u32;
    let target_height = height.round().max(1.0) as u32;
    if raster.width == 0
        || raster.height == 0
        || (target_width == raster.width && target_height == raster.height)
    {
        return raster.clone();
    }
    let Some(buffer) = RgbaImage::from_raw(raster.width, raster.height, raster.pixels.clone())
    else {
        debug!(
            page = surface.page_number(),
            "raster buffer does not match its dimensions"
        );
        return raster.clone();
    };
    let resized = imageops::resize(&buffer, target_width, target_height, FilterType::Triangle);
    RenderImage {
        width: resized.width(),
        height: resized.height(),
        pixels: resized.into_raw(),
    }
}

fn fill_rect(image: &mut RenderImage, overlay: &OverlayRect, color: [u8; 3], alpha: f32) {
    if image.width == 0 || image.height == 0 {
        return;
    }
    let rect = overlay.rect;
    let x0 = rect.x.floor().clamp(0.0, image.width as f32) as u32;
    let y0 = rect.y.floor().clamp(0.0, image.height as f32) as u32;
    let x1 = (rect.x + rect.width).ceil().clamp(0.0, image.width as f32) as u32;
    let y1 = (rect.y + rect.height).ceil().clamp(0.0, image.height as f32) as u32;
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let width = image.width as usize;
    for y in y0..y1 {
        let row_start = y as usize * width * 4;
        for x in x0..x1 {
            let idx = row_start + x as usize * 4;
            blend_pixel(&mut image.pixels[idx..idx + 4], color, alpha);
        }
    }
}

fn blend_pixel(pixel: &mut [u8], color: [u8; 3], alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    let inv = 1.0 - alpha;
    for (channel, tint) in pixel.iter_mut().zip(color) {
        *channel = (*channel as f32 * inv + tint as f32 * alpha)
            .round()
            .clamp(0.0, 255.0) as u8;
    }
}

/// Offset of a `viewport`-sized window inside `total`, placed at `fraction`
/// of the free space.
pub fn compute_viewport_origin(total: u32, viewport: u32, fraction: f32) -> u32 {
    if viewport >= total || total == 0 {
        return 0;
    }
    let max_offset = total - viewport;
    let clamped = fraction.clamp(0.0, 1.0);
    let raw = (max_offset as f32 * clamped).round();
    raw.max(0.0).min(max_offset as f32) as u32
}

pub fn crop_render_image(
    image: &RenderImage,
    origin_x: u32,
    origin_y: u32,
    width: u32,
    height: u32,
) -> RenderImage {
    if image.width == 0 || image.height == 0 {
        return RenderImage {
            width: 0,
            height: 0,
            pixels: Vec::new(),
        };
    }

    let width = width.min(image.width).max(1);
    let height = height.min(image.height).max(1);
    let origin_x = origin_x.min(image.width - width);
    let origin_y = origin_y.min(image.height - height);

    let stride = image.width as usize * 4;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for row in 0..height {
        let start = (origin_y + row) as usize * stride + origin_x as usize * 4;
        let end = start + width as usize * 4;
        pixels.extend_from_slice(&image.pixels[start..end]);
    }

    RenderImage {
        width,
        height,
        pixels,
    }
}
