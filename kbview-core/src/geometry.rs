//! Maps text occurrences inside parsed text runs onto pixel rectangles.
//!
//! Character positions inside a run are estimated by dividing the run width
//! evenly across its characters. Proportional fonts, ligatures and
//! right-to-left runs are therefore approximate; runs with shear or rotation
//! are mapped axis-aligned and flagged as `rotated`.

const EPSILON: f32 = 1e-4;

/// Six-value affine transform `[a, b, c, d, e, f]` placing a text run in
/// page space (PDF user units, origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Transform {
    pub const fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub const fn from_array(values: [f32; 6]) -> Self {
        Self::new(
            values[0], values[1], values[2], values[3], values[4], values[5],
        )
    }

    /// True when the run reads left-to-right without shear or rotation.
    pub fn is_axis_aligned(&self) -> bool {
        self.b.abs() <= EPSILON && self.c.abs() <= EPSILON && self.a >= 0.0
    }
}

/// One run of the parsed text layer of a page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub transform: Transform,
    pub width: f32,
    pub height: f32,
}

impl TextRun {
    pub fn new(text: impl Into<String>, transform: Transform, width: f32, height: f32) -> Self {
        Self {
            text: text.into(),
            transform,
            width,
            height,
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Unscaled page size in PDF units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Pixel-space rectangle a page is rasterized into at a given scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl Viewport {
    pub fn for_page(size: PageSize, scale: f32) -> Self {
        Self {
            width: size.width * scale,
            height: size.height * scale,
            scale,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn contains(&self, other: &PixelRect) -> bool {
        other.x >= self.x - EPSILON
            && other.y >= self.y - EPSILON
            && other.right() <= self.right() + EPSILON
            && other.bottom() <= self.bottom() + EPSILON
    }

    pub fn scaled(&self, ratio: f32) -> PixelRect {
        PixelRect::new(
            self.x * ratio,
            self.y * ratio,
            self.width * ratio,
            self.height * ratio,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappedRect {
    pub rect: PixelRect,
    pub rotated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    /// Smallest highlight width in viewport pixels.
    pub min_width: f32,
    /// Extra width added to every highlight in viewport pixels.
    pub padding: f32,
}

impl Default for CoordinateMapper {
    fn default() -> Self {
        Self {
            min_width: 2.0,
            padding: 1.0,
        }
    }
}

impl CoordinateMapper {
    pub fn new(min_width: f32, padding: f32) -> Self {
        Self {
            min_width: min_width.max(0.0),
            padding: padding.max(0.0),
        }
    }

    /// Maps `len` characters starting at character `offset` of `run` into
    /// displayed pixels. `display_ratio` is displayed width over intrinsic
    /// raster width, which absorbs zoom applied without re-rasterizing.
    pub fn map(
        &self,
        run: &TextRun,
        offset: usize,
        len: usize,
        viewport: &Viewport,
        display_ratio: f32,
    ) -> MappedRect {
        let rect = self.map_unpadded(run, offset, len, viewport);
        let rect = PixelRect {
            width: (rect.width + self.padding).max(self.min_width),
            ..rect
        };
        MappedRect {
            rect: rect.scaled(sanitize_ratio(display_ratio)),
            rotated: !run.transform.is_axis_aligned(),
        }
    }

    /// Bounding box of the whole run in viewport pixels.
    pub fn run_bounds(&self, run: &TextRun, viewport: &Viewport) -> PixelRect {
        self.map_unpadded(run, 0, run.char_len(), viewport)
    }

    fn map_unpadded(
        &self,
        run: &TextRun,
        offset: usize,
        len: usize,
        viewport: &Viewport,
    ) -> PixelRect {
        let t = run.transform;
        let run_len = run.char_len().max(1) as f32;

        // Run widths are in page units; express the per-character advance in
        // text space so the transform's horizontal scale brings it back.
        let (char_width, advance) = if t.a.abs() > EPSILON {
            (run.width / run_len / t.a.abs(), t.a)
        } else {
            (run.width / run_len, 1.0)
        };

        let x_pdf = t.e + (offset as f32 * char_width) * advance;
        let width_pdf = len as f32 * char_width * advance.abs();
        let item_height = if t.d.abs() > EPSILON {
            t.d.abs()
        } else {
            run.height.abs()
        };

        let scale = viewport.scale;
        PixelRect {
            x: x_pdf * scale,
            y: viewport.height - t.f * scale - item_height * scale,
            width: width_pdf * scale,
            height: item_height * scale,
        }
    }
}

fn sanitize_ratio(ratio: f32) -> f32 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_run() -> TextRun {
        // 19 characters, 12pt font, 95pt wide, baseline 700pt above the bottom.
        TextRun::new(
            "the quick brown fox",
            Transform::new(12.0, 0.0, 0.0, 12.0, 72.0, 700.0),
            95.0,
            12.0,
        )
    }

    fn letter_page() -> PageSize {
        PageSize::new(612.0, 792.0)
    }

    #[test]
    fn maps_match_inside_run_bounds() {
        let mapper = CoordinateMapper::default();
        let run = sample_run();
        let viewport = Viewport::for_page(letter_page(), 1.0);

        let mapped = mapper.map(&run, 4, 5, &viewport, 1.0);
        let bounds = mapper.run_bounds(&run, &viewport);

        assert!(!mapped.rotated);
        assert!(bounds.contains(&mapped.rect), "{mapped:?} not in {bounds:?}");
        assert!((mapped.rect.x - (72.0 + 4.0 * 5.0)).abs() < 1e-3);
        assert!((mapped.rect.width - (25.0 + 1.0)).abs() < 1e-3);
        assert!((mapped.rect.y - (792.0 - 700.0 - 12.0)).abs() < 1e-3);
        assert!((mapped.rect.height - 12.0).abs() < 1e-3);
    }

    #[test]
    fn scale_multiplies_every_coordinate() {
        let mapper = CoordinateMapper::new(0.0, 0.0);
        let run = sample_run();
        let one = mapper.map(&run, 4, 5, &Viewport::for_page(letter_page(), 1.0), 1.0);
        let two = mapper.map(&run, 4, 5, &Viewport::for_page(letter_page(), 2.0), 1.0);

        assert!((two.rect.x - one.rect.x * 2.0).abs() < 1e-3);
        assert!((two.rect.y - one.rect.y * 2.0).abs() < 1e-3);
        assert!((two.rect.width - one.rect.width * 2.0).abs() < 1e-3);
    }

    #[test]
    fn display_ratio_absorbs_visual_zoom() {
        let mapper = CoordinateMapper::default();
        let run = sample_run();
        let viewport = Viewport::for_page(letter_page(), 1.25);
        let base = mapper.map(&run, 0, 3, &viewport, 1.0);
        let zoomed = mapper.map(&run, 0, 3, &viewport, 1.5);

        assert_eq!(zoomed.rect, base.rect.scaled(1.5));
        assert_eq!(mapper.map(&run, 0, 3, &viewport, f32::NAN).rect, base.rect);
    }

    #[test]
    fn enforces_minimum_width() {
        let mapper = CoordinateMapper::new(8.0, 0.0);
        let run = sample_run();
        let mapped = mapper.map(&run, 0, 1, &Viewport::for_page(letter_page(), 1.0), 1.0);
        assert_eq!(mapped.rect.width, 8.0);
    }

    #[test]
    fn degenerate_vertical_scale_falls_back_to_run_height() {
        let mapper = CoordinateMapper::default();
        let run = TextRun::new("abc", Transform::new(10.0, 0.0, 0.0, 0.0, 0.0, 100.0), 15.0, 9.0);
        let mapped = mapper.map(&run, 0, 1, &Viewport::for_page(letter_page(), 1.0), 1.0);
        assert!((mapped.rect.height - 9.0).abs() < 1e-3);
    }

    #[test]
    fn sheared_runs_are_flagged() {
        let mapper = CoordinateMapper::default();
        let run = TextRun::new("rotated", Transform::new(0.0, 12.0, -12.0, 0.0, 300.0, 300.0), 50.0, 12.0);
        let mapped = mapper.map(&run, 0, 3, &Viewport::for_page(letter_page(), 1.0), 1.0);
        assert!(mapped.rotated);
    }

    #[test]
    fn advance_does_not_depend_on_font_size() {
        let mapper = CoordinateMapper::new(0.0, 0.0);
        let viewport = Viewport::for_page(letter_page(), 2.0);
        for size in [1.0, 12.0, 30.0] {
            // 4 characters spanning 40 page units whatever the font size.
            let run = TextRun::new("abcd", Transform::new(size, 0.0, 0.0, size, 100.0, 500.0), 40.0, size);
            let mapped = mapper.map(&run, 2, 1, &viewport, 1.0);
            assert!((mapped.rect.x - 240.0).abs() < 1e-3);
            assert!((mapped.rect.width - 20.0).abs() < 1e-3);
        }
    }
}
