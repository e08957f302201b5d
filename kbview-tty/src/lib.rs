pub mod compose;
pub mod keys;
pub mod lines;

use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    terminal::{Clear, ClearType},
};
use kbview_core::RenderImage;
use png::{BitDepth, ColorType, Encoder};

pub use compose::{compose_page, compute_viewport_origin, crop_render_image};
pub use keys::{EventMapper, InputMode, UiEvent};
pub use lines::{draw_lines, wrap_line, LineScroll, TextArea};

const CHUNK_SIZE: usize = 4096;

/// Draws RGBA rasters with the kitty graphics protocol.
pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Transmits `image` as PNG and places it at the cursor, scaled into
    /// `params.columns` x `params.rows` cells.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        if image.width == 0 || image.height == 0 {
            return Ok(());
        }
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(CHUNK_SIZE).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = u8::from(chunks.peek().is_some());
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                    more
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", more)?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Deletes every placement of the page image, e.g. before drawing text.
    pub fn delete_image(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=I,i={},q=2\u{1b}\\", self.image_id)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Ends a synchronized update; the terminal paints the buffered frame at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}

/// Joins the document status with pending key input (`12`, `/query`).
pub fn combine_status(base: Option<String>, pending_input: Option<&str>) -> Option<String> {
    match (base, pending_input.filter(|s| !s.is_empty())) {
        (Some(mut base), Some(pending)) => {
            base.push_str(" | ");
            base.push_str(pending);
            Some(base)
        }
        (Some(base), None) => Some(base),
        (None, Some(pending)) => Some(pending.to_string()),
        (None, None) => None,
    }
}

/// Pads or shortens `text` to exactly `width` characters.
pub fn truncate_with_ellipsis(text: &str, width: usize) -> String {
    let count = text.chars().count();
    let mut out: String = if count > width {
        if width <= 3 {
            text.chars().take(width).collect()
        } else {
            let mut truncated: String = text.chars().take(width - 3).collect();
            truncated.push_str("...");
            truncated
        }
    } else {
        text.to_string()
    };
    let len = out.chars().count();
    if len < width {
        out.push_str(&" ".repeat(width - len));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kitty_draw_emits_protocol() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let image = RenderImage {
            width: 1,
            height: 1,
            pixels: vec![255, 0, 0, 255],
        };

        renderer.draw(&image, DrawParams::clamped(10, 5)).unwrap();
        let output = renderer.into_inner();
        assert_eq!(&output[..3], b"\x1b_G");
        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("c=10,r=5,s=1,v=1"));
        assert!(text.ends_with("\x1b\\"));
    }

    #[test]
    fn large_images_are_sent_in_chunks() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let mut state: u32 = 0x2545_f491;
        let pixels: Vec<u8> = (0..64 * 64 * 4)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            })
            .collect();
        let image = RenderImage {
            width: 64,
            height: 64,
            pixels,
        };
        renderer.draw(&image, DrawParams::clamped(0, 0)).unwrap();
        let text = String::from_utf8_lossy(&renderer.into_inner()).into_owned();
        assert!(text.contains("c=1,r=1"));
        assert!(text.contains("m=1"));
        assert!(text.contains("\x1b_Gm=0,q=2"));
    }

    #[test]
    fn empty_images_are_skipped() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let image = RenderImage {
            width: 0,
            height: 0,
            pixels: Vec::new(),
        };
        renderer.draw(&image, DrawParams::clamped(4, 4)).unwrap();
        assert!(renderer.into_inner().is_empty());
    }

    #[test]
    fn status_joins_pending_input() {
        assert_eq!(
            combine_status(Some("guide.pdf".into()), Some("/rev")).as_deref(),
            Some("guide.pdf | /rev")
        );
        assert_eq!(combine_status(None, Some("")), None);
    }

    #[test]
    fn truncation_pads_and_shortens() {
        assert_eq!(truncate_with_ellipsis("abc", 5), "abc  ");
        assert_eq!(truncate_with_ellipsis("abcdefgh", 6), "abc...");
        assert_eq!(truncate_with_ellipsis("abcdefgh", 2), "ab");
    }
}
