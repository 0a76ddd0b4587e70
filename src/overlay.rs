//! Timestamp overlay.
//!
//! Burns the local wall-clock time (`YYYY-MM-DD HH:MM:SS`) into the top-left
//! corner of a frame with a built-in 5x7 bitmap font.

use chrono::Local;
use image::{Rgb, RgbImage};

use crate::frame::{Frame, Region};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Top-left corner of the first glyph.
pub const TIMESTAMP_ORIGIN: (u32, u32) = (10, 16);
pub const TIMESTAMP_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_SCALE: u32 = 2;
const GLYPH_ADVANCE: u32 = (GLYPH_WIDTH + 1) * GLYPH_SCALE;

/// Current local time in overlay format.
pub fn timestamp_text() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Draw the current time onto `frame`.
pub fn overlay_timestamp(frame: &mut Frame) {
    let text = timestamp_text();
    draw_text(frame.image_mut(), &text, TIMESTAMP_ORIGIN, TIMESTAMP_COLOR);
}

/// Area `text` covers when drawn at `origin`, before clipping to the image.
pub fn text_bounds(text: &str, origin: (u32, u32)) -> Region {
    let chars = text.chars().count() as u32;
    Region::new(
        origin.0,
        origin.1,
        chars.saturating_mul(GLYPH_ADVANCE),
        GLYPH_HEIGHT * GLYPH_SCALE,
    )
}

/// Draw `text` with its top-left corner at `origin`. Pixels past the image
/// edge are dropped; characters without a glyph render as blanks.
pub fn draw_text(image: &mut RgbImage, text: &str, origin: (u32, u32), color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    for (n, ch) in text.chars().enumerate() {
        let Some(rows) = glyph(ch) else {
            continue;
        };
        let left = origin.0 + n as u32 * GLYPH_ADVANCE;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let x0 = left + col * GLYPH_SCALE;
                let y0 = origin.1 + row as u32 * GLYPH_SCALE;
                for dy in 0..GLYPH_SCALE {
                    for dx in 0..GLYPH_SCALE {
                        let (x, y) = (x0 + dx, y0 + dy);
                        if x < width && y < height {
                            image.put_pixel(x, y, color);
                        }
                    }
                }
            }
        }
    }
}

fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_has_fixed_shape() {
        let text = timestamp_text();
        assert_eq!(text.len(), 19);
        assert_eq!(&text[4..5], "-");
        assert_eq!(&text[10..11], " ");
        assert_eq!(&text[13..14], ":");
    }

    #[test]
    fn overlay_only_touches_top_left() {
        let mut frame = Frame::new(RgbImage::new(320, 240));
        overlay_timestamp(&mut frame);

        let bounds = text_bounds("0000-00-00 00:00:00", TIMESTAMP_ORIGIN);
        let mut changed_inside = 0;
        for (x, y, px) in frame.image().enumerate_pixels() {
            let inside = x >= bounds.x
                && x < bounds.x + bounds.width
                && y >= bounds.y
                && y < bounds.y + bounds.height;
            if px.0 != [0, 0, 0] {
                assert!(inside, "pixel ({}, {}) changed outside overlay", x, y);
                changed_inside += 1;
            }
        }
        assert!(changed_inside > 0);
    }

    #[test]
    fn drawing_is_clipped_to_small_images() {
        let mut image = RgbImage::new(14, 14);
        draw_text(&mut image, "88:88", (10, 10), TIMESTAMP_COLOR);
        // Second row of '8' starts with a lit column.
        assert_eq!(image.get_pixel(10, 12).0, TIMESTAMP_COLOR.0);
        assert_eq!(image.get_pixel(10, 10).0, [0, 0, 0]);
    }
}
