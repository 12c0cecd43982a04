//! Frame overlay: face rectangle plus verdict caption.
//!
//! Captions use a built-in 5×7 bitmap font so no font file is needed at
//! runtime. Only the glyphs the captions use are defined; anything else
//! renders as a blank cell.

use crate::types::{FaceRegion, MaskVerdict};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const BOX_THICKNESS: u32 = 2;
/// Caption baseline sits this many pixels above the box.
const CAPTION_OFFSET: i32 = 10;
const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const GLYPH_SCALE: i32 = 2;
const GLYPH_ADVANCE: i32 = (GLYPH_WIDTH + 1) * GLYPH_SCALE;

/// Draw the region outline and the verdict caption onto `frame` in place.
pub fn draw_verdict(frame: &mut RgbImage, region: &FaceRegion, verdict: &MaskVerdict) {
    let color = verdict.state.color();
    draw_box(frame, region, color);
    draw_text(
        frame,
        region.start_x as i32,
        region.start_y as i32 - CAPTION_OFFSET,
        &verdict.caption(),
        color,
    );
}

/// Outline `region` with a [`BOX_THICKNESS`]-pixel border, growing inward.
pub fn draw_box(frame: &mut RgbImage, region: &FaceRegion, color: [u8; 3]) {
    for inset in 0..BOX_THICKNESS {
        let (w, h) = (region.width(), region.height());
        if w <= inset * 2 || h <= inset * 2 {
            break;
        }
        let rect = Rect::at((region.start_x + inset) as i32, (region.start_y + inset) as i32)
            .of_size(w - inset * 2, h - inset * 2);
        draw_hollow_rect_mut(frame, rect, Rgb(color));
    }
}

/// Render `text` with its bottom-left corner at (`x`, `baseline`).
/// Pixels falling outside the frame are dropped.
pub fn draw_text(frame: &mut RgbImage, x: i32, baseline: i32, text: &str, color: [u8; 3]) {
    let top = baseline - GLYPH_HEIGHT * GLYPH_SCALE;
    let mut cursor_x = x;
    for ch in text.chars() {
        draw_glyph(frame, cursor_x, top, glyph(ch), color);
        cursor_x += GLYPH_ADVANCE;
    }
}

fn draw_glyph(frame: &mut RgbImage, x: i32, y: i32, rows: [u8; 7], color: [u8; 3]) {
    let (width, height) = (frame.width() as i32, frame.height() as i32);
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                continue;
            }
            for dy in 0..GLYPH_SCALE {
                for dx in 0..GLYPH_SCALE {
                    let px = x + col * GLYPH_SCALE + dx;
                    let py = y + row as i32 * GLYPH_SCALE + dy;
                    if px >= 0 && py >= 0 && px < width && py < height {
                        frame.put_pixel(px as u32, py as u32, Rgb(color));
                    }
                }
            }
        }
    }
}

fn glyph(ch: char) -> [u8; 7] {
    match ch {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'a' => [0b00000, 0b00000, 0b01110, 0b00001, 0b01111, 0b10001, 0b01111],
        'k' => [0b10000, 0b10000, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010],
        'o' => [0b00000, 0b00000, 0b01110, 0b10001, 0b10001, 0b10001, 0b01110],
        's' => [0b00000, 0b00000, 0b01110, 0b10000, 0b01110, 0b00001, 0b11110],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        '%' => [0b11000, 0b11001, 0b00010, 0b00100, 0b01000, 0b10011, 0b00011],
        _ => [0; 7],
    }
}
