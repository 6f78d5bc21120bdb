//! Drawing primitives for review and diagnostic renderings.

use image::{Rgb, RgbImage};

pub fn draw_filled_circle(img: &mut RgbImage, cx: i32, cy: i32, radius: i32, color: Rgb<u8>) {
    let r2 = radius * radius;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= r2 {
                put_pixel_checked(img, cx + dx, cy + dy, color);
            }
        }
    }
}

pub fn draw_circle(img: &mut RgbImage, cx: i32, cy: i32, radius: i32, color: Rgb<u8>) {
    // Midpoint circle, eight-way symmetric.
    let mut x = radius;
    let mut y = 0;
    let mut err = 1 - radius;
    while x >= y {
        for (px, py) in [
            (cx + x, cy + y),
            (cx - x, cy + y),
            (cx + x, cy - y),
            (cx - x, cy - y),
            (cx + y, cy + x),
            (cx - y, cy + x),
            (cx + y, cy - x),
            (cx - y, cy - x),
        ] {
            put_pixel_checked(img, px, py, color);
        }
        y += 1;
        if err < 0 {
            err += 2 * y + 1;
        } else {
            x -= 1;
            err += 2 * (y - x) + 1;
        }
    }
}

pub fn draw_line(img: &mut RgbImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
    // Bresenham.
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);
    loop {
        put_pixel_checked(img, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;

/// Stamp a short label with a built-in 5x7 glyph set. Covers digits,
/// punctuation, and the few lowercase letters the diagnostic overlays use;
/// unknown characters render as blanks.
pub fn draw_text(img: &mut RgbImage, x: i32, y: i32, text: &str, scale: i32, color: Rgb<u8>) {
    let scale = scale.max(1);
    let mut pen_x = x;
    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            for (gy, row_bits) in rows.iter().enumerate() {
                let bits = *row_bits as i32;
                for gx in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - gx)) != 0 {
                        for sy in 0..scale {
                            for sx in 0..scale {
                                put_pixel_checked(
                                    img,
                                    pen_x + gx * scale + sx,
                                    y + gy as i32 * scale + sy,
                                    color,
                                );
                            }
                        }
                    }
                }
            }
        }
        pen_x += (GLYPH_WIDTH + 1) * scale;
    }
}

/// Pixel width of a label rendered by [`draw_text`].
pub fn text_width(text: &str, scale: i32) -> i32 {
    text.chars().count() as i32 * (GLYPH_WIDTH + 1) * scale.max(1)
}

/// Pixel height of a label rendered by [`draw_text`].
pub fn text_height(scale: i32) -> i32 {
    GLYPH_HEIGHT * scale.max(1)
}

fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
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
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        'a' => [0b00000, 0b00000, 0b01110, 0b00001, 0b01111, 0b10001, 0b01111],
        'e' => [0b00000, 0b00000, 0b01110, 0b10001, 0b11111, 0b10000, 0b01110],
        'g' => [0b00000, 0b00000, 0b01111, 0b10001, 0b01111, 0b00001, 0b01110],
        'p' => [0b00000, 0b00000, 0b11110, 0b10001, 0b11110, 0b10000, 0b10000],
        'r' => [0b00000, 0b00000, 0b10110, 0b11001, 0b10000, 0b10000, 0b10000],
        'v' => [0b00000, 0b00000, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'x' => [0b00000, 0b00000, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}

fn put_pixel_checked(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_circle_marks_center_and_clips_at_edges() {
        let mut img = RgbImage::new(10, 10);
        draw_filled_circle(&mut img, 0, 0, 3, Rgb([255, 0, 0]));
        assert_eq!(img.get_pixel(0, 0), &Rgb([255, 0, 0]));
        // Negative coordinates are clipped, not wrapped.
        assert_eq!(img.get_pixel(9, 9), &Rgb([0, 0, 0]));
    }

    #[test]
    fn line_connects_endpoints() {
        let mut img = RgbImage::new(8, 8);
        draw_line(&mut img, 1, 1, 6, 4, Rgb([0, 255, 0]));
        assert_eq!(img.get_pixel(1, 1), &Rgb([0, 255, 0]));
        assert_eq!(img.get_pixel(6, 4), &Rgb([0, 255, 0]));
    }

    #[test]
    fn text_stamps_known_glyphs() {
        let mut img = RgbImage::new(80, 12);
        draw_text(&mut img, 1, 1, "0.5 px", 1, Rgb([255, 255, 255]));
        let lit = img.pixels().filter(|p| p[0] > 0).count();
        assert!(lit > 10);
        assert!(text_width("0.5 px", 1) == 36);
        assert_eq!(text_height(2), 14);
    }
}
