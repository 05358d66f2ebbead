use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};

pub const CELL: u32 = 8;

/// Pixel size of `text` at the given integer scale.
pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let n = text.chars().count() as u32;
    (n.saturating_mul(CELL * scale), CELL * scale)
}

fn bitmap(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

/// Draw `text` with its top-left cell corner at (x, y). Pixels off the image are skipped.
pub fn draw_text(img: &mut RgbImage, x: i32, y: i32, scale: u32, text: &str, color: Rgb<u8>) {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let s = scale as i64;
    let cell = CELL as i64 * s;

    for (i, ch) in text.chars().enumerate() {
        let ox = x as i64 + i as i64 * cell;
        if ox >= w {
            break;
        }
        if ox + cell <= 0 {
            continue;
        }
        for (row, bits) in bitmap(ch).iter().enumerate() {
            for col in 0..CELL as i64 {
                if bits & (1 << col) == 0 {
                    continue;
                }
                let px = ox + col * s;
                let py = y as i64 + row as i64 * s;
                for dy in 0..s {
                    for dx in 0..s {
                        let (qx, qy) = (px + dx, py + dy);
                        if qx >= 0 && qy >= 0 && qx < w && qy < h {
                            img.put_pixel(qx as u32, qy as u32, color);
                        }
                    }
                }
            }
        }
    }
}
