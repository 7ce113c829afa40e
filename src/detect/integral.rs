//! Summed-area tables for constant-time rectangle sums.

use image::GrayImage;

/// Integral, squared integral and (optionally) 45-degree tilted integral of
/// one grayscale image. Every table is `(width + 1) x (height + 1)`.
pub struct IntegralImages {
    stride: usize,
    sum: Vec<i64>,
    sq_sum: Vec<u64>,
    tilted: Option<Vec<i64>>,
}

impl IntegralImages {
    pub fn new(image: &GrayImage, with_tilted: bool) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0i64; stride * (h + 1)];
        let mut sq_sum = vec![0u64; stride * (h + 1)];
        let pixels = image.as_raw();

        for y in 0..h {
            let mut row_sum = 0i64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = pixels[y * w + x] as u64;
                row_sum += v as i64;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }

        let tilted = with_tilted.then(|| tilted_table(image));
        Self {
            stride,
            sum,
            sq_sum,
            tilted,
        }
    }

    pub fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> i64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        self.sum[y1 * self.stride + x1] - self.sum[y0 * self.stride + x1]
            - self.sum[y1 * self.stride + x0]
            + self.sum[y0 * self.stride + x0]
    }

    pub fn sq_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        (self.sq_sum[y1 * self.stride + x1] + self.sq_sum[y0 * self.stride + x0])
            - (self.sq_sum[y0 * self.stride + x1] + self.sq_sum[y1 * self.stride + x0])
    }

    /// Sum over the rectangle rotated by 45 degrees whose top corner is
    /// `(x, y)`; `w` runs down-right and `h` runs down-left.
    ///
    /// Returns 0 when the tilted table was not built.
    pub fn tilted_sum(&self, x: u32, y: u32, w: u32, h: u32) -> i64 {
        let Some(t) = self.tilted.as_ref() else {
            return 0;
        };
        let (x, y, w, h) = (x as usize, y as usize, w as usize, h as usize);
        let at = |px: usize, py: usize| t[py * self.stride + px];
        at(x, y) - at(x - h, y + h) - at(x + w, y + w) + at(x + w - h, y + w + h)
    }
}

/// `T(X, Y)` is the sum of pixels `(x, y)` with `y < Y` and
/// `|x - X + 1| <= Y - y - 1`: the upward-opening triangle whose apex is the
/// pixel `(X - 1, Y - 1)`.
///
/// The recurrence reads one column left and right of `X`, so it runs on a
/// table padded by `height + 1` columns on both sides, which keeps the
/// truncation error at the padding edges out of the `0..=width` range.
fn tilted_table(image: &GrayImage) -> Vec<i64> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let pad = h + 1;
    let ext_w = (w + 1 + 2 * pad) as usize;
    let rows = (h + 1) as usize;
    let mut ext = vec![0i64; ext_w * rows];

    let pixel = |x: i64, y: i64| -> i64 {
        if x < 0 || y < 0 || x >= w || y >= h {
            0
        } else {
            image.get_pixel(x as u32, y as u32).0[0] as i64
        }
    };
    let col = |x: i64| (x + pad) as usize;

    for yy in 1..=h {
        let row = yy as usize;
        for xx in -pad..=(w + pad) {
            let c = col(xx);
            let up_left = if c > 0 { ext[(row - 1) * ext_w + c - 1] } else { 0 };
            let up_right = if c + 1 < ext_w {
                ext[(row - 1) * ext_w + c + 1]
            } else {
                0
            };
            let up_two = if row >= 2 { ext[(row - 2) * ext_w + c] } else { 0 };
            ext[row * ext_w + c] =
                up_left + up_right - up_two + pixel(xx - 1, yy - 1) + pixel(xx - 1, yy - 2);
        }
    }

    let stride = (w + 1) as usize;
    let mut table = vec![0i64; stride * rows];
    for row in 0..rows {
        for x in 0..stride {
            table[row * stride + x] = ext[row * ext_w + col(x as i64)];
        }
    }
    table
}
