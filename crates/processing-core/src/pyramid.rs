//! Gaussian image pyramid.
//!
//! Each reduction low-passes with the 5-tap binomial kernel
//! `[1, 4, 6, 4, 1] / 16` along both axes and keeps every other sample,
//! so a `w x h` image becomes `ceil(w/2) x ceil(h/2)`. Expansion is the
//! polyphase inverse: even output samples blend three neighbours
//! `(1, 6, 1) / 8`, odd samples average the two they sit between.
//! Borders reflect without repeating the edge sample.

use lazyeyes_frame_model::FloatImage;

const KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Spatial reduction stage applied to every frame before buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PyramidReducer {
    levels: usize,
    use_laplacian: bool,
}

impl PyramidReducer {
    pub fn new(levels: usize, use_laplacian: bool) -> Self {
        Self {
            levels,
            use_laplacian,
        }
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn use_laplacian(&self) -> bool {
        self.use_laplacian
    }

    /// Downsample `image` by `2^levels`, optionally keeping only the
    /// Laplacian residual of the smallest level.
    pub fn reduce(&self, image: &FloatImage) -> FloatImage {
        reduce(image, self.levels, self.use_laplacian)
    }

    /// Upsample a reduced image back to `width x height`.
    pub fn expand(&self, small: &FloatImage, width: usize, height: usize) -> FloatImage {
        expand(small, self.levels, width, height)
    }

    /// Size of the image `reduce` produces for a `width x height` input.
    pub fn reduced_size(&self, width: usize, height: usize) -> (usize, usize) {
        reduced_size(width, height, self.levels)
    }
}

/// Size of a `width x height` image after `levels` reductions.
pub fn reduced_size(width: usize, height: usize, levels: usize) -> (usize, usize) {
    (0..levels).fold((width, height), |(w, h), _| (w.div_ceil(2), h.div_ceil(2)))
}

/// Apply `levels` Gaussian reductions, then optionally subtract the
/// re-expanded next level to strip the lowest spatial frequencies.
pub fn reduce(image: &FloatImage, levels: usize, use_laplacian: bool) -> FloatImage {
    let mut small = image.clone();
    for _ in 0..levels {
        small = pyr_down(&small);
    }

    if use_laplacian {
        let blurred = pyr_up(&pyr_down(&small), small.width(), small.height());
        for (v, b) in small.data_mut().iter_mut().zip(blurred.data()) {
            *v -= b;
        }
    }

    small
}

/// Apply `levels` expansions, landing exactly on `width x height`.
///
/// Odd sizes along the way are reproduced from the same halving chain that
/// `reduce` followed, so a reduce/expand pair always round-trips the shape.
pub fn expand(small: &FloatImage, levels: usize, width: usize, height: usize) -> FloatImage {
    let sizes = level_sizes(width, height, levels);
    let mut image = small.clone();
    for &(w, h) in sizes.iter().rev().skip(1) {
        image = pyr_up(&image, w, h);
    }
    image
}

/// Sizes of every pyramid level from full resolution down to `levels`.
fn level_sizes(width: usize, height: usize, levels: usize) -> Vec<(usize, usize)> {
    let mut sizes = Vec::with_capacity(levels + 1);
    let (mut w, mut h) = (width, height);
    sizes.push((w, h));
    for _ in 0..levels {
        w = w.div_ceil(2);
        h = h.div_ceil(2);
        sizes.push((w, h));
    }
    sizes
}

/// Blur and halve one level.
pub fn pyr_down(src: &FloatImage) -> FloatImage {
    let (w, h, c) = (src.width(), src.height(), src.channels());
    let dw = w.div_ceil(2);
    let dh = h.div_ceil(2);

    // Horizontal pass: full height, half width.
    let row_stride = dw * c;
    let mut tmp = vec![0.0f32; h * row_stride];
    for (y, out_row) in tmp.chunks_exact_mut(row_stride).enumerate() {
        let row = src.row(y);
        for x in 0..dw {
            let center = 2 * x as isize;
            for ch in 0..c {
                let mut acc = 0.0;
                for (k, weight) in KERNEL.iter().enumerate() {
                    let sx = reflect101(center + k as isize - 2, w);
                    acc += weight * row[sx * c + ch];
                }
                out_row[x * c + ch] = acc;
            }
        }
    }

    // Vertical pass: half height.
    let mut out = FloatImage::zeros(dw, dh, src.layout());
    for (y, out_row) in out.data_mut().chunks_exact_mut(row_stride).enumerate() {
        let center = 2 * y as isize;
        for (k, weight) in KERNEL.iter().enumerate() {
            let sy = reflect101(center + k as isize - 2, h);
            let src_row = &tmp[sy * row_stride..(sy + 1) * row_stride];
            for (d, s) in out_row.iter_mut().zip(src_row) {
                *d += weight * s;
            }
        }
    }

    out
}

/// Double one level to `dw x dh` (normally `2w x 2h` or one less).
pub fn pyr_up(src: &FloatImage, dw: usize, dh: usize) -> FloatImage {
    let (w, h, c) = (src.width(), src.height(), src.channels());

    // Horizontal pass: source height, target width.
    let row_stride = dw * c;
    let mut tmp = vec![0.0f32; h * row_stride];
    for (y, out_row) in tmp.chunks_exact_mut(row_stride).enumerate() {
        let row = src.row(y);
        for x in 0..dw {
            let i = (x / 2) as isize;
            for ch in 0..c {
                let at = |j: isize| row[reflect101(j, w) * c + ch];
                out_row[x * c + ch] = if x % 2 == 0 {
                    (at(i - 1) + 6.0 * at(i) + at(i + 1)) / 8.0
                } else {
                    (at(i) + at(i + 1)) / 2.0
                };
            }
        }
    }

    // Vertical pass: target height.
    let mut out = FloatImage::zeros(dw, dh, src.layout());
    for (y, out_row) in out.data_mut().chunks_exact_mut(row_stride).enumerate() {
        let i = (y / 2) as isize;
        let source = |j: isize| {
            let sy = reflect101(j, h);
            &tmp[sy * row_stride..(sy + 1) * row_stride]
        };
        if y % 2 == 0 {
            let (above, mid, below) = (source(i - 1), source(i), source(i + 1));
            for (x, d) in out_row.iter_mut().enumerate() {
                *d = (above[x] + 6.0 * mid[x] + below[x]) / 8.0;
            }
        } else {
            let (mid, below) = (source(i), source(i + 1));
            for (x, d) in out_row.iter_mut().enumerate() {
                *d = (mid[x] + below[x]) / 2.0;
            }
        }
    }

    out
}

/// Reflect an out-of-range index back into `0..n` without repeating the
/// edge sample (`-1 -> 1`, `n -> n - 2`).
fn reflect101(mut i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * (n - 1) - i;
        } else {
            return i as usize;
        }
    }
}
