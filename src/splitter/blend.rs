// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Precomputed blend tables and the per-plane filter.
//!
//! Blending happens in two steps: at open time the gamma parameters are
//! folded into a lookup table mapping (attenuation index, sample value) to an
//! output sample, and the quadratic attenuation profile is sampled into
//! per-plane "lambda ramps" of table indices. At filter time every blended
//! byte is then a pure table lookup.

use crate::splitter::layout::TileFilter;

/// Discretization of the attenuation coefficient: lambda ramps hold indices
/// in `0..=ACCURACY` into the blend LUT.
pub const ACCURACY: usize = 1000;

fn clip_accuracy(a: i64) -> u16 {
    a.clamp(0, ACCURACY as i64) as u16
}

fn clip_unit(f: f32) -> f32 {
    f.clamp(0.0, 1.0)
}

/// Per-plane gamma tuning, with all sample-valued fields normalized to
/// `0.0..=1.0`.
#[derive(Copy, Clone, Debug)]
pub struct GammaParams {
    pub black_crush: f32,
    pub black_level: f32,
    pub white_crush: f32,
    pub white_level: f32,
    pub gamma: f32,
}

impl GammaParams {
    /// Returns the attenuation factor in `[0, 1]` applied to a normalized
    /// sample value. Values strictly between the black and white crush
    /// points pass through unscaled; the extremes follow a power curve
    /// anchored at the black/white levels.
    pub fn factor(&self, value: f32) -> f64 {
        if value <= self.black_crush {
            let input = value * self.black_level / self.black_crush + (1.0 - self.black_level);
            (input as f64).powf(1.0 / self.gamma as f64)
        } else if value >= self.white_crush {
            let input = (value * (1.0 - (self.white_level + 1.0))
                + (self.white_level + 1.0) * self.white_crush
                - 1.0)
                / (self.white_crush - 1.0);
            (input as f64).powf(1.0 / self.gamma as f64)
        } else {
            1.0
        }
    }
}

/// Maps `(attenuation index, sample value)` to an output sample. Index
/// `ACCURACY` is the identity row, index 0 blends fully toward the plane's
/// black value.
#[derive(Debug)]
pub struct BlendLut {
    rows: Vec<[u8; 256]>,
}

impl BlendLut {
    pub fn new(gamma: &GammaParams, black: u8) -> Self {
        let mut rows = Vec::with_capacity(ACCURACY + 1);
        for index in 0..=ACCURACY {
            let mut row = [0u8; 256];
            for (value, out) in row.iter_mut().enumerate() {
                let factor = gamma.factor(value as f32 / 255.0) as f32;
                let f = clip_unit(1.0 - ((ACCURACY - index) as f32 * factor / (ACCURACY - 1) as f32));
                *out = (f * value as f32 + ((1.0 - f) * black as f32) as i32 as f32) as u8;
            }
            rows.push(row);
        }
        Self { rows }
    }

    #[inline]
    pub fn map(&self, index: u16, value: u8) -> u8 {
        self.rows[index as usize][value as usize]
    }
}

/// Quadratic attenuation profile coefficients, solved once from the three
/// Lagrange control points (begin/middle/end percentages and the middle
/// position).
#[derive(Copy, Clone, Debug)]
pub struct LagrangeCoeffs {
    a_0: i64,
    a_1: i64,
    a_2: i64,
}

impl LagrangeCoeffs {
    /// `begin`, `middle` and `end` are attenuation percentages; `middle_pos`
    /// is the middle control point's position as a percentage of the ramp
    /// length (must be in `1..=99` so the closed form below is defined).
    pub fn new(begin: u32, middle: u32, end: u32, middle_pos: u32) -> Self {
        let p = 100.0 / middle_pos as f64;
        let begin = begin as f64;
        let middle = middle as f64;
        let end = end as f64;

        let a_2 = p * begin - (p * p / (p - 1.0)) * middle + (p / (p - 1.0)) * end;
        let a_1 = -(p + 1.0) * begin + (p * p / (p - 1.0)) * middle - (1.0 / (p - 1.0)) * end;
        let a_0 = begin;

        Self {
            a_0: a_0 as i64,
            a_1: a_1 as i64,
            a_2: a_2 as i64,
        }
    }
}

/// Attenuation-index sequences across one overlap length, one per edge
/// position: `leading` for the edge where the neighbouring tile lies before
/// this one, `trailing` for the opposite edge.
#[derive(Debug, Default)]
pub struct LambdaRamps {
    pub leading: Vec<u16>,
    pub trailing: Vec<u16>,
}

impl LambdaRamps {
    /// Samples the quadratic profile over `length` positions. `length` is
    /// already expressed in plane samples (i.e. divided by the plane's
    /// subsampling divisor).
    pub fn new(coeffs: &LagrangeCoeffs, length: usize) -> Self {
        if length == 0 {
            return Self::default();
        }

        let den = (length * length) as i64;
        let scale = (ACCURACY / 100) as i64;
        let a_2 = coeffs.a_2 * scale;
        let a_1 = coeffs.a_1 * length as i64 * scale;
        let a_0 = coeffs.a_0 * den * scale;

        let lambda = |v: i64| clip_accuracy(ACCURACY as i64 - (a_2 * v * v + a_1 * v + a_0) / den);

        let leading = (0..length).map(|i| lambda((length - i) as i64)).collect();
        let trailing = (0..length).map(|i| lambda(i as i64)).collect();

        Self { leading, trailing }
    }
}

/// Produces one output plane for one tile: black borders, blended edges and
/// a straight copy of the interior, in a single pass over the output rows.
///
/// `src` must start at the tile's source origin within the plane;
/// `copy_width`/`copy_lines` and every width in `cfg` are in plane samples.
/// `h_ramps` runs across a row (left/right edges), `v_ramps` down the rows
/// (top/bottom edges). Rows inside the top/bottom attenuation bands are
/// re-attenuated whole after horizontal composition, so corners compound
/// both directions through two successive table lookups.
pub fn filter_planar(
    dst: &mut [u8],
    dst_pitch: usize,
    src: &[u8],
    src_pitch: usize,
    copy_width: usize,
    copy_lines: usize,
    black: u8,
    cfg: &TileFilter,
    lut: &BlendLut,
    h_ramps: &LambdaRamps,
    v_ramps: &LambdaRamps,
) {
    // A border is never black and attenuated at once.
    debug_assert!(cfg.black.left == 0 || cfg.attenuate.left == 0);
    debug_assert!(cfg.black.right == 0 || cfg.attenuate.right == 0);
    debug_assert!(cfg.black.top == 0 || cfg.attenuate.top == 0);
    debug_assert!(cfg.black.bottom == 0 || cfg.attenuate.bottom == 0);

    let out_width = cfg.black.left + copy_width + cfg.black.right;
    let mut out_line = 0;

    for _ in 0..cfg.black.top {
        dst[out_line * dst_pitch..][..out_width].fill(black);
        out_line += 1;
    }

    for y in 0..copy_lines {
        let src_row = &src[y * src_pitch..][..copy_width];
        let row = &mut dst[out_line * dst_pitch..][..out_width];

        let mut di = cfg.black.left;
        let mut si = 0;
        row[..di].fill(black);

        for i in 0..cfg.attenuate.left {
            row[di] = lut.map(h_ramps.leading[i], src_row[si]);
            di += 1;
            si += 1;
        }

        let unmodified = copy_width - cfg.attenuate.left - cfg.attenuate.right;
        row[di..di + unmodified].copy_from_slice(&src_row[si..si + unmodified]);
        di += unmodified;
        si += unmodified;

        for i in 0..cfg.attenuate.right {
            row[di] = lut.map(h_ramps.trailing[i], src_row[si]);
            di += 1;
            si += 1;
        }
        row[di..di + cfg.black.right].fill(black);

        let attenuate_top = y < cfg.attenuate.top;
        let attenuate_bottom = y >= copy_lines - cfg.attenuate.bottom;
        if attenuate_top || attenuate_bottom {
            let index = if attenuate_top {
                v_ramps.leading[y]
            } else {
                v_ramps.trailing[y - (copy_lines - cfg.attenuate.bottom)]
            };
            for b in row.iter_mut() {
                *b = lut.map(index, *b);
            }
        }

        out_line += 1;
    }

    for _ in 0..cfg.black.bottom {
        dst[out_line * dst_pitch..][..out_width].fill(black);
        out_line += 1;
    }
}

/// Straight crop of one plane, used when attenuation is disabled and the
/// tile is a plain sub-rectangle of the source.
pub fn crop_planar(
    dst: &mut [u8],
    dst_pitch: usize,
    src: &[u8],
    src_pitch: usize,
    copy_width: usize,
    copy_lines: usize,
) {
    let src_lines = src.chunks(src_pitch).map(|line| &line[..copy_width]);
    let dst_lines = dst.chunks_mut(dst_pitch);
    for (src_line, dst_line) in src_lines.zip(dst_lines).take(copy_lines) {
        dst_line[..copy_width].copy_from_slice(src_line);
    }
}
