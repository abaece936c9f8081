// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Video-wall splitter with gamma-corrected edge blending.
//!
//! A [`WallSplitter`] is configured once for a given source format and grid
//! geometry. Per frame, [`WallSplitter::filter`] copies and blends the
//! source planes into one output picture per active tile; everything the hot
//! path needs (tile layout, blend LUTs, lambda ramps) is precomputed at open
//! time so filtering performs no floating point work.

pub mod blend;
pub mod display;
pub mod layout;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::picture::ChromaDescriptor;
use crate::picture::Picture;
use crate::picture::UnsupportedChroma;
use crate::picture::MAX_PLANES;
use crate::splitter::blend::crop_planar;
use crate::splitter::blend::filter_planar;
use crate::splitter::blend::BlendLut;
use crate::splitter::blend::GammaParams;
use crate::splitter::blend::LagrangeCoeffs;
use crate::splitter::blend::LambdaRamps;
use crate::splitter::display::grid_for_monitors;
use crate::splitter::display::DisplayProbe;
use crate::splitter::layout::configure;
use crate::splitter::layout::EdgeWidths;
use crate::splitter::layout::Tile;
use crate::splitter::layout::TileFilter;
use crate::splitter::layout::COL_MAX;
use crate::splitter::layout::ROW_MAX;
use crate::Fourcc;
use crate::Resolution;

pub use crate::splitter::blend::ACCURACY;

pub type Result<T> = std::result::Result<T, SplitterError>;

#[derive(Debug, Error)]
pub enum SplitterError {
    #[error(transparent)]
    UnsupportedChroma(#[from] UnsupportedChroma),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("source picture does not match the configured format")]
    InputMismatch,
    #[error("output picture allocation failed")]
    AllocationFailed,
    #[error("expected {expected} output pictures, got {got}")]
    OutputCountMismatch { expected: usize, got: usize },
    #[error("output picture {0} does not match its tile format")]
    OutputGeometryMismatch(usize),
}

/// Per-channel gamma tuning of the blended zone, as configured (sample
/// values in `0..=255`, gamma exponent in `0.0..=5.0`).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GammaConfig {
    pub gamma: f32,
    pub black_crush: u8,
    pub white_crush: u8,
    pub black_level: u8,
    pub white_level: u8,
}

impl Default for GammaConfig {
    fn default() -> Self {
        Self {
            gamma: 1.0,
            black_crush: 140,
            white_crush: 200,
            black_level: 150,
            white_level: 0,
        }
    }
}

/// Wall configuration. All percentages are in `0..=100`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    /// Grid columns; negative requests auto-detection from the displays.
    pub cols: i32,
    /// Grid rows; negative requests auto-detection from the displays.
    pub rows: i32,
    /// Width of the blended zone as a percentage of the largest possible
    /// half-overlap.
    pub blend_length: u32,
    /// Height of the blended zone, same scale as `blend_length`.
    pub blend_height: u32,
    /// Attenuate the blended zones in software; when false, tiles are hard
    /// cuts and the seams are left to the renderer.
    pub attenuate: bool,
    /// Attenuation percentage at the start of the blend profile.
    pub blend_begin: u32,
    /// Attenuation percentage at the middle control point.
    pub blend_middle: u32,
    /// Attenuation percentage at the end of the blend profile.
    pub blend_end: u32,
    /// Position of the middle control point within the ramp, in `1..=99`.
    pub blend_middle_pos: u32,
    /// Gamma tuning per colour channel (Y/U/V or R/G/B order).
    pub gamma: [GammaConfig; 3],
    /// Comma-separated list of active cell indices in row-major order;
    /// `None` activates every cell.
    pub active: Option<String>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            cols: -1,
            rows: -1,
            blend_length: 100,
            blend_height: 100,
            attenuate: true,
            blend_begin: 0,
            blend_middle: 50,
            blend_end: 100,
            blend_middle_pos: 50,
            gamma: [GammaConfig::default(); 3],
            active: None,
        }
    }
}

impl SplitterConfig {
    fn validate(&self) -> Result<()> {
        let percent = [
            ("blend-length", self.blend_length),
            ("blend-height", self.blend_height),
            ("blend-begin", self.blend_begin),
            ("blend-middle", self.blend_middle),
            ("blend-end", self.blend_end),
        ];
        for (name, value) in percent {
            if value > 100 {
                return Err(SplitterError::InvalidConfig(format!(
                    "{} must be in 0..=100, got {}",
                    name, value
                )));
            }
        }
        if !(1..=99).contains(&self.blend_middle_pos) {
            return Err(SplitterError::InvalidConfig(format!(
                "blend-middle-pos must be in 1..=99, got {}",
                self.blend_middle_pos
            )));
        }
        if self.cols > COL_MAX as i32 || self.rows > ROW_MAX as i32 {
            return Err(SplitterError::InvalidConfig(format!(
                "grid is limited to {}x{}",
                COL_MAX, ROW_MAX
            )));
        }
        for channel in &self.gamma {
            if !(0.0..=5.0).contains(&channel.gamma) {
                return Err(SplitterError::InvalidConfig(format!(
                    "gamma must be in 0.0..=5.0, got {}",
                    channel.gamma
                )));
            }
        }
        Ok(())
    }
}

/// Format of one output tile, in output-index order; this is what the
/// allocation callback passed to [`WallSplitter::filter`] must provide
/// buffers for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TileFormat {
    pub fourcc: Fourcc,
    pub resolution: Resolution,
}

#[derive(Debug)]
struct BlendTables {
    luts: Vec<BlendLut>,
    h_ramps: Vec<LambdaRamps>,
    v_ramps: Vec<LambdaRamps>,
}

#[derive(Debug)]
pub struct WallSplitter {
    chroma: &'static ChromaDescriptor,
    resolution: Resolution,
    cols: usize,
    rows: usize,
    tiles: Vec<Tile>,
    output_formats: Vec<TileFormat>,
    /// Present iff attenuation is enabled.
    blend: Option<BlendTables>,
}

fn parse_active(list: Option<&str>) -> Vec<bool> {
    let list = match list {
        None => return vec![true; COL_MAX * ROW_MAX],
        Some(list) => list,
    };

    let mut active = vec![false; COL_MAX * ROW_MAX];
    for part in list.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.parse::<usize>() {
            Ok(index) if index < COL_MAX * ROW_MAX => active[index] = true,
            Ok(index) => log::warn!("ignoring out-of-range active cell {}", index),
            Err(_) => log::warn!("ignoring unparsable active cell {:?}", part),
        }
    }
    active
}

impl WallSplitter {
    pub fn new(
        config: &SplitterConfig,
        fourcc: Fourcc,
        resolution: Resolution,
        probe: &dyn DisplayProbe,
    ) -> Result<Self> {
        let chroma = ChromaDescriptor::from_fourcc(fourcc)?;
        config.validate()?;

        let (mut cols, mut rows) = (config.cols, config.rows);
        if cols < 0 || rows < 0 {
            if let Some(displays) = probe.probe() {
                if displays.monitors > 1 {
                    let (c, r) = match displays.grid_hint {
                        Some((c, r)) if c * r == displays.monitors => (c, r),
                        _ => grid_for_monitors(displays.monitors),
                    };
                    if cols < 0 {
                        cols = c as i32;
                    }
                    if rows < 0 {
                        rows = r as i32;
                    }
                    log::debug!("detected {} displays, arranging {}x{}", displays.monitors, c, r);
                }
            }
            if rows < 0 {
                rows = 1;
            }
            if cols < 0 {
                cols = 2;
            }
        }
        let cols = cols.clamp(1, COL_MAX as i32) as usize;
        let rows = rows.clamp(1, ROW_MAX as i32) as usize;
        log::debug!("opening a {}x{} wall", cols, rows);

        // Half-overlap sizes, clamped so no interior source rectangle can
        // collapse and aligned down to the coarsest chroma divisors so every
        // plane's blend zone is a whole number of samples.
        let (mut half_w, mut half_h) = (0usize, 0usize);
        if config.blend_length > 0 && (rows > 1 || cols > 1) {
            let half_w_max = resolution.width as usize / cols / 2;
            let half_h_max = resolution.height as usize / rows / 2;
            let half_max = half_w_max.min(half_h_max);

            if cols > 1 {
                half_w = half_max * config.blend_length as usize / 100;
            }
            if rows > 1 {
                half_h = half_max * config.blend_height as usize / 100;
            }

            let (div_w, div_h) = chroma.max_divisors();
            half_w = div_w * (half_w / div_w);
            half_h = div_h * (half_h / div_h);
        }

        let blend = if config.attenuate {
            let mut gamma: Vec<GammaParams> = config
                .gamma
                .iter()
                .map(|c| GammaParams {
                    black_crush: c.black_crush as f32 / 255.0,
                    black_level: c.black_level as f32 / 255.0,
                    white_crush: c.white_crush as f32 / 255.0,
                    white_level: c.white_level as f32 / 255.0,
                    gamma: c.gamma,
                })
                .collect();
            if fourcc == Fourcc::from(b"YV12") {
                // The configuration is in U-then-V order but YV12 stores V
                // first.
                gamma.swap(1, 2);
            }

            let luts = gamma
                .iter()
                .zip(chroma.black)
                .map(|(g, black)| BlendLut::new(g, black))
                .collect();

            let coeffs = LagrangeCoeffs::new(
                config.blend_begin,
                config.blend_middle,
                config.blend_end,
                config.blend_middle_pos,
            );
            let h_ramps = (0..MAX_PLANES)
                .map(|p| LambdaRamps::new(&coeffs, 2 * half_w / chroma.div_w[p]))
                .collect();
            let v_ramps = (0..MAX_PLANES)
                .map(|p| LambdaRamps::new(&coeffs, 2 * half_h / chroma.div_h[p]))
                .collect();

            Some(BlendTables {
                luts,
                h_ramps,
                v_ramps,
            })
        } else {
            None
        };

        let active = parse_active(config.active.as_deref());
        let (tiles, output_count) = configure(
            cols,
            rows,
            resolution.width as usize,
            resolution.height as usize,
            half_w,
            half_h,
            config.attenuate,
            &active,
        );

        let mut output_formats = vec![
            TileFormat {
                fourcc,
                resolution: Resolution::default(),
            };
            output_count
        ];
        for tile in tiles.iter().filter(|t| t.active) {
            output_formats[tile.output_index].resolution =
                Resolution::from((tile.width as u32, tile.height as u32));
        }

        Ok(Self {
            chroma,
            resolution,
            cols,
            rows,
            tiles,
            output_formats,
            blend,
        })
    }

    /// Number of active tiles, i.e. the number of output pictures `filter`
    /// produces.
    pub fn output_count(&self) -> usize {
        self.output_formats.len()
    }

    /// Formats of the output pictures, in output-index order.
    pub fn output_formats(&self) -> &[TileFormat] {
        &self.output_formats
    }

    pub fn grid(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Splits `src` into one picture per active tile.
    ///
    /// `alloc` provides the output buffers (typically from a downstream
    /// pool); if it declines, or returns buffers not matching
    /// [`WallSplitter::output_formats`], the frame is dropped whole and an
    /// error returned, so there is never partial output. The source picture
    /// is consumed in all paths.
    pub fn filter<F>(&self, src: Picture, alloc: F) -> Result<Vec<Picture>>
    where
        F: FnOnce(&[TileFormat]) -> Option<Vec<Picture>>,
    {
        if src.fourcc() != self.chroma.fourcc || src.resolution() != self.resolution {
            return Err(SplitterError::InputMismatch);
        }

        let mut outputs = alloc(&self.output_formats).ok_or(SplitterError::AllocationFailed)?;
        if outputs.len() != self.output_formats.len() {
            return Err(SplitterError::OutputCountMismatch {
                expected: self.output_formats.len(),
                got: outputs.len(),
            });
        }
        for (i, (out, format)) in outputs.iter().zip(&self.output_formats).enumerate() {
            if out.fourcc() != format.fourcc || out.resolution() != format.resolution {
                return Err(SplitterError::OutputGeometryMismatch(i));
            }
        }

        for tile in self.tiles.iter().filter(|t| t.active) {
            let dst = &mut outputs[tile.output_index];
            dst.copy_properties_from(&src);

            for plane in 0..src.num_planes() {
                let div_w = self.chroma.div_w[plane];
                let div_h = self.chroma.div_h[plane];

                // Scale the layout to this plane's subsampling.
                let cfg = TileFilter {
                    black: EdgeWidths {
                        left: tile.filter.black.left / div_w,
                        right: tile.filter.black.right / div_w,
                        top: tile.filter.black.top / div_h,
                        bottom: tile.filter.black.bottom / div_h,
                    },
                    attenuate: EdgeWidths {
                        left: tile.filter.attenuate.left / div_w,
                        right: tile.filter.attenuate.right / div_w,
                        top: tile.filter.attenuate.top / div_h,
                        bottom: tile.filter.attenuate.bottom / div_h,
                    },
                };

                let src_pitch = src.plane_pitch(plane);
                let dst_pitch = dst.plane_pitch(plane);
                let origin = (tile.src_y / div_h) * src_pitch + tile.src_x / div_w;
                let src_plane = &src.plane_data(plane)[origin..];
                let copy_width = tile.src_width / div_w;
                let copy_lines = tile.src_height / div_h;

                match &self.blend {
                    Some(tables) => filter_planar(
                        dst.plane_data_mut(plane),
                        dst_pitch,
                        src_plane,
                        src_pitch,
                        copy_width,
                        copy_lines,
                        self.chroma.black[plane],
                        &cfg,
                        &tables.luts[plane],
                        &tables.h_ramps[plane],
                        &tables.v_ramps[plane],
                    ),
                    None => crop_planar(
                        dst.plane_data_mut(plane),
                        dst_pitch,
                        src_plane,
                        src_pitch,
                        copy_width,
                        copy_lines,
                    ),
                }
            }
        }

        Ok(outputs)
    }

    /// Maps a coordinate local to output tile `tile_index` back into source
    /// frame coordinates, if it falls within the tile's non-black region.
    pub fn map_mouse(&self, tile_index: usize, x: u32, y: u32) -> Option<(u32, u32)> {
        let tile = self
            .tiles
            .iter()
            .find(|t| t.active && t.output_index == tile_index)?;

        let x = x as i64 - tile.filter.black.left as i64;
        let y = y as i64 - tile.filter.black.top as i64;
        if x >= 0
            && (x as usize) < tile.width - tile.filter.black.right
            && y >= 0
            && (y as usize) < tile.height - tile.filter.black.bottom
        {
            Some(((tile.src_x + x as usize) as u32, (tile.src_y + y as usize) as u32))
        } else {
            None
        }
    }
}
