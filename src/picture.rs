// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Owned planar picture buffers and the static chroma description table.
//!
//! Pictures here are plain CPU memory: one `Vec<u8>` per plane plus a pitch.
//! They stand in for the frame buffers a decoder hands to a splitter and a
//! splitter hands to a renderer, without tying the crate to any particular
//! allocator or mapping scheme.

use thiserror::Error;

use crate::Fourcc;
use crate::Resolution;

/// Number of planes of the planar formats we handle.
pub const MAX_PLANES: usize = 3;

const fn fourcc(n: [u8; 4]) -> Fourcc {
    Fourcc(n[0] as u32 | (n[1] as u32) << 8 | (n[2] as u32) << 16 | (n[3] as u32) << 24)
}

/// Static per-format metadata: per-plane subsampling divisors and the byte
/// value that renders as black in each plane.
#[derive(Debug)]
pub struct ChromaDescriptor {
    pub fourcc: Fourcc,
    /// Horizontal subsampling divisor of each plane.
    pub div_w: [usize; MAX_PLANES],
    /// Vertical subsampling divisor of each plane.
    pub div_h: [usize; MAX_PLANES],
    /// The "black" sample value of each plane.
    pub black: [u8; MAX_PLANES],
    pub planar: bool,
}

// TODO: packed chroma (YUYV and friends) would need a per-pixel-group filter
// path; only planar formats are described for now.
static CHROMA_TABLE: [ChromaDescriptor; 10] = [
    ChromaDescriptor {
        fourcc: fourcc(*b"I410"),
        div_w: [1, 4, 4],
        div_h: [1, 1, 1],
        black: [0, 128, 128],
        planar: true,
    },
    ChromaDescriptor {
        fourcc: fourcc(*b"I411"),
        div_w: [1, 4, 4],
        div_h: [1, 4, 4],
        black: [0, 128, 128],
        planar: true,
    },
    ChromaDescriptor {
        fourcc: fourcc(*b"YV12"),
        div_w: [1, 2, 2],
        div_h: [1, 2, 2],
        black: [0, 128, 128],
        planar: true,
    },
    ChromaDescriptor {
        fourcc: fourcc(*b"I420"),
        div_w: [1, 2, 2],
        div_h: [1, 2, 2],
        black: [0, 128, 128],
        planar: true,
    },
    ChromaDescriptor {
        fourcc: fourcc(*b"J420"),
        div_w: [1, 2, 2],
        div_h: [1, 2, 2],
        black: [0, 128, 128],
        planar: true,
    },
    ChromaDescriptor {
        fourcc: fourcc(*b"I422"),
        div_w: [1, 2, 2],
        div_h: [1, 1, 1],
        black: [0, 128, 128],
        planar: true,
    },
    ChromaDescriptor {
        fourcc: fourcc(*b"J422"),
        div_w: [1, 2, 2],
        div_h: [1, 1, 1],
        black: [0, 128, 128],
        planar: true,
    },
    ChromaDescriptor {
        fourcc: fourcc(*b"I440"),
        div_w: [1, 1, 1],
        div_h: [1, 2, 2],
        black: [0, 128, 128],
        planar: true,
    },
    ChromaDescriptor {
        fourcc: fourcc(*b"J440"),
        div_w: [1, 1, 1],
        div_h: [1, 2, 2],
        black: [0, 128, 128],
        planar: true,
    },
    ChromaDescriptor {
        fourcc: fourcc(*b"I444"),
        div_w: [1, 1, 1],
        div_h: [1, 1, 1],
        black: [0, 128, 128],
        planar: true,
    },
];

#[derive(Debug, Error)]
#[error("chroma {0} is not supported")]
pub struct UnsupportedChroma(pub Fourcc);

impl ChromaDescriptor {
    /// Looks `fourcc` up in the static format table.
    pub fn from_fourcc(fourcc: Fourcc) -> Result<&'static ChromaDescriptor, UnsupportedChroma> {
        CHROMA_TABLE
            .iter()
            .find(|c| c.fourcc == fourcc)
            .ok_or(UnsupportedChroma(fourcc))
    }

    /// Returns the coarsest (horizontal, vertical) subsampling divisors over
    /// all planes. All divisors in the table are powers of two, so the
    /// maximum is also the least common multiple.
    pub fn max_divisors(&self) -> (usize, usize) {
        let div_w = self.div_w.iter().copied().max().unwrap_or(1);
        let div_h = self.div_h.iter().copied().max().unwrap_or(1);
        (div_w, div_h)
    }
}

/// Display-oriented metadata carried along with the pixel data.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PictureProperties {
    /// Presentation timestamp, in whatever clock the pipeline uses.
    pub pts: Option<u64>,
    pub progressive: bool,
    pub top_field_first: bool,
}

#[derive(Debug)]
struct Plane {
    data: Vec<u8>,
    pitch: usize,
    lines: usize,
}

/// An owned planar frame buffer.
#[derive(Debug)]
pub struct Picture {
    chroma: &'static ChromaDescriptor,
    resolution: Resolution,
    planes: Vec<Plane>,
    pub properties: PictureProperties,
}

impl Picture {
    /// Allocates a zeroed picture of `resolution` in the format named by
    /// `fourcc`, with tight pitches.
    pub fn new(fourcc: Fourcc, resolution: Resolution) -> Result<Self, UnsupportedChroma> {
        let chroma = ChromaDescriptor::from_fourcc(fourcc)?;

        let planes = (0..MAX_PLANES)
            .map(|i| {
                let pitch = (resolution.width as usize).div_ceil(chroma.div_w[i]);
                let lines = (resolution.height as usize).div_ceil(chroma.div_h[i]);
                Plane {
                    data: vec![0u8; pitch * lines],
                    pitch,
                    lines,
                }
            })
            .collect();

        Ok(Self {
            chroma,
            resolution,
            planes,
            properties: PictureProperties::default(),
        })
    }

    pub fn fourcc(&self) -> Fourcc {
        self.chroma.fourcc
    }

    pub fn chroma(&self) -> &'static ChromaDescriptor {
        self.chroma
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn plane_data(&self, plane: usize) -> &[u8] {
        &self.planes[plane].data
    }

    pub fn plane_data_mut(&mut self, plane: usize) -> &mut [u8] {
        &mut self.planes[plane].data
    }

    /// Bytes per line of `plane`, including any padding.
    pub fn plane_pitch(&self, plane: usize) -> usize {
        self.planes[plane].pitch
    }

    pub fn plane_lines(&self, plane: usize) -> usize {
        self.planes[plane].lines
    }

    pub fn copy_properties_from(&mut self, src: &Picture) {
        self.properties = src.properties;
    }
}
