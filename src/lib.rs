// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Building blocks for tiled video walls and buffered stream input.
//!
//! This crate provides two independent leaf components for media pipelines:
//!
//! * [`splitter::WallSplitter`] splits one planar YUV picture into a grid of
//!   output tiles with black borders and gamma-corrected edge blending, so a
//!   wall of projectors or displays can show a single seamless image.
//! * [`prefetch::PrefetchStream`] wraps a pull-style byte source with a
//!   fixed-size ring buffer filled by a dedicated thread, decoupling the
//!   consumer's read/seek calls from upstream I/O latency.

pub mod picture;
pub mod prefetch;
pub mod splitter;

use std::fmt;
use std::str::FromStr;

/// A frame resolution in pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn get_area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl From<(u32, u32)> for Resolution {
    fn from(value: (u32, u32)) -> Self {
        Self {
            width: value.0,
            height: value.1,
        }
    }
}

/// A transparent wrapper over a FourCC code, i.e. a four byte ASCII pixel
/// format tag packed into a `u32`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Fourcc(pub u32);

impl From<u32> for Fourcc {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

impl From<&[u8; 4]> for Fourcc {
    fn from(n: &[u8; 4]) -> Self {
        Self(n[0] as u32 | (n[1] as u32) << 8 | (n[2] as u32) << 16 | (n[3] as u32) << 24)
    }
}

impl Fourcc {
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in self.to_bytes() {
            // Tags are plain ASCII; anything else gets escaped so log lines
            // stay readable.
            write!(f, "{}", char::from(b).escape_default())?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Fourcc({})", self)
    }
}

impl FromStr for Fourcc {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| "a FourCC tag must be exactly four ASCII bytes")?;
        Ok(Fourcc::from(&bytes))
    }
}
