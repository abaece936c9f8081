// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Display enumeration seam for grid auto-detection.
//!
//! Counting monitors is a platform concern (Win32 system metrics, X RandR,
//! a compositor protocol, ...), so the splitter only consumes the result
//! through [`DisplayProbe`]. The crate ships the grid arithmetic and a null
//! probe; callers plug in a platform implementation when they have one.

/// What a platform probe learned about the attached displays.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DisplayLayout {
    /// Number of connected monitors.
    pub monitors: usize,
    /// A `(cols, rows)` arrangement if the platform can tell (e.g. from the
    /// virtual screen dimensions); must multiply to `monitors` to be used.
    pub grid_hint: Option<(usize, usize)>,
}

/// Strategy interface for platform display enumeration.
pub trait DisplayProbe {
    fn probe(&self) -> Option<DisplayLayout>;
}

/// Probe for headless use: never detects anything, so auto-detection falls
/// back to the 2x1 default.
pub struct NullDisplayProbe;

impl DisplayProbe for NullDisplayProbe {
    fn probe(&self) -> Option<DisplayLayout> {
        None
    }
}

/// Arranges `monitors` into the `(cols, rows)` grid closest to a square,
/// with `cols >= rows`.
pub fn grid_for_monitors(monitors: usize) -> (usize, usize) {
    let mut cols = monitors;
    let mut rows = 1;
    let mut w = 1;
    while monitors / w >= w {
        if monitors % w == 0 {
            rows = w;
            cols = monitors / w;
        }
        w += 1;
    }
    (cols, rows)
}
