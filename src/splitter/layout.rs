// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Static wall layout: partitioning the source frame into tiles and deciding
//! which edge of each tile gets a black border or a blend zone.
//!
//! The layout is computed once at open time from the grid geometry, the
//! half-overlap sizes and the active-cell selection, and is immutable
//! afterwards; the per-frame filter only reads it.

/// Maximum grid dimensions.
pub const COL_MAX: usize = 15;
pub const ROW_MAX: usize = 15;

/// Widths of a treatment applied to the four edges of a tile, in pixels of
/// the full-resolution plane.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EdgeWidths {
    pub left: usize,
    pub right: usize,
    pub top: usize,
    pub bottom: usize,
}

/// Edge treatment of one tile. On any given edge, `black` and `attenuate`
/// are mutually exclusive: an interior edge blends into its neighbour, an
/// exterior edge of a grid wider than two gets padded with solid black so
/// every output keeps the same dimensions.
#[derive(Copy, Clone, Debug, Default)]
pub struct TileFilter {
    pub black: EdgeWidths,
    pub attenuate: EdgeWidths,
}

/// One output tile of the wall.
#[derive(Copy, Clone, Debug, Default)]
pub struct Tile {
    pub active: bool,
    /// Index of this tile among the active outputs, in row-major scan order.
    pub output_index: usize,

    /// Output dimensions: black borders + expanded source rectangle.
    pub width: usize,
    pub height: usize,

    /// Source rectangle within the logical frame, already expanded by half
    /// the attenuation widths so adjacent tiles overlap by one blend zone.
    pub src_x: usize,
    pub src_y: usize,
    pub src_width: usize,
    pub src_height: usize,

    pub filter: TileFilter,
}

/// Partitions a `src_width` x `src_height` frame into a `cols` x `rows`
/// grid of tiles, returning the tiles in row-major order together with the
/// number of active outputs.
///
/// `half_w`/`half_h` are the half-overlap sizes, already clamped so that no
/// interior source rectangle can collapse, and aligned to the chroma
/// subsampling divisors. `active` selects cells by row-major index.
pub fn configure(
    cols: usize,
    rows: usize,
    src_width: usize,
    src_height: usize,
    half_w: usize,
    half_h: usize,
    attenuate: bool,
    active: &[bool],
) -> (Vec<Tile>, usize) {
    let mut tiles = vec![Tile::default(); cols * rows];
    let mut output_index = 0;

    let mut src_y = 0;
    for y in 0..rows {
        let row_first = y == 0;
        let row_last = y == rows - 1;

        // Even-sized cells, with the last row/column absorbing the division
        // remainder.
        let base_height = (src_height / rows) & !1;
        let win_height = if row_last {
            src_height - y * base_height
        } else {
            base_height
        };

        let mut src_x = 0;
        for x in 0..cols {
            let col_first = x == 0;
            let col_last = x == cols - 1;

            let base_width = (src_width / cols) & !1;
            let win_width = if col_last {
                src_width - x * base_width
            } else {
                base_width
            };

            let mut cfg = TileFilter::default();
            if attenuate {
                // With more than two columns a tile can have neighbours on
                // both sides; the outward-facing edges of the first and last
                // columns get black padding instead of a blend zone.
                if cols > 2 {
                    if col_first {
                        cfg.black.left = half_w;
                    }
                    if col_last {
                        cfg.black.right = half_w;
                    }
                }
                if rows > 2 {
                    if row_first {
                        cfg.black.top = half_h;
                    }
                    if row_last {
                        cfg.black.bottom = half_h;
                    }
                }
                if !col_first {
                    cfg.attenuate.left = 2 * half_w;
                }
                if !col_last {
                    cfg.attenuate.right = 2 * half_w;
                }
                if !row_first {
                    cfg.attenuate.top = 2 * half_h;
                }
                if !row_last {
                    cfg.attenuate.bottom = 2 * half_h;
                }
            }

            let tile = &mut tiles[y * cols + x];

            tile.src_x = src_x - cfg.attenuate.left / 2;
            tile.src_y = src_y - cfg.attenuate.top / 2;
            tile.src_width = win_width + cfg.attenuate.left / 2 + cfg.attenuate.right / 2;
            tile.src_height = win_height + cfg.attenuate.top / 2 + cfg.attenuate.bottom / 2;

            tile.filter = cfg;

            tile.width = cfg.black.left + tile.src_width + cfg.black.right;
            tile.height = cfg.black.top + tile.src_height + cfg.black.bottom;

            tile.active = active[y * cols + x] && tile.width > 0 && tile.height > 0;
            if tile.active {
                tile.output_index = output_index;
                output_index += 1;
            }

            src_x += win_width;
        }
        src_y += win_height;
    }

    (tiles, output_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_active() -> Vec<bool> {
        vec![true; COL_MAX * ROW_MAX]
    }

    #[test]
    fn zero_overlap_partitions_the_canvas() {
        for cols in 1..=5 {
            for rows in 1..=5 {
                let (tiles, count) =
                    configure(cols, rows, 1920, 1080, 0, 0, true, &all_active());
                assert_eq!(count, cols * rows);

                for y in 0..rows {
                    let row: Vec<&Tile> = (0..cols).map(|x| &tiles[y * cols + x]).collect();
                    let total: usize = row.iter().map(|t| t.src_width).sum();
                    assert_eq!(total, 1920, "row {} of {}x{}", y, cols, rows);

                    // Tiles tile the row contiguously with no borders.
                    let mut x = 0;
                    for t in row {
                        assert_eq!(t.src_x, x);
                        assert_eq!(t.width, t.src_width);
                        assert_eq!(t.filter.black, EdgeWidths::default());
                        assert_eq!(t.filter.attenuate, EdgeWidths::default());
                        x += t.src_width;
                    }
                }
                for x in 0..cols {
                    let total: usize = (0..rows).map(|y| tiles[y * cols + x].src_height).sum();
                    assert_eq!(total, 1080, "column {} of {}x{}", x, cols, rows);
                }
            }
        }
    }

    #[test]
    fn black_and_attenuate_are_exclusive_per_edge() {
        for (cols, rows) in [(1, 1), (2, 1), (2, 2), (3, 3), (4, 2), (15, 15)] {
            let (tiles, _) = configure(cols, rows, 1920, 1080, 8, 6, true, &all_active());
            for t in &tiles {
                assert!(t.filter.black.left == 0 || t.filter.attenuate.left == 0);
                assert!(t.filter.black.right == 0 || t.filter.attenuate.right == 0);
                assert!(t.filter.black.top == 0 || t.filter.attenuate.top == 0);
                assert!(t.filter.black.bottom == 0 || t.filter.attenuate.bottom == 0);
            }
        }
    }

    #[test]
    fn two_by_one_overlap_expands_inner_edges() {
        let (tiles, count) = configure(2, 1, 1920, 1080, 10, 0, true, &all_active());
        assert_eq!(count, 2);

        let left = &tiles[0];
        let right = &tiles[1];

        // Only two columns: no outer black padding, one blend zone each.
        assert_eq!(left.filter.black, EdgeWidths::default());
        assert_eq!(left.filter.attenuate.right, 20);
        assert_eq!(left.filter.attenuate.left, 0);
        assert_eq!(right.filter.attenuate.left, 20);

        assert_eq!(left.src_x, 0);
        assert_eq!(left.src_width, 960 + 10);
        assert_eq!(right.src_x, 960 - 10);
        assert_eq!(right.src_width, 960 + 10);

        // The two source rectangles overlap by exactly one blend zone.
        assert_eq!(left.src_x + left.src_width - right.src_x, 20);
    }

    #[test]
    fn three_columns_pad_outer_edges_black() {
        let (tiles, _) = configure(3, 1, 1920, 1080, 10, 0, true, &all_active());
        assert_eq!(tiles[0].filter.black.left, 10);
        assert_eq!(tiles[0].filter.black.right, 0);
        assert_eq!(tiles[1].filter.black, EdgeWidths::default());
        assert_eq!(tiles[1].filter.attenuate.left, 20);
        assert_eq!(tiles[1].filter.attenuate.right, 20);
        assert_eq!(tiles[2].filter.black.right, 10);

        // Black padding keeps all outputs the same width.
        assert_eq!(tiles[0].width, tiles[1].width);
        assert_eq!(tiles[1].width, tiles[2].width);
    }

    #[test]
    fn attenuate_disabled_means_hard_cuts() {
        let (tiles, _) = configure(3, 3, 1920, 1080, 10, 10, false, &all_active());
        for t in &tiles {
            assert_eq!(t.filter.black, EdgeWidths::default());
            assert_eq!(t.filter.attenuate, EdgeWidths::default());
            assert_eq!(t.width, t.src_width);
        }
    }

    #[test]
    fn inactive_cells_are_skipped_in_output_order() {
        let mut active = vec![false; COL_MAX * ROW_MAX];
        active[0] = true; // (0, 0)
        active[3] = true; // (1, 1) in a 2x2 grid
        let (tiles, count) = configure(2, 2, 640, 480, 0, 0, true, &active);
        assert_eq!(count, 2);
        assert!(tiles[0].active);
        assert_eq!(tiles[0].output_index, 0);
        assert!(!tiles[1].active);
        assert!(!tiles[2].active);
        assert!(tiles[3].active);
        assert_eq!(tiles[3].output_index, 1);
    }

    #[test]
    fn last_cells_absorb_the_remainder() {
        let (tiles, _) = configure(3, 1, 100, 50, 0, 0, true, &all_active());
        // 100 / 3 = 33, forced even to 32; the last column takes the rest.
        assert_eq!(tiles[0].src_width, 32);
        assert_eq!(tiles[1].src_width, 32);
        assert_eq!(tiles[2].src_width, 36);
    }
}
