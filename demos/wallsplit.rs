// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Splits one raw I420 frame into wall tiles and writes each tile to a
//! `tile_<n>.yuv` file in the current directory.

use anyhow::ensure;
use anyhow::Context;
use wallkit::picture::Picture;
use wallkit::splitter::display::NullDisplayProbe;
use wallkit::splitter::SplitterConfig;
use wallkit::splitter::WallSplitter;
use wallkit::Fourcc;
use wallkit::Resolution;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    ensure!(
        args.len() >= 4,
        "usage: wallsplit <frame.yuv> <width> <height> [cols] [rows]"
    );
    let width: u32 = args[2].parse().context("invalid width")?;
    let height: u32 = args[3].parse().context("invalid height")?;
    let cols: i32 = args.get(4).map(|s| s.parse()).transpose()?.unwrap_or(2);
    let rows: i32 = args.get(5).map(|s| s.parse()).transpose()?.unwrap_or(1);

    let fourcc = Fourcc::from(b"I420");
    let resolution = Resolution::from((width, height));
    let data = std::fs::read(&args[1]).with_context(|| format!("reading {}", args[1]))?;

    let mut src = Picture::new(fourcc, resolution)?;
    let mut offset = 0;
    for plane in 0..src.num_planes() {
        let len = src.plane_data(plane).len();
        ensure!(offset + len <= data.len(), "frame file too short");
        src.plane_data_mut(plane)
            .copy_from_slice(&data[offset..offset + len]);
        offset += len;
    }

    let config = SplitterConfig {
        cols,
        rows,
        ..SplitterConfig::default()
    };
    let splitter = WallSplitter::new(&config, fourcc, resolution, &NullDisplayProbe)?;

    let outputs = splitter.filter(src, |formats| {
        formats
            .iter()
            .map(|f| Picture::new(f.fourcc, f.resolution).ok())
            .collect()
    })?;

    for (index, tile) in outputs.iter().enumerate() {
        let name = format!("tile_{}.yuv", index);
        let mut bytes = Vec::new();
        for plane in 0..tile.num_planes() {
            bytes.extend_from_slice(tile.plane_data(plane));
        }
        std::fs::write(&name, &bytes).with_context(|| format!("writing {}", name))?;
        log::info!(
            "wrote {} ({}x{})",
            name,
            tile.resolution().width,
            tile.resolution().height
        );
    }

    Ok(())
}
