#![no_main]

use libfuzzer_sys::fuzz_target;
use wallkit::picture::Picture;
use wallkit::splitter::display::NullDisplayProbe;
use wallkit::splitter::GammaConfig;
use wallkit::splitter::SplitterConfig;
use wallkit::splitter::WallSplitter;
use wallkit::Fourcc;
use wallkit::Resolution;

const FOURCCS: [&[u8; 4]; 10] = [
    b"I410", b"I411", b"YV12", b"I420", b"J420", b"I422", b"J422", b"I440", b"J440", b"I444",
];

fuzz_target!(|data: &[u8]| {
    if data.len() < 12 {
        return;
    }

    let config = SplitterConfig {
        cols: (data[0] % 17) as i32 - 1,
        rows: (data[1] % 17) as i32 - 1,
        blend_length: (data[2] % 101) as u32,
        blend_height: (data[3] % 101) as u32,
        attenuate: data[4] & 1 != 0,
        blend_begin: (data[5] % 101) as u32,
        blend_middle: (data[6] % 101) as u32,
        blend_end: (data[7] % 101) as u32,
        blend_middle_pos: (data[8] % 99) as u32 + 1,
        gamma: [GammaConfig {
            gamma: data[9] as f32 * 5.0 / 255.0,
            ..GammaConfig::default()
        }; 3],
        active: None,
    };

    let fourcc = Fourcc::from(FOURCCS[data[10] as usize % FOURCCS.len()]);
    let resolution = Resolution::from((
        (data[11] as u32 % 128) + 16,
        (data[data.len() - 1] as u32 % 128) + 16,
    ));

    let splitter = match WallSplitter::new(&config, fourcc, resolution, &NullDisplayProbe) {
        Ok(splitter) => splitter,
        Err(_) => return,
    };

    let mut src = Picture::new(fourcc, resolution).unwrap();
    for plane in 0..src.num_planes() {
        let bytes = src.plane_data_mut(plane);
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = data[i % data.len()];
        }
    }

    let outputs = splitter
        .filter(src, |formats| {
            formats
                .iter()
                .map(|f| Picture::new(f.fourcc, f.resolution).ok())
                .collect()
        })
        .unwrap();

    for index in 0..outputs.len() {
        let _ = splitter.map_mouse(index, data[0] as u32, data[1] as u32);
    }
});
