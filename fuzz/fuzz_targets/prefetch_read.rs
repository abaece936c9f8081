#![no_main]

use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use wallkit::prefetch::source::IoSource;
use wallkit::prefetch::PrefetchConfig;
use wallkit::prefetch::PrefetchStream;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let config = PrefetchConfig {
        buffer_size_kib: 4,
        read_size: (data[0] as usize % 512) + 1,
        seek_threshold: data[1] as u64 * 16,
    };
    let chunk = (data[2] as usize % 64) + 1;
    let seek_to = data[3] as u64 % (data.len() as u64 + 1);

    let payload = data.to_vec();
    let source = IoSource::new(Cursor::new(payload.clone())).unwrap();
    let mut stream = match PrefetchStream::open(source, &config) {
        Ok(stream) => stream,
        Err(_) => return,
    };

    let mut received = Vec::new();
    let mut buf = vec![0u8; chunk];
    loop {
        let count = stream.read(&mut buf);
        if count == 0 {
            break;
        }
        received.extend_from_slice(&buf[..count]);
    }
    assert_eq!(received, payload);

    stream.seek(seek_to);
    let count = stream.read(&mut buf);
    let end = (seek_to as usize + count).min(payload.len());
    assert_eq!(&received[seek_to as usize..end], &payload[seek_to as usize..end]);
});
