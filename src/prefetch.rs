// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Read-ahead stream filter.
//!
//! [`PrefetchStream`] wraps a pull-style byte source with a fixed-size ring
//! buffer filled by a dedicated thread, so the consumer's `read`/`seek`
//! calls are decoupled from upstream I/O latency. Seeks are pure state
//! updates serviced asynchronously by the fetch thread, which keeps a
//! blocking upstream seek off the calling thread.

pub mod ring;
pub mod source;

use std::io;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::thread;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::prefetch::ring::RingBuffer;
use crate::prefetch::source::Interrupt;
use crate::prefetch::source::PullSource;

#[derive(Debug, Error)]
pub enum PrefetchError {
    #[error("source is unsuitable for prefetching: {0}")]
    UnsuitableSource(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to spawn the fetch thread: {0}")]
    Thread(#[from] io::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Ring buffer capacity in KiB.
    pub buffer_size_kib: usize,
    /// Upstream read chunk size in bytes; also bounds how many cached bytes
    /// a full ring evicts at once. Capped at the buffer capacity.
    pub read_size: usize,
    /// A consumer position this many bytes past the cached window is
    /// reached by seeking upstream rather than reading through the gap.
    pub seek_threshold: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            buffer_size_kib: 16384,
            read_size: 16384,
            seek_threshold: 16384,
        }
    }
}

impl PrefetchConfig {
    fn validate(&self) -> Result<(), PrefetchError> {
        if !(4..=1_048_576).contains(&self.buffer_size_kib) {
            return Err(PrefetchError::InvalidConfig(format!(
                "buffer-size must be in 4..=1048576 KiB, got {}",
                self.buffer_size_kib
            )));
        }
        if !(1..=1usize << 29).contains(&self.read_size) {
            return Err(PrefetchError::InvalidConfig(format!(
                "read-size must be in 1..=2^29 bytes, got {}",
                self.read_size
            )));
        }
        if self.seek_threshold > 1u64 << 60 {
            return Err(PrefetchError::InvalidConfig(format!(
                "seek-threshold must be at most 2^60 bytes, got {}",
                self.seek_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct State {
    ring: RingBuffer,
    /// Consumer position in the stream; also the pending seek target when
    /// outside the cached window.
    stream_offset: u64,
    paused: bool,
    eof: bool,
    /// Sticky until the next seek.
    error: bool,
    killed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    /// Signaled when bytes, EOF or an error arrive.
    wait_data: Condvar,
    /// Signaled when room is freed or the pause/seek/kill state changes.
    wait_space: Condvar,
}

/// A byte stream cached ahead by a background fetch thread.
#[derive(Debug)]
pub struct PrefetchStream {
    shared: Arc<Shared>,
    interrupt: Interrupt,
    worker: Option<thread::JoinHandle<()>>,
    // Capabilities sampled at open; the source belongs to the fetch thread
    // afterwards.
    can_seek: bool,
    can_pause: bool,
    size: Option<u64>,
    content_type: Option<String>,
}

/// Raises the stream's interrupt token and wakes anything blocked on it.
/// Cloneable into whatever context supervises the pipeline.
#[derive(Clone)]
pub struct InterruptHandle {
    shared: Arc<Shared>,
    interrupt: Interrupt,
}

impl InterruptHandle {
    pub fn raise(&self) {
        self.interrupt.raise();
        self.shared.wait_data.notify_all();
        self.shared.wait_space.notify_all();
    }
}

impl PrefetchStream {
    /// Starts caching `source`.
    ///
    /// Declines sources where read-ahead is useless or harmful: fast-seek
    /// sources pay nothing for seeking, and filtered broadcast sources can
    /// change content underneath a cache.
    pub fn open<S: PullSource + 'static>(
        source: S,
        config: &PrefetchConfig,
    ) -> Result<Self, PrefetchError> {
        config.validate()?;
        if source.can_fast_seek() {
            return Err(PrefetchError::UnsuitableSource(
                "fast-seekable source gains nothing from read-ahead",
            ));
        }
        if source.is_pid_filtered() {
            return Err(PrefetchError::UnsuitableSource(
                "filtered source can change underneath a cache",
            ));
        }

        let capacity = config.buffer_size_kib * 1024;
        let read_size = config.read_size.min(capacity);
        log::debug!(
            "using a {} KiB buffer, {} B reads, {} B seek threshold",
            config.buffer_size_kib,
            read_size,
            config.seek_threshold
        );

        let can_seek = source.can_seek();
        let can_pause = source.can_pause();
        let size = source.size();
        let content_type = source.content_type();

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                ring: RingBuffer::with_capacity(capacity),
                stream_offset: 0,
                paused: false,
                eof: false,
                error: false,
                killed: false,
            }),
            wait_data: Condvar::new(),
            wait_space: Condvar::new(),
        });
        let interrupt = Interrupt::new();

        let worker = {
            let shared = Arc::clone(&shared);
            let interrupt = interrupt.clone();
            let seek_threshold = config.seek_threshold;
            thread::Builder::new()
                .name("prefetch".to_string())
                .spawn(move || fetch_loop(source, shared, interrupt, read_size, seek_threshold))?
        };

        Ok(Self {
            shared,
            interrupt,
            worker: Some(worker),
            can_seek,
            can_pause,
            size,
            content_type,
        })
    }

    /// Copies cached bytes at the current position into `buf`, blocking
    /// until some are available. Returns 0 at end of stream, after an
    /// upstream error (sticky until the next [`PrefetchStream::seek`]), or
    /// when interrupted. Short reads are normal.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }

        let mut state = self.shared.state.lock().unwrap();

        if state.paused {
            // A reader that forgot to unpause would deadlock against the
            // paused fetch thread.
            log::warn!("reading while paused, unpausing");
            state.paused = false;
            self.shared.wait_space.notify_all();
        }

        loop {
            if state.error || self.interrupt.is_raised() {
                return 0;
            }

            let offset = state.stream_offset;
            if offset >= state.ring.start_offset() && offset < state.ring.end_offset() {
                let count = state.ring.read_at(offset, buf);
                state.stream_offset += count as u64;
                self.shared.wait_space.notify_all();
                return count;
            }

            // Outside the window and not before it (that would be a pending
            // backward seek): end of stream.
            if state.eof && offset >= state.ring.start_offset() {
                return 0;
            }

            state = self.shared.wait_data.wait(state).unwrap();
        }
    }

    /// Repositions the stream. This is a pure state update; the fetch
    /// thread performs any upstream seek asynchronously. Clears a sticky
    /// error.
    pub fn seek(&mut self, offset: u64) {
        let mut state = self.shared.state.lock().unwrap();
        state.stream_offset = offset;
        state.error = false;
        self.shared.wait_space.notify_all();
    }

    /// Current consumer position.
    pub fn tell(&self) -> u64 {
        self.shared.state.lock().unwrap().stream_offset
    }

    /// Pauses or resumes the fetch thread; the toggle is propagated
    /// upstream asynchronously when the source supports pausing.
    pub fn set_paused(&mut self, paused: bool) {
        let mut state = self.shared.state.lock().unwrap();
        state.paused = paused;
        self.shared.wait_space.notify_all();
    }

    /// True after an upstream read or seek failure, until the next seek.
    pub fn had_error(&self) -> bool {
        self.shared.state.lock().unwrap().error
    }

    pub fn can_seek(&self) -> bool {
        self.can_seek
    }

    pub fn can_pause(&self) -> bool {
        self.can_pause
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            shared: Arc::clone(&self.shared),
            interrupt: self.interrupt.clone(),
        }
    }
}

impl Drop for PrefetchStream {
    fn drop(&mut self) {
        self.shared.state.lock().unwrap().killed = true;
        self.interrupt.raise();
        self.shared.wait_space.notify_all();
        self.shared.wait_data.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// The fetch thread. Owns the source; the only mutator of the ring.
fn fetch_loop<S: PullSource>(
    mut source: S,
    shared: Arc<Shared>,
    interrupt: Interrupt,
    read_size: usize,
    seek_threshold: u64,
) {
    let can_seek = source.can_seek();
    let mut scratch = vec![0u8; read_size];
    let mut paused = false;

    let mut state = shared.state.lock().unwrap();
    loop {
        if state.killed {
            break;
        }
        if interrupt.is_raised() {
            state = shared.wait_space.wait(state).unwrap();
            continue;
        }

        if state.paused != paused {
            let want = state.paused;
            drop(state);
            if let Err(err) = source.set_paused(want) {
                log::warn!("pause propagation failed: {}", err);
            }
            paused = want;
            state = shared.state.lock().unwrap();
            continue;
        }

        if paused || state.error {
            state = shared.wait_space.wait(state).unwrap();
            continue;
        }

        if state.stream_offset < state.ring.start_offset() {
            // Backward seek: the consumer wants bytes we no longer hold.
            let target = state.stream_offset;
            drop(state);
            let res = source.seek(target);
            state = shared.state.lock().unwrap();
            match res {
                Ok(()) => {
                    state.ring.reset_at(target);
                    state.eof = false;
                }
                Err(err) => {
                    log::warn!("cannot seek back to {}: {}", target, err);
                    state.error = true;
                    shared.wait_data.notify_all();
                }
            }
            continue;
        }

        if state.eof {
            state = shared.wait_space.wait(state).unwrap();
            continue;
        }

        // Forward skip: when the consumer is far enough past the window,
        // dropping the cache and seeking beats reading through the gap.
        if can_seek && state.stream_offset >= state.ring.end_offset() + seek_threshold {
            let target = state.stream_offset;
            drop(state);
            let res = source.seek(target);
            state = shared.state.lock().unwrap();
            match res {
                Ok(()) => {
                    state.ring.reset_at(target);
                    state.eof = false;
                }
                Err(err) => {
                    // A failed skip leaves the upstream position unknown,
                    // so falling back to reading through is not safe.
                    log::warn!("cannot skip forward to {}: {}", target, err);
                    state.error = true;
                    shared.wait_data.notify_all();
                }
            }
            continue;
        }

        let mut free = state.ring.free();
        if free == 0 {
            let consumed =
                (state.stream_offset.min(state.ring.end_offset()) - state.ring.start_offset()) as usize;
            if consumed == 0 {
                state = shared.wait_space.wait(state).unwrap();
                continue;
            }
            state.ring.evict(consumed.min(read_size));
            free = state.ring.free();
        }

        let want = free.min(read_size);
        drop(state);
        let res = source.read(&mut scratch[..want], &interrupt);
        state = shared.state.lock().unwrap();
        match res {
            Ok(0) => {
                state.eof = true;
                shared.wait_data.notify_all();
            }
            Ok(count) => {
                // Only this thread mutates the ring, so the free space
                // measured before the unlocked read still holds.
                state.ring.append(&scratch[..count]);
                shared.wait_data.notify_all();
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                log::warn!("upstream read failed: {}", err);
                state.error = true;
                shared.wait_data.notify_all();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefetch::source::IoSource;
    use std::io::Cursor;
    use std::time::Duration;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 + 7) as u8).collect()
    }

    fn small_config() -> PrefetchConfig {
        PrefetchConfig {
            buffer_size_kib: 4,
            read_size: 512,
            seek_threshold: 16384,
        }
    }

    fn read_full(stream: &mut PrefetchStream, buf: &mut [u8]) -> usize {
        let mut total = 0;
        while total < buf.len() {
            let count = stream.read(&mut buf[total..]);
            if count == 0 {
                break;
            }
            total += count;
        }
        total
    }

    /// Serves `data` until `fail_at`, errors exactly once there, then
    /// serves the rest normally.
    struct FailingSource {
        data: Vec<u8>,
        pos: u64,
        fail_at: u64,
        failed: bool,
    }

    impl PullSource for FailingSource {
        fn read(&mut self, buf: &mut [u8], _interrupt: &Interrupt) -> io::Result<usize> {
            if self.pos >= self.fail_at && !self.failed {
                self.failed = true;
                return Err(io::Error::new(io::ErrorKind::Other, "injected failure"));
            }
            let bound = if self.failed {
                self.data.len() as u64
            } else {
                self.fail_at
            };
            let end = (self.pos + buf.len() as u64)
                .min(self.data.len() as u64)
                .min(bound);
            let count = (end - self.pos) as usize;
            buf[..count].copy_from_slice(&self.data[self.pos as usize..end as usize]);
            self.pos = end;
            Ok(count)
        }

        fn seek(&mut self, offset: u64) -> io::Result<()> {
            self.pos = offset;
            Ok(())
        }

        fn can_seek(&self) -> bool {
            true
        }

        fn size(&self) -> Option<u64> {
            Some(self.data.len() as u64)
        }
    }

    /// Blocks every read until the interrupt is raised.
    struct BlockingSource;

    impl PullSource for BlockingSource {
        fn read(&mut self, _buf: &mut [u8], interrupt: &Interrupt) -> io::Result<usize> {
            while !interrupt.is_raised() {
                thread::sleep(Duration::from_millis(1));
            }
            Err(io::ErrorKind::Interrupted.into())
        }

        fn seek(&mut self, _offset: u64) -> io::Result<()> {
            Ok(())
        }

        fn can_seek(&self) -> bool {
            false
        }

        fn size(&self) -> Option<u64> {
            None
        }
    }

    struct UnsuitableSource {
        fast_seek: bool,
        pid_filtered: bool,
    }

    impl PullSource for UnsuitableSource {
        fn read(&mut self, _buf: &mut [u8], _interrupt: &Interrupt) -> io::Result<usize> {
            Ok(0)
        }

        fn seek(&mut self, _offset: u64) -> io::Result<()> {
            Ok(())
        }

        fn can_seek(&self) -> bool {
            true
        }

        fn can_fast_seek(&self) -> bool {
            self.fast_seek
        }

        fn is_pid_filtered(&self) -> bool {
            self.pid_filtered
        }

        fn size(&self) -> Option<u64> {
            None
        }
    }

    #[test]
    fn round_trips_data_larger_than_the_buffer() {
        let data = pattern(100_000);
        let source = IoSource::new(Cursor::new(data.clone())).unwrap();
        let mut stream = PrefetchStream::open(source, &small_config()).unwrap();

        assert_eq!(stream.size(), Some(100_000));
        assert!(stream.can_seek());

        let mut received = Vec::new();
        let mut buf = [0u8; 997];
        loop {
            let count = stream.read(&mut buf);
            if count == 0 {
                break;
            }
            received.extend_from_slice(&buf[..count]);
        }
        assert_eq!(received, data);

        // EOF is stable.
        assert_eq!(stream.read(&mut buf), 0);
        assert!(!stream.had_error());
    }

    #[test]
    fn seeks_forward_and_backward() {
        let data = pattern(100_000);
        let source = IoSource::new(Cursor::new(data.clone())).unwrap();
        let mut stream = PrefetchStream::open(source, &small_config()).unwrap();

        let mut buf = [0u8; 100];
        assert_eq!(read_full(&mut stream, &mut buf), 100);
        assert_eq!(&buf[..], &data[..100]);
        assert_eq!(stream.tell(), 100);

        // Far past the window: serviced by an upstream forward seek.
        stream.seek(60_000);
        assert_eq!(read_full(&mut stream, &mut buf), 100);
        assert_eq!(&buf[..], &data[60_000..60_100]);
        assert_eq!(stream.tell(), 60_100);

        // Before the window: backward upstream seek.
        stream.seek(5);
        assert_eq!(read_full(&mut stream, &mut buf), 100);
        assert_eq!(&buf[..], &data[5..105]);
    }

    #[test]
    fn upstream_errors_are_sticky_until_seek() {
        let data = pattern(10_000);
        let source = FailingSource {
            data: data.clone(),
            pos: 0,
            fail_at: 2_000,
            failed: false,
        };
        let mut stream = PrefetchStream::open(source, &small_config()).unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            let count = stream.read(&mut buf);
            if count == 0 {
                break;
            }
            received.extend_from_slice(&buf[..count]);
        }
        // Read returned 0 without blocking forever, the error is visible,
        // and whatever did arrive is an exact prefix.
        assert!(stream.had_error());
        assert!(received.len() <= 2_000);
        assert_eq!(received, data[..received.len()]);

        // A seek clears the error and reading works again.
        stream.seek(0);
        assert!(!stream.had_error());
        let count = stream.read(&mut buf);
        assert!(count > 0);
        assert_eq!(&buf[..count], &data[..count]);
    }

    #[test]
    fn interrupt_unblocks_a_pending_read() {
        let mut stream = PrefetchStream::open(BlockingSource, &small_config()).unwrap();
        let handle = stream.interrupt_handle();

        let raiser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.raise();
        });

        // No data will ever arrive; only the interrupt can end this read.
        let mut buf = [0u8; 16];
        assert_eq!(stream.read(&mut buf), 0);
        raiser.join().unwrap();
    }

    #[test]
    fn reading_while_paused_unpauses() {
        let data = pattern(4_096);
        let source = IoSource::new(Cursor::new(data.clone())).unwrap();
        let mut stream = PrefetchStream::open(source, &small_config()).unwrap();

        stream.set_paused(true);
        let mut buf = [0u8; 64];
        assert_eq!(read_full(&mut stream, &mut buf), 64);
        assert_eq!(&buf[..], &data[..64]);
    }

    #[test]
    fn unsuitable_sources_are_refused() {
        let err = PrefetchStream::open(
            UnsuitableSource {
                fast_seek: true,
                pid_filtered: false,
            },
            &small_config(),
        )
        .unwrap_err();
        assert!(matches!(err, PrefetchError::UnsuitableSource(_)));

        let err = PrefetchStream::open(
            UnsuitableSource {
                fast_seek: false,
                pid_filtered: true,
            },
            &small_config(),
        )
        .unwrap_err();
        assert!(matches!(err, PrefetchError::UnsuitableSource(_)));
    }

    #[test]
    fn config_ranges_are_enforced() {
        let source = || IoSource::new(Cursor::new(Vec::new())).unwrap();

        let mut config = PrefetchConfig::default();
        config.buffer_size_kib = 0;
        assert!(matches!(
            PrefetchStream::open(source(), &config).unwrap_err(),
            PrefetchError::InvalidConfig(_)
        ));

        let mut config = PrefetchConfig::default();
        config.read_size = 0;
        assert!(matches!(
            PrefetchStream::open(source(), &config).unwrap_err(),
            PrefetchError::InvalidConfig(_)
        ));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = PrefetchConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: PrefetchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.buffer_size_kib, 16384);

        let partial: PrefetchConfig = serde_json::from_str(r#"{"read_size": 1024}"#).unwrap();
        assert_eq!(partial.read_size, 1024);
        assert_eq!(partial.seek_threshold, 16384);
    }

    #[test]
    fn capabilities_are_sampled_at_open() {
        let source = IoSource::new(Cursor::new(pattern(128)))
            .unwrap()
            .with_content_type("video/mp2t");
        let stream = PrefetchStream::open(source, &small_config()).unwrap();
        assert!(stream.can_seek());
        assert!(!stream.can_pause());
        assert_eq!(stream.size(), Some(128));
        assert_eq!(stream.content_type(), Some("video/mp2t"));
        assert_eq!(stream.tell(), 0);
    }
}
