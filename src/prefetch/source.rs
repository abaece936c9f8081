// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Upstream byte-source abstraction for the prefetcher.

use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Shared cancellation token. Sources should poll it in blocking reads and
/// bail out with [`io::ErrorKind::Interrupted`] once it is raised; a raised
/// token never resets.
#[derive(Clone, Debug, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A pull-style byte stream the prefetcher can fetch from.
///
/// This is the seam towards whatever access layer provides the actual bytes
/// (a file, a network protocol, ...). The prefetch thread owns the source
/// exclusively after open, so implementations need `Send` but no internal
/// locking.
pub trait PullSource: Send {
    /// Reads into `buf`, returning the number of bytes read. `Ok(0)` means
    /// end of stream. Blocking implementations should return
    /// [`io::ErrorKind::Interrupted`] when `interrupt` is raised.
    fn read(&mut self, buf: &mut [u8], interrupt: &Interrupt) -> io::Result<usize>;

    /// Repositions the stream to the absolute byte `offset`.
    fn seek(&mut self, offset: u64) -> io::Result<()>;

    fn can_seek(&self) -> bool;

    /// True when seeking is cheap enough that caching ahead buys nothing
    /// (e.g. a local file).
    fn can_fast_seek(&self) -> bool {
        false
    }

    /// True when the byte stream is a hardware-side filtered view whose
    /// content can change underneath a cache (e.g. a broadcast tuner).
    fn is_pid_filtered(&self) -> bool {
        false
    }

    fn can_pause(&self) -> bool {
        false
    }

    /// Propagates a pause toggle upstream. Only called when `can_pause` is
    /// true.
    fn set_paused(&mut self, _paused: bool) -> io::Result<()> {
        Ok(())
    }

    /// Total stream size in bytes, when known.
    fn size(&self) -> Option<u64>;

    fn content_type(&self) -> Option<String> {
        None
    }
}

/// Adapter exposing any `Read + Seek` type as a seekable, slow-seek
/// [`PullSource`].
pub struct IoSource<T> {
    inner: T,
    size: Option<u64>,
    content_type: Option<String>,
}

impl<T: Read + Seek> IoSource<T> {
    /// Wraps `inner`, measuring its size with a seek to the end.
    pub fn new(mut inner: T) -> io::Result<Self> {
        let size = inner.seek(SeekFrom::End(0))?;
        inner.rewind()?;
        Ok(Self {
            inner,
            size: Some(size),
            content_type: None,
        })
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }
}

impl<T: Read + Seek + Send> PullSource for IoSource<T> {
    fn read(&mut self, buf: &mut [u8], interrupt: &Interrupt) -> io::Result<usize> {
        if interrupt.is_raised() {
            return Err(io::ErrorKind::Interrupted.into());
        }
        self.inner.read(buf)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset)).map(|_| ())
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn content_type(&self) -> Option<String> {
        self.content_type.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn io_source_measures_size_and_rewinds() {
        let mut source = IoSource::new(Cursor::new(vec![1u8, 2, 3, 4, 5])).unwrap();
        assert_eq!(source.size(), Some(5));
        assert!(source.can_seek());
        assert!(!source.can_fast_seek());

        let mut buf = [0u8; 3];
        assert_eq!(source.read(&mut buf, &Interrupt::new()).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);

        source.seek(1).unwrap();
        assert_eq!(source.read(&mut buf, &Interrupt::new()).unwrap(), 3);
        assert_eq!(buf, [2, 3, 4]);
    }

    #[test]
    fn raised_interrupt_aborts_reads() {
        let mut source = IoSource::new(Cursor::new(vec![0u8; 16])).unwrap();
        let interrupt = Interrupt::new();
        interrupt.raise();
        let err = source.read(&mut [0u8; 4], &interrupt).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    }

    #[test]
    fn content_type_is_reported() {
        let source = IoSource::new(Cursor::new(Vec::new()))
            .unwrap()
            .with_content_type("video/mp2t");
        assert_eq!(source.content_type().as_deref(), Some("video/mp2t"));
    }
}
