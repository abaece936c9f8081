// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Fixed-capacity byte ring indexed by absolute stream offsets.
//!
//! The ring holds a sliding window `[start_offset, start_offset + len)` of
//! the upstream byte stream. A byte at absolute offset `o` always lives at
//! physical index `o % capacity`, so appending, evicting and resetting all
//! preserve the mapping without ever moving data around.

#[derive(Debug)]
pub struct RingBuffer {
    data: Box<[u8]>,
    start_offset: u64,
    len: usize,
}

impl RingBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            start_offset: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Absolute stream offset of the first valid byte.
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Absolute stream offset one past the last valid byte.
    pub fn end_offset(&self) -> u64 {
        self.start_offset + self.len as u64
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Empties the ring and moves the window to `offset`.
    pub fn reset_at(&mut self, offset: u64) {
        self.start_offset = offset;
        self.len = 0;
    }

    /// Discards the `count` oldest bytes.
    pub fn evict(&mut self, count: usize) {
        debug_assert!(count <= self.len);
        self.start_offset += count as u64;
        self.len -= count;
    }

    /// Appends `src` at the end of the window. `src` must fit in the free
    /// space.
    pub fn append(&mut self, src: &[u8]) {
        debug_assert!(src.len() <= self.free());

        let capacity = self.capacity();
        let pos = (self.end_offset() % capacity as u64) as usize;
        let head = src.len().min(capacity - pos);
        self.data[pos..pos + head].copy_from_slice(&src[..head]);
        self.data[..src.len() - head].copy_from_slice(&src[head..]);
        self.len += src.len();
    }

    /// Copies valid bytes starting at absolute `offset` into `dst`, without
    /// crossing the physical wrap point, and returns how many were copied.
    /// `offset` must be inside the window.
    pub fn read_at(&self, offset: u64, dst: &mut [u8]) -> usize {
        debug_assert!(offset >= self.start_offset && offset <= self.end_offset());

        let capacity = self.capacity();
        let pos = (offset % capacity as u64) as usize;
        let available = (self.end_offset() - offset) as usize;
        let count = dst.len().min(available).min(capacity - pos);
        dst[..count].copy_from_slice(&self.data[pos..pos + count]);
        count
    }
}
