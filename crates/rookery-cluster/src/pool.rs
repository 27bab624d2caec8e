//! Reusable serialization buffers for outbound stanza bodies.

use std::sync::Mutex;

const DEFAULT_MAX_RETAINED: usize = 32;
const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// Mutex-guarded stack of byte buffers.
///
/// Acquired buffers must be returned on every exit path so their capacity can
/// be reused by later serializations.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    max_retained: usize,
    buffer_capacity: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETAINED, DEFAULT_BUFFER_CAPACITY)
    }
}

impl BufferPool {
    pub fn new(max_retained: usize, buffer_capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
            max_retained,
            buffer_capacity,
        }
    }

    /// Take a cleared buffer from the pool, or allocate a fresh one.
    pub fn get(&self) -> Vec<u8> {
        self.buffers
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.buffer_capacity))
    }

    /// Return a buffer to the pool. Buffers beyond the retention cap are
    /// dropped.
    pub fn put(&self, mut buffer: Vec<u8>) {
        buffer.clear();
        let mut buffers = self.buffers.lock().unwrap();
        if buffers.len() < self.max_retained {
            buffers.push(buffer);
        }
    }
}
