//! Reusable output buffers for rendering.
//!
//! Buffers are handed out as [`PooledBuffer`] guards that go back to the pool
//! on drop, so every exit path (including errors and panics in a handler)
//! returns them.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

/// Default number of idle buffers kept.
pub const DEFAULT_MAX_RETAINED: usize = 64;

/// Buffers that grew beyond this are dropped instead of retained.
pub const DEFAULT_MAX_CAPACITY: usize = 1024 * 1024;

/// Capacity of a freshly allocated buffer.
const INITIAL_CAPACITY: usize = 8 * 1024;

#[derive(Debug)]
pub struct BufferPool {
    idle: Mutex<Vec<Vec<u8>>>,
    max_retained: usize,
    max_capacity: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETAINED, DEFAULT_MAX_CAPACITY)
    }
}

impl BufferPool {
    pub fn new(max_retained: usize, max_capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_retained,
            max_capacity,
        }
    }

    /// Take an empty buffer from the pool, allocating when none is idle.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let mut buf = self
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(INITIAL_CAPACITY));
        buf.clear();
        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    /// Number of idle buffers.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    fn release(&self, mut buf: Vec<u8>) {
        if buf.capacity() > self.max_capacity {
            return;
        }
        buf.clear();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_retained {
            idle.push(buf);
        }
    }
}

/// A buffer on loan from a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}

// Tests are allowed to use unwrap/expect freely.
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn buffers_are_reused_and_reset() {
        let pool = Arc::new(BufferPool::default());
        {
            let mut buf = pool.acquire();
            buf.write_all(b"leftover").unwrap();
        }
        assert_eq!(pool.idle(), 1);

        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= INITIAL_CAPACITY);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn retention_is_bounded() {
        let pool = Arc::new(BufferPool::new(2, DEFAULT_MAX_CAPACITY));
        let loans: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        drop(loans);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn oversized_buffers_are_dropped() {
        let pool = Arc::new(BufferPool::new(4, 16));
        {
            let mut buf = pool.acquire();
            buf.extend_from_slice(&[0u8; 64]);
        }
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn released_on_early_return() {
        fn render(pool: &Arc<BufferPool>, fail: bool) -> Result<usize, &'static str> {
            let mut buf = pool.acquire();
            buf.push(b'x');
            if fail {
                return Err("template error");
            }
            Ok(buf.len())
        }

        let pool = Arc::new(BufferPool::default());
        assert!(render(&pool, true).is_err());
        assert_eq!(render(&pool, false), Ok(1));
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn concurrent_use() {
        let pool = Arc::new(BufferPool::new(8, DEFAULT_MAX_CAPACITY));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let mut buf = pool.acquire();
                        assert!(buf.is_empty());
                        write!(buf, "{i}").unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(pool.idle() <= 8);
    }
}
