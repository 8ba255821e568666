//! Chunk buffer - batches normalized lines into bounded wire chunks.

use std::time::Duration;

/// Maximum payload of one chunk message (64 KiB).
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;

/// How often a partially filled buffer is flushed to keep UI latency small.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// Append-only buffer that accumulates normalized lines and hands back full
/// chunks as the size cap is reached. A single oversized line is split across
/// multiple chunks; splits never land inside a UTF-8 code point because the
/// wire payload is a proto `string`.
///
/// Owned exclusively by one session's task, never shared.
#[derive(Debug)]
pub struct ChunkBuffer {
    buf: String,
    max: usize,
}

impl ChunkBuffer {
    pub fn new(max: usize) -> Self {
        Self {
            buf: String::with_capacity(max.min(MAX_CHUNK_SIZE)),
            max,
        }
    }

    /// Append one normalized line. Chunks that filled up along the way are
    /// pushed onto `ready` in order; the caller transmits them.
    pub fn push(&mut self, line: &str, ready: &mut Vec<String>) {
        let mut rest = line;
        while !rest.is_empty() {
            let space = self.max - self.buf.len();
            if space == 0 {
                ready.push(std::mem::take(&mut self.buf));
                continue;
            }
            let mut n = rest.len().min(space);
            while n < rest.len() && !rest.is_char_boundary(n) {
                n -= 1;
            }
            if n == 0 {
                // next char does not fit in the remaining space
                ready.push(std::mem::take(&mut self.buf));
                continue;
            }
            self.buf.push_str(&rest[..n]);
            rest = &rest[n..];
        }
    }

    /// Current contents, resetting the buffer. `None` when empty, so that
    /// flushing an empty buffer sends nothing.
    pub fn take(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new(MAX_CHUNK_SIZE)
    }
}
