/// Bounded line reassembly
use bytes::{Buf, BytesMut};

/// Accumulates pipe input until whole lines can be taken out
///
/// The buffer never grows past its capacity. A full buffer that holds no
/// delimiter cannot make progress; callers treat that as a framing
/// violation.
#[derive(Debug)]
pub struct LineBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl LineBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    /// Append as much of `data` as fits; returns the number of bytes taken
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let n = self.remaining().min(data.len());
        self.buf.extend_from_slice(&data[..n]);
        n
    }

    /// Take the next complete line, without its `\n`
    pub fn next_line(&mut self) -> Option<BytesMut> {
        let end = self.buf.iter().position(|&b| b == b'\n')?;
        let line = self.buf.split_to(end);
        self.buf.advance(1);
        Some(line)
    }

    /// Whether the buffered bytes can never become a line
    pub fn is_stuck(&self) -> bool {
        self.is_full() && !self.buf.contains(&b'\n')
    }
}
