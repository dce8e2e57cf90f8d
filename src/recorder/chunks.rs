//! Chunk accumulation for one recording session

use bytes::Bytes;

/// Ordered, append-only sequence of encoder output fragments.
///
/// Reset at the start of every session before the first fragment can
/// arrive; read once, after the session's stop event, to assemble the
/// artifact.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<Bytes>,
}

impl ChunkBuffer {
    /// Discard everything from a previous session
    pub fn reset(&mut self) {
        self.chunks.clear();
    }

    /// Append a fragment, preserving arrival order
    pub fn push(&mut self, chunk: Bytes) {
        self.chunks.push(chunk);
    }

    /// Number of buffered fragments
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no fragments are buffered
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total payload size in bytes
    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    /// Concatenate all fragments in arrival order
    pub fn concat(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_preserves_arrival_order() {
        let mut buffer = ChunkBuffer::default();
        buffer.push(Bytes::from_static(b"alpha"));
        buffer.push(Bytes::from_static(b"-"));
        buffer.push(Bytes::from_static(b"omega"));
        assert_eq!(buffer.concat(), b"alpha-omega");
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.byte_len(), 11);
    }

    #[test]
    fn test_reset_discards_previous_session() {
        let mut buffer = ChunkBuffer::default();
        buffer.push(Bytes::from_static(b"stale"));
        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.concat(), Vec::<u8>::new());
    }

    #[test]
    fn test_empty_buffer_concatenates_to_nothing() {
        let buffer = ChunkBuffer::default();
        assert_eq!(buffer.byte_len(), 0);
        assert!(buffer.concat().is_empty());
    }
}
