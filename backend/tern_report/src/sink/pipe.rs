//! Chunked framing for log text routed through the collector pipe.
//!
//! Multiple backends share one pipe to the log collector. POSIX only
//! guarantees atomicity for writes up to `PIPE_BUF`, so each message is
//! split into self-describing chunks no larger than [`CHUNK_SIZE`]; the
//! collector reassembles them by process id.

use smallvec::SmallVec;

/// Total size of one framed chunk, header included. Kept at the smallest
/// common `PIPE_BUF` so a chunk is never interleaved with another
/// process's output.
pub const CHUNK_SIZE: usize = 512;

/// Frame header: two NUL magic bytes, payload length (u16 LE), sender
/// process id (u32 LE), and a one-byte routing flag.
const HEADER_SIZE: usize = 2 + 2 + 4 + 1;

/// Largest payload one chunk can carry.
pub const MAX_CHUNK_PAYLOAD: usize = CHUNK_SIZE - HEADER_SIZE;

/// Routing flag of one chunk.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ChunkFlags {
    /// Final chunk of its message.
    pub is_last: bool,
    /// Destined for the CSV log rather than the stderr log.
    pub csv: bool,
}

impl ChunkFlags {
    /// The flag byte as it appears on the wire: `t`/`f` for stderr
    /// chunks, `T`/`F` for CSV chunks.
    pub fn as_byte(self) -> u8 {
        match (self.csv, self.is_last) {
            (false, true) => b't',
            (false, false) => b'f',
            (true, true) => b'T',
            (true, false) => b'F',
        }
    }
}

/// Downstream side of the collector pipe.
///
/// Implementations must deliver each chunk atomically; chunks are framed
/// and sized by the caller so a plain `write` of the whole slice
/// suffices on a pipe.
pub trait ChunkedTransport {
    fn send_chunk(&mut self, chunk: &[u8], flags: ChunkFlags);

    fn flush(&mut self) {}
}

/// Split `text` into framed chunks and hand them to `transport`.
pub(crate) fn write_chunks(
    transport: &mut dyn ChunkedTransport,
    process_id: u32,
    text: &[u8],
    csv: bool,
) {
    let mut rest = text;
    loop {
        let is_last = rest.len() <= MAX_CHUNK_PAYLOAD;
        let take = rest.len().min(MAX_CHUNK_PAYLOAD);
        let (payload, tail) = rest.split_at(take);
        let flags = ChunkFlags { is_last, csv };

        let mut chunk: SmallVec<[u8; CHUNK_SIZE]> = SmallVec::new();
        chunk.extend_from_slice(&[0, 0]);
        #[expect(clippy::cast_possible_truncation, reason = "take <= MAX_CHUNK_PAYLOAD < u16::MAX")]
        chunk.extend_from_slice(&(take as u16).to_le_bytes());
        chunk.extend_from_slice(&process_id.to_le_bytes());
        chunk.push(flags.as_byte());
        chunk.extend_from_slice(payload);

        transport.send_chunk(&chunk, flags);
        if is_last {
            break;
        }
        rest = tail;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    struct CapturedChunks {
        chunks: Vec<(Vec<u8>, ChunkFlags)>,
    }

    impl ChunkedTransport for CapturedChunks {
        fn send_chunk(&mut self, chunk: &[u8], flags: ChunkFlags) {
            self.chunks.push((chunk.to_vec(), flags));
        }
    }

    fn payload_of(chunk: &[u8]) -> &[u8] {
        &chunk[HEADER_SIZE..]
    }

    #[test]
    fn short_message_is_one_final_chunk() {
        let mut transport = CapturedChunks::default();
        write_chunks(&mut transport, 7, b"hello\n", false);

        assert_eq!(transport.chunks.len(), 1);
        let (chunk, flags) = &transport.chunks[0];
        assert!(flags.is_last);
        assert_eq!(chunk[HEADER_SIZE - 1], b't');
        assert_eq!(&chunk[..2], &[0, 0]);
        assert_eq!(u16::from_le_bytes([chunk[2], chunk[3]]), 6);
        assert_eq!(u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]), 7);
        assert_eq!(payload_of(chunk), b"hello\n");
    }

    #[test]
    fn long_message_splits_with_only_the_last_marked_final() {
        let text = vec![b'x'; MAX_CHUNK_PAYLOAD * 2 + 5];
        let mut transport = CapturedChunks::default();
        write_chunks(&mut transport, 1, &text, false);

        assert_eq!(transport.chunks.len(), 3);
        assert!(!transport.chunks[0].1.is_last);
        assert!(!transport.chunks[1].1.is_last);
        assert!(transport.chunks[2].1.is_last);
        for (chunk, _) in &transport.chunks {
            assert!(chunk.len() <= CHUNK_SIZE);
        }
        let reassembled: Vec<u8> = transport
            .chunks
            .iter()
            .flat_map(|(chunk, _)| payload_of(chunk).to_vec())
            .collect();
        assert_eq!(reassembled, text);
    }

    #[test]
    fn csv_chunks_carry_uppercase_flags() {
        let text = vec![b'y'; MAX_CHUNK_PAYLOAD + 1];
        let mut transport = CapturedChunks::default();
        write_chunks(&mut transport, 1, &text, true);

        assert_eq!(transport.chunks[0].0[HEADER_SIZE - 1], b'F');
        assert_eq!(transport.chunks[1].0[HEADER_SIZE - 1], b'T');
    }

    #[test]
    fn empty_message_still_sends_a_terminator_chunk() {
        let mut transport = CapturedChunks::default();
        write_chunks(&mut transport, 1, b"", false);
        assert_eq!(transport.chunks.len(), 1);
        assert!(transport.chunks[0].1.is_last);
    }
}
