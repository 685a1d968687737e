//! Decoder for the container engine's attach/exec multiplex framing.
//!
//! Docker (and compatible engines) multiplex stdout/stderr onto a single
//! connection when the container has no TTY: each frame is an 8-byte header
//! `[stream_id, 0, 0, 0, len(be32)]` followed by `len` payload bytes.

const HEADER_LEN: usize = 8;

const STREAM_STDOUT: u8 = 1;
const STREAM_STDERR: u8 = 2;

/// Accumulates demultiplexed stdout/stderr bytes, bounded by a total byte cap.
///
/// The cap is a coarse safety net: once `stdout.len() + stderr.len()` would
/// exceed it, further bytes are dropped rather than growing the buffers
/// unbounded.
pub struct FrameAccumulator {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    cap: usize,
    truncated: bool,
}

impl FrameAccumulator {
    pub fn new(cap: usize) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            cap,
            truncated: false,
        }
    }

    fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.stdout.len() + self.stderr.len())
    }

    fn push(&mut self, stream: u8, payload: &[u8]) {
        let room = self.remaining();
        let take = payload.len().min(room);
        if take < payload.len() {
            self.truncated = true;
        }
        match stream {
            STREAM_STDOUT => self.stdout.extend_from_slice(&payload[..take]),
            STREAM_STDERR => self.stderr.extend_from_slice(&payload[..take]),
            _ => {}
        }
    }

    /// Feed a chunk of raw bytes that may contain zero or more complete
    /// frames plus a partial frame tail. Returns the unconsumed tail (to be
    /// prepended to the next chunk) and whether the byte cap has now been hit.
    pub fn feed<'a>(&mut self, mut buf: &'a [u8]) -> &'a [u8] {
        loop {
            if self.remaining() == 0 {
                self.truncated = self.truncated || !buf.is_empty();
                return &buf[buf.len()..];
            }
            if buf.len() < HEADER_LEN {
                return buf;
            }
            let stream = buf[0];
            let len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
            if buf.len() < HEADER_LEN + len {
                return buf;
            }
            let payload = &buf[HEADER_LEN..HEADER_LEN + len];
            self.push(stream, payload);
            buf = &buf[HEADER_LEN + len..];
        }
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        (self.stdout, self.stderr)
    }
}

/// Decodes a complete, already-fully-buffered multiplex stream in one shot.
///
/// Used directly by unit tests against a synthetic byte stream, and as the
/// non-streaming fallback when an engine response is small enough to read to
/// completion before decoding (the live attach path instead feeds chunks into
/// a [`FrameAccumulator`] incrementally so that a mid-stream error or EOF
/// still yields whatever was accumulated so far).
pub fn decode_stream(bytes: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut acc = FrameAccumulator::new(usize::MAX);
    let tail = acc.feed(bytes);
    debug_assert!(tail.len() < HEADER_LEN || tail.len() == bytes.len());
    acc.into_parts()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(stream: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![stream, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn decodes_alternating_frames() {
        let mut stream = Vec::new();
        stream.extend(frame(1, b"hello"));
        stream.extend(frame(2, b"err"));

        let (stdout, stderr) = decode_stream(&stream);
        assert_eq!(stdout, b"hello");
        assert_eq!(stderr, b"err");
    }

    #[test]
    fn decodes_raw_header_bytes_for_stdout_and_stderr_frames() {
        let mut stream = Vec::new();
        stream.extend(b"\x01\x00\x00\x00\x00\x00\x00\x05");
        stream.extend(b"hello");
        stream.extend(b"\x02\x00\x00\x00\x00\x00\x00\x03");
        stream.extend(b"err");

        let (stdout, stderr) = decode_stream(&stream);
        assert_eq!(stdout, b"hello");
        assert_eq!(stderr, b"err");
    }

    #[test]
    fn round_trip_concatenates_repeated_frames() {
        let payload_a = [b"alpha".as_slice(), b"beta".as_slice()];
        let payload_b = [b"gamma".as_slice(), b"delta".as_slice()];

        let mut stream = Vec::new();
        for (a, b) in payload_a.iter().zip(payload_b.iter()) {
            stream.extend(frame(1, a));
            stream.extend(frame(2, b));
        }

        let (stdout, stderr) = decode_stream(&stream);
        assert_eq!(stdout, b"alphabeta");
        assert_eq!(stderr, b"gammadelta");
    }

    #[test]
    fn ignores_unknown_stream_ids() {
        let stream = frame(9, b"whatever");
        let (stdout, stderr) = decode_stream(&stream);
        assert!(stdout.is_empty());
        assert!(stderr.is_empty());
    }

    #[test]
    fn survives_mid_frame_truncation() {
        // A full stdout frame followed by a truncated stderr header: the
        // decoder must return what it has, not error out.
        let mut stream = frame(1, b"partial-ok");
        stream.extend(b"\x02\x00\x00\x00\x00\x00\x00"); // missing last length byte

        let mut acc = FrameAccumulator::new(usize::MAX);
        let tail = acc.feed(&stream);
        assert_eq!(tail.len(), 7);
        let (stdout, stderr) = acc.into_parts();
        assert_eq!(stdout, b"partial-ok");
        assert!(stderr.is_empty());
    }

    #[test]
    fn truncates_at_byte_cap() {
        let mut acc = FrameAccumulator::new(8);
        acc.feed(&frame(1, b"0123456789"));
        let (stdout, _) = acc.into_parts();
        assert_eq!(stdout.len(), 8);
    }
}
