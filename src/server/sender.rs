//! Write-side queue draining across partial non-blocking writes.
//!
//! Worker threads append response chunks; the write thread flushes as much
//! as the socket accepts. Chunks leave the queue strictly in FIFO order and
//! only once fully written; a partially written chunk stays at the head
//! and the next flush resumes from the exact byte offset.

use bytes::Bytes;
use std::collections::VecDeque;
use std::io::{self, Write};

/// Per-connection queue of pending outgoing bytes.
pub struct FrameSender {
    queue: VecDeque<Bytes>,
    /// Bytes of the head chunk already written.
    offset: usize,
}

impl FrameSender {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            offset: 0,
        }
    }

    /// Append a chunk for transmission.
    pub fn push(&mut self, chunk: Bytes) {
        self.queue.push_back(chunk);
    }

    /// True once every queued byte has been written.
    pub fn is_done(&self) -> bool {
        self.queue.is_empty()
    }

    /// Write queued bytes until the queue drains or the socket stops
    /// accepting. Returns true when the queue drained.
    pub fn poll_write<W: Write>(&mut self, writer: &mut W) -> io::Result<bool> {
        while let Some(head) = self.queue.front() {
            match writer.write(&head[self.offset..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket accepted zero bytes",
                    ));
                }
                Ok(n) => {
                    self.offset += n;
                    if self.offset == head.len() {
                        self.queue.pop_front();
                        self.offset = 0;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

impl Default for FrameSender {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writer that accepts at most `per_call` bytes and reports
    /// `WouldBlock` between calls, mimicking a congested socket.
    struct ThrottledWriter {
        written: Vec<u8>,
        per_call: usize,
        ready: bool,
    }

    impl ThrottledWriter {
        fn new(per_call: usize) -> Self {
            Self {
                written: Vec::new(),
                per_call,
                ready: true,
            }
        }
    }

    impl Write for ThrottledWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if !self.ready {
                self.ready = true;
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "full"));
            }
            self.ready = false;
            let n = self.per_call.min(buf.len());
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn flush_all(sender: &mut FrameSender, writer: &mut ThrottledWriter) {
        while !sender.poll_write(writer).unwrap() {}
    }

    #[test]
    fn test_delivers_in_order() {
        let mut sender = FrameSender::new();
        sender.push(Bytes::from_static(b"alpha"));
        sender.push(Bytes::from_static(b"beta"));
        sender.push(Bytes::from_static(b"gamma"));

        let mut writer = ThrottledWriter::new(64);
        flush_all(&mut sender, &mut writer);
        assert_eq!(writer.written, b"alphabetagamma");
        assert!(sender.is_done());
    }

    #[test]
    fn test_any_per_call_limit_delivers_exact_sequence() {
        let mut expected = Vec::new();
        for chunk in [&b"processing"[..], b"sort", b"len", b"payload-bytes"] {
            expected.extend_from_slice(chunk);
        }

        for per_call in 1..=expected.len() {
            let mut sender = FrameSender::new();
            for chunk in [&b"processing"[..], b"sort", b"len", b"payload-bytes"] {
                sender.push(Bytes::copy_from_slice(chunk));
            }
            let mut writer = ThrottledWriter::new(per_call);
            flush_all(&mut sender, &mut writer);
            assert_eq!(writer.written, expected, "per_call = {per_call}");
        }
    }

    #[test]
    fn test_resumes_mid_chunk() {
        let mut sender = FrameSender::new();
        sender.push(Bytes::from_static(b"abcdef"));

        let mut writer = ThrottledWriter::new(4);
        // First flush writes 4 bytes then hits WouldBlock on the retry.
        assert!(!sender.poll_write(&mut writer).unwrap());
        assert_eq!(writer.written, b"abcd");
        assert!(!sender.is_done());

        // Next flush resumes at offset 4, not at the chunk start.
        assert!(sender.poll_write(&mut writer).unwrap());
        assert_eq!(writer.written, b"abcdef");
        assert!(sender.is_done());
    }

    #[test]
    fn test_push_while_draining() {
        let mut sender = FrameSender::new();
        sender.push(Bytes::from_static(b"first"));

        let mut writer = ThrottledWriter::new(3);
        assert!(!sender.poll_write(&mut writer).unwrap());

        sender.push(Bytes::from_static(b"second"));
        flush_all(&mut sender, &mut writer);
        assert_eq!(writer.written, b"firstsecond");
    }

    #[test]
    fn test_empty_queue_is_done() {
        let mut sender = FrameSender::new();
        let mut writer = ThrottledWriter::new(8);
        assert!(sender.is_done());
        assert!(sender.poll_write(&mut writer).unwrap());
        assert!(writer.written.is_empty());
    }
}
