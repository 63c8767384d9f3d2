//! Read-side state machine reconstructing one frame from partial reads.
//!
//! A connection on the multiplexed server owns exactly one assembler. The
//! read thread drives it with non-blocking reads; `WouldBlock` suspends the
//! assembler mid-frame and a later readiness event resumes it from the
//! exact byte it stopped at. After a frame is taken the assembler is back
//! in `AwaitingLength`, so back-to-back frames on one connection assemble
//! without waiting for any response.

use crate::error::Error;
use crate::wire::LENGTH_PREFIX_SIZE;
use std::io::{self, Read};
use std::mem;

/// What a call to [`FrameAssembler::poll_read`] observed.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The socket ran dry before the frame completed. The assembler keeps
    /// its partial state; call again on the next readiness event.
    Incomplete,
    /// A full frame is assembled; take it with
    /// [`FrameAssembler::take_frame`].
    Complete,
    /// The peer closed cleanly at a frame boundary.
    Closed,
}

enum Phase {
    AwaitingLength { prefix: [u8; LENGTH_PREFIX_SIZE], filled: usize },
    AwaitingPayload { payload: Vec<u8>, filled: usize },
    Complete { payload: Vec<u8> },
}

/// Per-connection resumable frame reader.
pub struct FrameAssembler {
    phase: Phase,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitingLength {
                prefix: [0; LENGTH_PREFIX_SIZE],
                filled: 0,
            },
        }
    }

    /// Drive the assembler until a frame completes, the socket runs dry,
    /// or the peer closes.
    ///
    /// A close inside a frame (after any prefix byte arrived, or inside
    /// the payload) is a malformed frame; the owning connection must be
    /// torn down.
    pub fn poll_read<R: Read>(&mut self, reader: &mut R) -> Result<ReadOutcome, Error> {
        loop {
            match &mut self.phase {
                Phase::AwaitingLength { prefix, filled } => {
                    match reader.read(&mut prefix[*filled..]) {
                        Ok(0) => {
                            return if *filled == 0 {
                                Ok(ReadOutcome::Closed)
                            } else {
                                Err(Error::MalformedFrame("stream closed inside length prefix"))
                            };
                        }
                        Ok(n) => {
                            *filled += n;
                            if *filled == LENGTH_PREFIX_SIZE {
                                let len = u32::from_be_bytes(*prefix) as usize;
                                // Allocated once at the declared length; never resized.
                                self.phase = Phase::AwaitingPayload {
                                    payload: vec![0; len],
                                    filled: 0,
                                };
                            }
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                            return Ok(ReadOutcome::Incomplete);
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(Error::Io(e)),
                    }
                }
                Phase::AwaitingPayload { payload, filled } => {
                    // A zero-length payload completes without touching the
                    // socket again.
                    if *filled == payload.len() {
                        let payload = mem::take(payload);
                        self.phase = Phase::Complete { payload };
                        return Ok(ReadOutcome::Complete);
                    }
                    match reader.read(&mut payload[*filled..]) {
                        Ok(0) => {
                            return Err(Error::MalformedFrame("stream closed inside payload"));
                        }
                        Ok(n) => {
                            *filled += n;
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                            return Ok(ReadOutcome::Incomplete);
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(Error::Io(e)),
                    }
                }
                Phase::Complete { .. } => return Ok(ReadOutcome::Complete),
            }
        }
    }

    /// Take the assembled frame, resetting to `AwaitingLength` so the next
    /// frame on the connection can start assembling immediately.
    pub fn take_frame(&mut self) -> Option<Vec<u8>> {
        match &mut self.phase {
            Phase::Complete { payload } => {
                let payload = mem::take(payload);
                self.phase = Phase::AwaitingLength {
                    prefix: [0; LENGTH_PREFIX_SIZE],
                    filled: 0,
                };
                Some(payload)
            }
            _ => None,
        }
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
