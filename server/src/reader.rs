//! Tolerant line reading and payload framing.
//!
//! The text protocol accepts LF, CRLF, bare CR, and CR NUL as line
//! terminators; the CR NUL form shows up with telnet clients in
//! character mode. A bare CR followed by any other byte ends the line
//! and leaves that byte buffered for the next read.

use std::io;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 16 * 1024;

/// Buffered reader supplying command lines and length-prefixed
/// payloads.
pub struct LineReader<R> {
    inner: R,
    buf: BytesMut,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
        }
    }

    /// Read one logical line, without its terminator.
    ///
    /// End of stream with buffered bytes yields them as a final line;
    /// end of stream with nothing buffered yields `None` and ends the
    /// session.
    pub async fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut line: Vec<u8> = Vec::new();
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n' || b == b'\r') {
                let terminator = self.buf[pos];
                line.extend_from_slice(&self.buf[..pos]);
                self.buf.advance(pos + 1);
                if terminator == b'\r' {
                    // Absorb a following LF or NUL; anything else is
                    // pushed back for the next read.
                    if self.buf.is_empty() {
                        self.fill().await?;
                    }
                    if let Some(&next) = self.buf.first() {
                        if next == b'\n' || next == 0x00 {
                            self.buf.advance(1);
                        }
                    }
                }
                return Ok(Some(line));
            }

            line.extend_from_slice(&self.buf);
            self.buf.clear();
            if !self.fill().await? {
                if line.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(line));
            }
        }
    }

    /// Read exactly `n` payload bytes. Returns `None` when the stream
    /// ends short.
    pub async fn read_payload(&mut self, n: usize) -> io::Result<Option<Vec<u8>>> {
        if !self.ensure(n).await? {
            return Ok(None);
        }
        Ok(Some(self.buf.split_to(n).to_vec()))
    }

    /// Consume one payload terminator. Returns `false` on any other
    /// byte sequence (which is consumed) or on immediate end of
    /// stream; a CR at end of stream counts as a terminator.
    pub async fn consume_terminator(&mut self) -> io::Result<bool> {
        if !self.ensure(1).await? {
            return Ok(false);
        }
        let first = self.buf[0];
        self.buf.advance(1);
        match first {
            b'\n' => Ok(true),
            b'\r' => {
                if !self.ensure(1).await? {
                    return Ok(true);
                }
                let next = self.buf[0];
                self.buf.advance(1);
                Ok(next == b'\n' || next == 0x00)
            }
            _ => Ok(false),
        }
    }

    /// Pull more bytes from the stream. Returns `false` at end of
    /// stream.
    async fn fill(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        self.buf.reserve(READ_CHUNK);
        let n = self.inner.read_buf(&mut self.buf).await?;
        if n == 0 {
            self.eof = true;
            return Ok(false);
        }
        Ok(true)
    }

    /// Buffer at least `n` bytes. Returns `false` when the stream ends
    /// first.
    async fn ensure(&mut self, n: usize) -> io::Result<bool> {
        while self.buf.len() < n {
            if !self.fill().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
