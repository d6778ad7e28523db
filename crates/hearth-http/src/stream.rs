//! Client stream abstraction and buffered reading.
//!
//! [`ClientStream`] unifies TCP and Unix-domain sockets behind the small
//! surface the server needs: blocking reads and writes, peeking with a
//! timeout, half/full shutdown and cloning for the shutdown signal path.
//!
//! [`StreamBuf`] owns a stream plus a read buffer. Leftover bytes between
//! pipelined requests stay in the buffer, and the idle peek consults it
//! before touching the socket, so a pipelined second request is never
//! mistaken for an idle connection.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

/// Read timeouts below this are clamped; a zero timeout would disable the
/// timeout entirely on most platforms.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Refill chunk size for the internal buffer.
const READ_CHUNK: usize = 8 * 1024;

/// A connected client socket, TCP or Unix-domain.
#[derive(Debug)]
pub enum ClientStream {
    /// TCP connection.
    Tcp(TcpStream),
    /// Unix-domain connection.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ClientStream {
    /// Returns the peer IP as text, or an empty string for Unix sockets.
    #[must_use]
    pub fn peer_ip(&self) -> String {
        match self {
            Self::Tcp(s) => s
                .peer_addr()
                .map(|a| a.ip().to_string())
                .unwrap_or_default(),
            #[cfg(unix)]
            Self::Unix(_) => String::new(),
        }
    }

    /// Sets the read timeout on the underlying socket.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.set_read_timeout(timeout),
            #[cfg(unix)]
            Self::Unix(s) => s.set_read_timeout(timeout),
        }
    }

    /// Peeks at pending data without consuming it.
    ///
    /// Returns `Ok(0)` when the peer has closed the connection.
    pub fn peek(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.peek(buf),
            #[cfg(unix)]
            Self::Unix(s) => {
                use std::mem::MaybeUninit;

                let sock = socket2::SockRef::from(s);
                let mut spare = [MaybeUninit::<u8>::uninit(); 1];
                let taken = buf.len().min(spare.len());
                sock.peek(&mut spare[..taken])
            }
        }
    }

    /// Shuts down one or both halves of the connection.
    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.shutdown(how),
            #[cfg(unix)]
            Self::Unix(s) => s.shutdown(how),
        }
    }

    /// Clones the socket handle, e.g. for the shutdown signal path.
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(match self {
            Self::Tcp(s) => Self::Tcp(s.try_clone()?),
            #[cfg(unix)]
            Self::Unix(s) => Self::Unix(s.try_clone()?),
        })
    }
}

impl Read for ClientStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.read(buf),
        }
    }
}

impl Write for ClientStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Self::Unix(s) => s.flush(),
        }
    }
}

/// A buffered client stream with byte accounting.
#[derive(Debug)]
pub struct StreamBuf {
    stream: ClientStream,
    buf: Vec<u8>,
    pos: usize,
    bytes_in: u64,
    bytes_out: u64,
    receive_timeout: Duration,
}

impl StreamBuf {
    /// Wraps a stream; `receive_timeout` bounds reads that have no explicit
    /// deadline (body reads, mainly).
    #[must_use]
    pub fn new(stream: ClientStream, receive_timeout: Duration) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            pos: 0,
            bytes_in: 0,
            bytes_out: 0,
            receive_timeout,
        }
    }

    /// Returns the underlying stream.
    #[must_use]
    pub fn stream(&self) -> &ClientStream {
        &self.stream
    }

    /// Consumes the wrapper, returning the raw stream.
    ///
    /// Buffered but unconsumed bytes are discarded; callers hand off the
    /// stream only at request boundaries.
    #[must_use]
    pub fn detach(self) -> ClientStream {
        self.stream
    }

    /// True when unconsumed bytes remain from a previous read.
    #[must_use]
    pub fn has_buffered(&self) -> bool {
        self.pos < self.buf.len()
    }

    /// Total bytes read from the socket.
    #[must_use]
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Total bytes written to the socket.
    #[must_use]
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Checks for pending input: buffered bytes count as available.
    ///
    /// Returns `Ok(true)` when data is ready, `Ok(false)` when the timeout
    /// elapsed with nothing pending, and an error when the peer closed the
    /// connection or the socket failed.
    pub fn peek_available(&mut self, timeout: Duration) -> io::Result<bool> {
        if self.has_buffered() {
            return Ok(true);
        }
        self.stream
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;
        let mut probe = [0u8; 1];
        match self.stream.peek(&mut probe) {
            Ok(0) => Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "peer closed the connection",
            )),
            Ok(_) => Ok(true),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Reads one CRLF-terminated line, stripping the terminator.
    ///
    /// `deadline`, when set, caps the total wall-clock time; otherwise each
    /// refill is bounded by the receive timeout. Lines longer than `max_len`
    /// fail with `InvalidData`.
    pub fn read_line(&mut self, max_len: usize, deadline: Option<Instant>) -> io::Result<String> {
        loop {
            if let Some(nl) = self.buf[self.pos..].iter().position(|&b| b == b'\n') {
                let end = self.pos + nl;
                let mut line_end = end;
                if line_end > self.pos && self.buf[line_end - 1] == b'\r' {
                    line_end -= 1;
                }
                if line_end - self.pos > max_len {
                    return Err(io::Error::new(ErrorKind::InvalidData, "header line too long"));
                }
                let line = String::from_utf8_lossy(&self.buf[self.pos..line_end]).into_owned();
                self.consume(end + 1 - self.pos);
                return Ok(line);
            }
            if self.buf.len() - self.pos > max_len {
                return Err(io::Error::new(ErrorKind::InvalidData, "header line too long"));
            }
            if self.fill(deadline)? == 0 {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "connection closed before end of line",
                ));
            }
        }
    }

    /// Reads exactly `n` bytes.
    pub fn read_exact_vec(&mut self, n: usize, deadline: Option<Instant>) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(n.min(READ_CHUNK));
        while out.len() < n {
            if !self.has_buffered() && self.fill(deadline)? == 0 {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "connection closed before end of body",
                ));
            }
            let take = (n - out.len()).min(self.buf.len() - self.pos);
            out.extend_from_slice(&self.buf[self.pos..self.pos + take]);
            self.consume(take);
        }
        Ok(out)
    }

    /// Reads until the peer closes the connection.
    pub fn read_to_end_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            if self.has_buffered() {
                out.extend_from_slice(&self.buf[self.pos..]);
                let len = self.buf.len() - self.pos;
                self.consume(len);
            }
            if self.fill(None)? == 0 {
                return Ok(out);
            }
        }
    }

    /// Writes the whole buffer, counting bytes out.
    pub fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)?;
        self.bytes_out += data.len() as u64;
        Ok(())
    }

    /// Flushes the write side.
    pub fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }

    fn consume(&mut self, n: usize) {
        self.pos += n;
        if self.pos >= self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        }
    }

    /// Refills the buffer from the socket, honoring `deadline` when set.
    ///
    /// Returns the number of bytes read; 0 means the peer closed.
    fn fill(&mut self, deadline: Option<Instant>) -> io::Result<usize> {
        let timeout = match deadline {
            Some(d) => {
                let now = Instant::now();
                if now >= d {
                    return Err(io::Error::new(ErrorKind::TimedOut, "read deadline exceeded"));
                }
                (d - now).max(MIN_READ_TIMEOUT)
            }
            None => self.receive_timeout,
        };
        self.stream.set_read_timeout(Some(timeout))?;

        // Drop already-consumed bytes before growing the buffer.
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }

        let start = self.buf.len();
        self.buf.resize(start + READ_CHUNK, 0);
        let result = self.stream.read(&mut self.buf[start..]);
        match result {
            Ok(n) => {
                self.buf.truncate(start + n);
                self.bytes_in += n as u64;
                Ok(n)
            }
            Err(e) => {
                self.buf.truncate(start);
                if matches!(e.kind(), ErrorKind::WouldBlock) {
                    Err(io::Error::new(ErrorKind::TimedOut, "socket read timed out"))
                } else {
                    Err(e)
                }
            }
        }
    }
}
