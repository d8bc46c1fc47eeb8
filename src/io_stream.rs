use std::io::{self, Read, Write};

/// Buffered duplex byte stream with zero-copy peek/consume and in-place
/// buffer swap (spec §4.1). Read and write sides are independent halves of
/// the same struct; operations on one `IOStream` are single-threaded, but
/// distinct streams are fully independent (spec §5).
///
/// The in-buffer defaults to an owned `Vec<u8>`, but `swap_buffer` exchanges
/// it for a caller-supplied one without reallocating — `with_buffers`/
/// `into_buffers` use this to let a connection pool hand its buffers back
/// and forth across accepted sockets. Ownership moves both ways, so nothing
/// is ever freed out from under the other owner; there is no aliasing to
/// police.
pub struct IOStream<S> {
    stream: S,
    in_buf: Vec<u8>,
    in_start: usize,
    in_end: usize,
    out_buf: Vec<u8>,
    out_len: usize,
}

/// A read found nothing buffered and the socket reported EOF.
#[derive(Debug)]
pub struct EndOfStream;

/// The buffered region was exhausted before a terminator was found; the
/// caller should refill from the socket and retry (spec §4.1/§4.4).
#[derive(Debug, PartialEq, Eq)]
pub struct EndOfBuffer;

pub const DEFAULT_OUT_BUFFER_SIZE: usize = 4096;

impl<S: Read + Write> IOStream<S> {
    pub fn new(stream: S, in_capacity: usize, out_capacity: usize) -> Self {
        Self {
            stream,
            in_buf: vec![0u8; in_capacity],
            in_start: 0,
            in_end: 0,
            out_buf: vec![0u8; out_capacity],
            out_len: 0,
        }
    }

    /// Builds a stream from buffers already on hand (spec §3: ServerConnection
    /// pools these between accepted sockets instead of reallocating).
    pub fn with_buffers(stream: S, in_buf: Vec<u8>, out_buf: Vec<u8>) -> Self {
        Self {
            stream,
            in_buf,
            in_start: 0,
            in_end: 0,
            out_buf,
            out_len: 0,
        }
    }

    /// Tears the stream down, handing its buffers back to the caller for
    /// pooling. Any unread input or pending output is discarded.
    pub fn into_buffers(self) -> (Vec<u8>, Vec<u8>) {
        (self.in_buf, self.out_buf)
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Bytes currently buffered and unread.
    pub fn buffered(&self) -> &[u8] {
        &self.in_buf[self.in_start..self.in_end]
    }

    pub fn consume(&mut self, n: usize) {
        self.in_start = (self.in_start + n).min(self.in_end);
    }

    /// Installs `new_buf` as the in-buffer, carrying over any unread tail to
    /// its head, and returns the previous buffer to the caller. This is the
    /// operation the round-trip invariant in spec §8 exercises directly.
    pub fn swap_buffer(&mut self, mut new_buf: Vec<u8>) -> Vec<u8> {
        let tail = self.buffered();
        debug_assert!(
            tail.len() <= new_buf.len(),
            "swap_buffer: new buffer too small to hold unread tail"
        );
        new_buf[..tail.len()].copy_from_slice(tail);

        let old = std::mem::replace(&mut self.in_buf, new_buf);
        self.in_end = tail.len();
        self.in_start = 0;
        old
    }

    fn fill_from_socket(&mut self) -> io::Result<usize> {
        // compact unread tail to the front so a single read() can use the
        // rest of the capacity.
        if self.in_start > 0 {
            self.in_buf.copy_within(self.in_start..self.in_end, 0);
            self.in_end -= self.in_start;
            self.in_start = 0;
        }
        if self.in_end == self.in_buf.len() {
            return Ok(0); // buffer already full; caller must consume first
        }
        let n = self.stream.read(&mut self.in_buf[self.in_end..])?;
        self.in_end += n;
        Ok(n)
    }

    /// Reads up to `dst.len()` bytes. Copies directly out of the buffer when
    /// something is already buffered; otherwise does one refill syscall when
    /// the destination fits the buffer, else reads straight into `dst`
    /// (spec §4.1 hot-path description).
    pub fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if self.in_start < self.in_end {
            let n = (self.in_end - self.in_start).min(dst.len());
            dst[..n].copy_from_slice(&self.in_buf[self.in_start..self.in_start + n]);
            self.in_start += n;
            return Ok(n);
        }

        if dst.len() <= self.in_buf.len() {
            self.in_start = 0;
            self.in_end = 0;
            let n = self.stream.read(&mut self.in_buf)?;
            self.in_end = n;
            let take = n.min(dst.len());
            dst[..take].copy_from_slice(&self.in_buf[..take]);
            self.in_start = take;
            Ok(take)
        } else {
            self.stream.read(dst)
        }
    }

    /// One refill syscall into whatever free capacity remains, returning the
    /// number of new bytes buffered (0 on EOF).
    pub fn fill(&mut self) -> io::Result<usize> {
        self.fill_from_socket()
    }

    /// Returns a byte only if one is already buffered; never touches the
    /// socket (spec §4.1: parser fast path).
    pub fn read_byte_safe(&mut self) -> Option<u8> {
        if self.in_start < self.in_end {
            let b = self.in_buf[self.in_start];
            self.in_start += 1;
            Some(b)
        } else {
            None
        }
    }

    /// Returns the next byte, refilling from the socket if necessary.
    pub fn read_byte(&mut self) -> Result<u8, EndOfStream> {
        if let Some(b) = self.read_byte_safe() {
            return Ok(b);
        }
        match self.fill_from_socket() {
            Ok(0) | Err(_) => Err(EndOfStream),
            Ok(_) => self.read_byte_safe().ok_or(EndOfStream),
        }
    }

    /// Scans the *currently buffered* region for the first byte matching
    /// `pred`, relative to the logical absolute position `abs_start`
    /// (`abs_start + offset_into_buffered`). Returns the absolute position of
    /// the match, `Err(EndOfBuffer)` if the buffered region was exhausted
    /// without a match, or `Err(LimitExceeded)` if `limit` was reached first.
    ///
    /// Unrolled eight bytes at a time, mirroring khttp's SWAR byte scanners
    /// (`parser::simd::match_path_vectored`/`match_uri_vectored`) at the
    /// granularity a predicate-based scan can still unroll.
    pub fn read_until_expr(
        &self,
        abs_start: usize,
        pred: impl Fn(u8) -> bool,
        limit: usize,
    ) -> Result<usize, ScanLimit> {
        let buf = self.buffered();
        let cap = limit.saturating_sub(abs_start).min(buf.len());
        let mut i = 0;
        while i + 8 <= cap {
            for j in 0..8 {
                if pred(buf[i + j]) {
                    return Ok(abs_start + i + j);
                }
            }
            i += 8;
        }
        while i < cap {
            if pred(buf[i]) {
                return Ok(abs_start + i);
            }
            i += 1;
        }
        if abs_start + buf.len() >= limit {
            Err(ScanLimit::Exceeded)
        } else {
            Err(ScanLimit::NeedMoreData)
        }
    }

    // ---------------------------------------------------------------
    // writer half
    // ---------------------------------------------------------------

    /// Raw mutable access to the spare capacity of the out-buffer, for
    /// callers (e.g. the static-file range handler) that want to populate it
    /// directly before calling `flush_buffered`.
    pub fn out_buffer_spare(&mut self) -> &mut [u8] {
        &mut self.out_buf[self.out_len..]
    }

    pub fn out_buffer_capacity(&self) -> usize {
        self.out_buf.len()
    }

    pub fn mark_out_buffer_filled(&mut self, n: usize) {
        self.out_len += n;
    }

    pub fn write_all(&mut self, mut bytes: &[u8]) -> io::Result<()> {
        while !bytes.is_empty() {
            let space = self.out_buf.len() - self.out_len;
            if space == 0 {
                self.flush()?;
                continue;
            }
            let n = space.min(bytes.len());
            self.out_buf[self.out_len..self.out_len + n].copy_from_slice(&bytes[..n]);
            self.out_len += n;
            bytes = &bytes[n..];
        }
        Ok(())
    }

    /// Flushes the whole accumulator in one syscall.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.out_len > 0 {
            self.stream.write_all(&self.out_buf[..self.out_len])?;
            self.out_len = 0;
        }
        Ok(())
    }

    /// Flushes only the first `n` bytes of the out-buffer (used when the
    /// caller populated `out_buffer_spare` externally rather than through
    /// `write_all`).
    pub fn flush_buffered(&mut self, n: usize) -> io::Result<()> {
        self.stream.write_all(&self.out_buf[..n])?;
        self.out_len = 0;
        Ok(())
    }

    /// Streams `reader` to the socket by alternating reads into the
    /// out-buffer and flushes, without ever materializing the whole body.
    pub fn write_from_reader<R: Read>(&mut self, reader: &mut R) -> io::Result<u64> {
        let mut total = 0u64;
        loop {
            let spare = self.out_buffer_spare();
            if spare.is_empty() {
                self.flush()?;
                continue;
            }
            let n = reader.read(spare)?;
            if n == 0 {
                break;
            }
            self.mark_out_buffer_filled(n);
            total += n as u64;
            self.flush()?;
        }
        Ok(total)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ScanLimit {
    NeedMoreData,
    Exceeded,
}

/// Object-safe view of an `IOStream<S>`'s byte-level read/write/flush
/// surface, erasing the socket type `S`. Lets a protocol handler taking over
/// a connection after a WebSocket upgrade (spec §4.8) be stored in
/// [`crate::response::Response`], which is otherwise generic over buffer
/// lifetime only, never the socket type.
pub trait DuplexIo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

impl<S: Read + Write> DuplexIo for IOStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        IOStream::read(self, buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        IOStream::write_all(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        IOStream::flush(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn swap_buffer_preserves_unread_bytes_in_order() {
        let data = b"0123456789ABCDEF".to_vec();
        let mut io = IOStream::new(Cursor::new(data.clone()), 8, 64);

        let mut first_half = [0u8; 4];
        io.read(&mut first_half).unwrap();
        assert_eq!(&first_half, b"0123");

        let new_buf = vec![0u8; 32];
        let _old = io.swap_buffer(new_buf);

        let mut rest = Vec::new();
        let mut chunk = [0u8; 4];
        loop {
            let n = io.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            rest.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(rest, &data[4..]);
    }

    #[test]
    fn read_byte_safe_never_touches_socket() {
        let mut io = IOStream::new(Cursor::new(Vec::<u8>::new()), 8, 8);
        assert_eq!(io.read_byte_safe(), None);
    }

    #[test]
    fn read_byte_refills_then_returns_eos_at_end() {
        let mut io = IOStream::new(Cursor::new(b"ab".to_vec()), 8, 8);
        assert_eq!(io.read_byte().unwrap(), b'a');
        assert_eq!(io.read_byte().unwrap(), b'b');
        assert!(io.read_byte().is_err());
    }

    #[test]
    fn read_until_expr_finds_match_in_buffered_region() {
        let mut io = IOStream::new(Cursor::new(b"GET / HTTP/1.1\r\n".to_vec()), 64, 8);
        io.fill().unwrap();
        let pos = io.read_until_expr(0, |b| b == b' ', 64).unwrap();
        assert_eq!(pos, 3);
    }

    #[test]
    fn read_until_expr_reports_need_more_data_without_match() {
        let mut io = IOStream::new(Cursor::new(b"no-terminator".to_vec()), 64, 8);
        io.fill().unwrap();
        let res = io.read_until_expr(0, |b| b == b'\n', 64);
        assert_eq!(res, Err(ScanLimit::NeedMoreData));
    }

    #[test]
    fn write_all_buffers_and_flush_pushes_once() {
        let mut io = IOStream::new(Cursor::new(Vec::<u8>::new()), 8, 8);
        io.write_all(b"hi").unwrap();
        io.flush().unwrap();
        assert_eq!(io.get_ref().get_ref(), b"hi");
    }
}
