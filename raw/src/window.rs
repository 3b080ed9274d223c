//! Bounded, read-only views over byte streams.
//!
//! A [`RawWindow`] presents a byte range of another stream
//! as if it were a stream of its own,
//! so that decoders can be given the header embedded in a raw data file
//! without being aware of the surrounding payload.
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};
use std::fmt;
use std::io::{self, Cursor, ErrorKind, Read, Seek, SeekFrom, Write};
use std::ops::Range;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display(
        "Invalid window {}..{} over a stream of {} bytes",
        start,
        end,
        length
    ))]
    InvalidBounds {
        start: i64,
        end: i64,
        length: u64,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not buffer {} bytes of a non-seekable stream", size))]
    ResourceExhaustion { size: u64, backtrace: Backtrace },
    #[snafu(display("Invalid whence value {}, should be 0, 1 or 2", whence))]
    InvalidWhence { whence: i32, backtrace: Backtrace },
    #[snafu(display("{} is not supported on a read-only window", operation))]
    NotSupported {
        operation: &'static str,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not access the windowed stream"))]
    Io {
        source: io::Error,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The byte range of a raw data file
/// occupied by its embedded DICOM header.
///
/// Offsets are absolute positions from the start of the file,
/// and `start <= end` always holds.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub struct HeaderWindow {
    pub(crate) start: u64,
    pub(crate) end: u64,
}

impl HeaderWindow {
    /// Create a header window,
    /// or `None` if `start` comes after `end`.
    pub fn new(start: u64, end: u64) -> Option<Self> {
        (start <= end).then_some(HeaderWindow { start, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }
}

impl fmt::Display for HeaderWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// The reference point of a seek operation,
/// convertible from the numeric codes 0, 1 and 2.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum Whence {
    /// Relative to the start of the window.
    Start,
    /// Relative to the current absolute position of the underlying stream.
    Current,
    /// Relative to the end of the window.
    End,
}

impl TryFrom<i32> for Whence {
    type Error = Error;

    fn try_from(whence: i32) -> Result<Self> {
        match whence {
            0 => Ok(Whence::Start),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            _ => InvalidWhenceSnafu { whence }.fail(),
        }
    }
}

/// A read-only window over the byte range `start..end` of a stream.
///
/// Positions reported by the window are relative to `start`,
/// and reads never go past `end`.
/// The window takes ownership of the underlying stream,
/// which is released when the window is dropped.
#[derive(Debug)]
pub struct RawWindow<R> {
    inner: R,
    start: u64,
    end: u64,
}

impl<R> RawWindow<R>
where
    R: Read + Seek,
{
    /// Create a window over a seekable stream.
    ///
    /// Negative offsets are interpreted
    /// as being relative to the end of the stream,
    /// so that `new(file, -24, -4)` over a 1000 byte stream
    /// covers the bytes `976..996`.
    pub fn new(mut inner: R, start: i64, end: i64) -> Result<Self> {
        let length = inner.seek(SeekFrom::End(0)).context(IoSnafu)?;
        let bounds = normalize(start, length).zip(normalize(end, length));
        let (abs_start, abs_end) = bounds
            .filter(|(s, e)| s <= e && *e <= length)
            .context(InvalidBoundsSnafu { start, end, length })?;
        Self::with_bounds(inner, abs_start, abs_end)
    }

    /// Create a window over the header region of a raw data file.
    pub fn over(mut inner: R, header: HeaderWindow) -> Result<Self> {
        let length = inner.seek(SeekFrom::End(0)).context(IoSnafu)?;
        ensure!(
            header.end <= length,
            InvalidBoundsSnafu {
                start: header.start as i64,
                end: header.end as i64,
                length,
            }
        );
        Self::with_bounds(inner, header.start, header.end)
    }

    fn with_bounds(mut inner: R, start: u64, end: u64) -> Result<Self> {
        inner.seek(SeekFrom::Start(start)).context(IoSnafu)?;
        Ok(RawWindow { inner, start, end })
    }

    /// The current position relative to the start of the window.
    pub fn tell(&mut self) -> io::Result<u64> {
        Ok(self.inner.stream_position()?.saturating_sub(self.start))
    }

    /// Seek using a numeric whence code
    /// (0: from the window start, 1: from the current position,
    /// 2: from the window end).
    ///
    /// Returns the new position relative to the start of the window.
    pub fn seek_whence(&mut self, offset: i64, whence: i32) -> Result<u64> {
        let whence = Whence::try_from(whence)?;
        self.seek_from(whence, offset).context(IoSnafu)
    }

    fn seek_from(&mut self, whence: Whence, offset: i64) -> io::Result<u64> {
        let reference = match whence {
            Whence::Start => self.start,
            Whence::Current => self.inner.stream_position()?,
            Whence::End => self.end,
        };
        let target = reference
            .checked_add_signed(offset)
            .filter(|target| *target >= self.start)
            .ok_or_else(|| {
                io::Error::new(
                    ErrorKind::InvalidInput,
                    "cannot seek before the start of the window",
                )
            })?;
        let position = self.inner.seek(SeekFrom::Start(target))?;
        Ok(position - self.start)
    }
}

impl<R> RawWindow<R> {
    /// Absolute offset of the window start in the underlying stream.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Absolute offset of the window end in the underlying stream.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Windows are read-only, so truncation always fails.
    pub fn truncate(&mut self, _size: u64) -> Result<()> {
        NotSupportedSnafu {
            operation: "truncate",
        }
        .fail()
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Release the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl RawWindow<Cursor<Vec<u8>>> {
    /// Create a window over a stream which cannot seek,
    /// by first reading all of it into memory.
    pub fn buffered<S>(source: S, start: i64, end: i64) -> Result<Self>
    where
        S: Read,
    {
        Self::buffered_with_limit(source, start, end, u64::MAX)
    }

    /// Same as [`buffered`](RawWindow::buffered),
    /// but fail with a resource exhaustion error
    /// once more than `limit` bytes would have to be held in memory.
    pub fn buffered_with_limit<S>(mut source: S, start: i64, end: i64, limit: u64) -> Result<Self>
    where
        S: Read,
    {
        let buffer = buffer_all(&mut source, limit)?;
        RawWindow::new(Cursor::new(buffer), start, end)
    }
}

fn normalize(offset: i64, length: u64) -> Option<u64> {
    if offset >= 0 {
        Some(offset as u64)
    } else {
        length.checked_sub(offset.unsigned_abs())
    }
}

fn buffer_all<S>(source: &mut S, limit: u64) -> Result<Vec<u8>>
where
    S: Read,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context(IoSnafu),
        };
        let size = buffer.len() as u64 + n as u64;
        ensure!(size <= limit, ResourceExhaustionSnafu { size });
        buffer
            .try_reserve(n)
            .ok()
            .context(ResourceExhaustionSnafu { size })?;
        buffer.extend_from_slice(&chunk[..n]);
    }
    Ok(buffer)
}

impl<R> Read for RawWindow<R>
where
    R: Read + Seek,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let position = self.inner.stream_position()?;
        if position >= self.end {
            return Ok(0);
        }
        let remaining = usize::try_from(self.end - position).unwrap_or(usize::MAX);
        let size = buf.len().min(remaining);
        self.inner.read(&mut buf[..size])
    }
}

impl<R> Seek for RawWindow<R>
where
    R: Read + Seek,
{
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Start(offset) => {
                let offset = i64::try_from(offset)
                    .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "seek offset overflow"))?;
                self.seek_from(Whence::Start, offset)
            }
            SeekFrom::Current(offset) => self.seek_from(Whence::Current, offset),
            SeekFrom::End(offset) => self.seek_from(Whence::End, offset),
        }
    }
}

impl<R> Write for RawWindow<R> {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(
            ErrorKind::Unsupported,
            "raw data windows are read-only",
        ))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, HeaderWindow, RawWindow, Whence};
    use std::io::{Cursor, ErrorKind, Read, Seek, SeekFrom, Write};

    fn buffer(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn reads_exactly_the_window() {
        let data = buffer(1000);
        for (start, end) in [(0, 1000), (10, 20), (500, 500), (999, 1000)] {
            let mut window =
                RawWindow::new(Cursor::new(data.clone()), start as i64, end as i64).unwrap();
            let mut out = Vec::new();
            window.read_to_end(&mut out).unwrap();
            assert_eq!(out, &data[start..end]);
        }
    }

    #[test]
    fn tell_follows_reads() {
        let mut window = RawWindow::new(Cursor::new(buffer(100)), 20, 60).unwrap();
        assert_eq!(window.tell().unwrap(), 0);
        let mut buf = [0; 15];
        window.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], 20);
        assert_eq!(window.tell().unwrap(), 15);

        // reads are clamped to the window
        let mut big = [0; 100];
        let n = window.read(&mut big).unwrap();
        assert_eq!(n, 25);
        assert_eq!(window.tell().unwrap(), 40);
        assert_eq!(window.read(&mut big).unwrap(), 0);
    }

    #[test]
    fn seek_from_end_reads_nothing() {
        let mut window = RawWindow::new(Cursor::new(buffer(100)), 10, 50).unwrap();
        assert_eq!(window.seek(SeekFrom::End(0)).unwrap(), 40);
        let mut out = Vec::new();
        window.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());

        assert_eq!(window.seek(SeekFrom::End(-4)).unwrap(), 36);
        window.read_to_end(&mut out).unwrap();
        assert_eq!(out, [46, 47, 48, 49]);
    }

    #[test]
    fn seek_from_current_uses_the_underlying_position() {
        let mut window = RawWindow::new(Cursor::new(buffer(100)), 10, 50).unwrap();
        window.seek(SeekFrom::Start(5)).unwrap();
        assert_eq!(window.seek(SeekFrom::Current(3)).unwrap(), 8);
        assert_eq!(window.get_ref().position(), 18);
    }

    #[test]
    fn seek_before_window_fails() {
        let mut window = RawWindow::new(Cursor::new(buffer(100)), 10, 50).unwrap();
        let err = window.seek(SeekFrom::Current(-11)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        // position is left untouched
        assert_eq!(window.tell().unwrap(), 0);
    }

    #[test]
    fn negative_offsets_are_relative_to_the_end() {
        let window = RawWindow::new(Cursor::new(buffer(1000)), -24, -4).unwrap();
        assert_eq!(window.start(), 976);
        assert_eq!(window.end(), 996);
        assert_eq!(window.len(), 20);
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        for (start, end) in [(50, 40), (0, 101), (-101, 10)] {
            let res = RawWindow::new(Cursor::new(buffer(100)), start, end);
            assert!(
                matches!(res, Err(Error::InvalidBounds { .. })),
                "{}..{} should be rejected",
                start,
                end
            );
        }
    }

    #[test]
    fn numeric_whence() {
        let mut window = RawWindow::new(Cursor::new(buffer(100)), 10, 50).unwrap();
        assert_eq!(window.seek_whence(4, 0).unwrap(), 4);
        assert_eq!(window.seek_whence(2, 1).unwrap(), 6);
        assert_eq!(window.seek_whence(-1, 2).unwrap(), 39);
        assert!(matches!(
            window.seek_whence(0, 3),
            Err(Error::InvalidWhence { whence: 3, .. })
        ));
        assert_eq!(Whence::try_from(1).unwrap(), Whence::Current);
    }

    #[test]
    fn windows_are_read_only() {
        let mut window = RawWindow::new(Cursor::new(buffer(100)), 0, 10).unwrap();
        let err = window.write(b"nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(matches!(
            window.truncate(0),
            Err(Error::NotSupported {
                operation: "truncate",
                ..
            })
        ));
    }

    #[test]
    fn non_seekable_streams_are_buffered() {
        let data = buffer(300);
        // a byte slice reader cannot seek
        let mut window = RawWindow::buffered(&data[..], -100, -50).unwrap();
        let mut out = Vec::new();
        window.read_to_end(&mut out).unwrap();
        assert_eq!(out, &data[200..250]);
    }

    #[test]
    fn buffering_beyond_the_limit_fails() {
        let data = buffer(20_000);
        let res = RawWindow::buffered_with_limit(&data[..], 0, 10, 10_000);
        assert!(matches!(res, Err(Error::ResourceExhaustion { .. })));
    }

    #[test]
    fn header_window_invariant() {
        assert!(HeaderWindow::new(10, 5).is_none());
        let window = HeaderWindow::new(10, 10).unwrap();
        assert!(window.is_empty());
        assert_eq!(HeaderWindow::new(3, 9).unwrap().to_string(), "3..9");
    }
}
