//! Location of the DICOM header embedded in a raw data container.
//!
//! Two container layouts are known:
//!
//! - large PET raw data (list-mode, sinograms, count rates, ...)
//!   ends with the magic string `LARGE_PET_LM_RAWDATA`,
//!   preceded by the header size as a 32-bit little endian integer,
//!   which in turn is preceded by the header itself;
//! - PETCT_SPL data starts with the magic string `dummy data`,
//!   immediately followed by the header,
//!   whose end is marked by a delimiter.
//!
//! A [`HeaderLocator`] tries both layouts in that order.
use crate::error::{
    HeaderSizeOutOfRangeSnafu, IoSnafu, LeadingMagicSnafu, MissingDelimiterSnafu, NoLayoutSnafu,
    ReadError, TooShortSnafu, TrailingMagicSnafu,
};
use crate::scan::read_up_to;
use crate::window::HeaderWindow;
use byteordered::byteorder::{ByteOrder, LittleEndian};
use snafu::{ensure, OptionExt, ResultExt};
use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use tracing::debug;

/// Magic string at the very end of large PET raw data files.
pub const LARGE_PET_RAW_DATA_MAGIC: &[u8] = b"LARGE_PET_LM_RAWDATA";

/// Magic string at the very start of PETCT_SPL files.
pub const PETCT_SPL_MAGIC: &[u8] = b"dummy data";

/// Marks the end of the header in PETCT_SPL files
/// (the sequence delimitation item tag `(FFFE,E0DD)`).
pub const PETCT_SPL_HEADER_END: &[u8] = &[0xFE, 0xFF, 0xDD, 0xE0];

/// Number of bytes read at a time while searching for a delimiter.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Size of the header length field of large PET raw data files.
const SIZE_FIELD_LENGTH: u64 = 4;

/// The container layouts known.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum Layout {
    /// trailing magic string preceded by the header size
    TrailingMagic,
    /// leading magic string, header terminated by a delimiter
    LeadingMagic,
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::TrailingMagic => f.write_str("large PET raw data"),
            Layout::LeadingMagic => f.write_str("PETCT_SPL"),
        }
    }
}

/// Locates headers in large PET raw data files,
/// using the trailing magic string and header size.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct TrailingMagicLocator {
    magic: Cow<'static, [u8]>,
}

impl Default for TrailingMagicLocator {
    fn default() -> Self {
        TrailingMagicLocator {
            magic: Cow::Borrowed(LARGE_PET_RAW_DATA_MAGIC),
        }
    }
}

impl TrailingMagicLocator {
    pub fn new() -> Self {
        Default::default()
    }

    /// Use a different magic string.
    pub fn magic(mut self, magic: impl Into<Cow<'static, [u8]>>) -> Self {
        self.magic = magic.into();
        self
    }

    /// Locate the header in the given stream.
    ///
    /// The header occupies the bytes
    /// `[len - magic - 4 - size, len - magic - 4)`.
    pub fn locate<R>(&self, source: &mut R) -> Result<HeaderWindow, ReadError>
    where
        R: ?Sized + Read + Seek,
    {
        let length = source.seek(SeekFrom::End(0)).context(IoSnafu)?;
        let trailer = self.magic.len() as u64 + SIZE_FIELD_LENGTH;
        ensure!(
            length >= trailer,
            TooShortSnafu {
                length,
                required: trailer,
            }
        );

        source
            .seek(SeekFrom::Start(length - trailer))
            .context(IoSnafu)?;
        let mut buf = vec![0u8; trailer as usize];
        source.read_exact(&mut buf).context(IoSnafu)?;
        let (size, magic) = buf.split_at(SIZE_FIELD_LENGTH as usize);
        ensure!(
            magic == &*self.magic,
            TrailingMagicSnafu {
                expected: &*self.magic,
                found: magic,
            }
        );

        let size = LittleEndian::read_u32(size);
        let end = length - trailer;
        ensure!(
            u64::from(size) <= end,
            HeaderSizeOutOfRangeSnafu {
                size,
                available: end,
            }
        );
        Ok(HeaderWindow {
            start: end - u64::from(size),
            end,
        })
    }
}

/// Locates headers in PETCT_SPL files,
/// using the leading magic string and an end delimiter.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct LeadingMagicLocator {
    magic: Cow<'static, [u8]>,
    delimiter: Cow<'static, [u8]>,
    chunk_size: usize,
}

impl Default for LeadingMagicLocator {
    fn default() -> Self {
        LeadingMagicLocator {
            magic: Cow::Borrowed(PETCT_SPL_MAGIC),
            delimiter: Cow::Borrowed(PETCT_SPL_HEADER_END),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl LeadingMagicLocator {
    pub fn new() -> Self {
        Default::default()
    }

    /// Use a different leading magic string.
    pub fn magic(mut self, magic: impl Into<Cow<'static, [u8]>>) -> Self {
        self.magic = magic.into();
        self
    }

    /// Use a different end-of-header delimiter.
    pub fn delimiter(mut self, delimiter: impl Into<Cow<'static, [u8]>>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Set how many bytes are read at a time
    /// while searching for the delimiter.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Locate the header in the given stream.
    ///
    /// The header occupies the bytes from the end of the magic string
    /// up to the first occurrence of the delimiter.
    pub fn locate<R>(&self, source: &mut R) -> Result<HeaderWindow, ReadError>
    where
        R: ?Sized + Read + Seek,
    {
        source.seek(SeekFrom::Start(0)).context(IoSnafu)?;
        let mut leading = vec![0u8; self.magic.len()];
        let n = read_up_to(source, &mut leading).context(IoSnafu)?;
        ensure!(
            leading[..n] == *self.magic,
            LeadingMagicSnafu {
                expected: &*self.magic,
                found: &leading[..n],
            }
        );

        let start = self.magic.len() as u64;
        let end = find_forward(source, start, &self.delimiter, self.chunk_size)?
            .context(MissingDelimiterSnafu {
                delimiter: &*self.delimiter,
                from: start,
            })?;
        Ok(HeaderWindow { start, end })
    }
}

/// Search forward from the current position of `source`
/// (which is at absolute offset `start`)
/// for the first occurrence of `needle`.
///
/// Consecutive chunks overlap by `needle.len() - 1` bytes,
/// so that occurrences crossing chunk boundaries are found.
fn find_forward<R>(
    source: &mut R,
    start: u64,
    needle: &[u8],
    chunk_size: usize,
) -> Result<Option<u64>, ReadError>
where
    R: ?Sized + Read,
{
    if needle.is_empty() {
        return Ok(Some(start));
    }
    let mut chunk = vec![0u8; chunk_size.max(needle.len())];
    let mut haystack: Vec<u8> = Vec::with_capacity(chunk.len() + needle.len());
    // absolute offset of the first byte in `haystack`
    let mut offset = start;
    loop {
        let n = read_up_to(source, &mut chunk).context(IoSnafu)?;
        if n == 0 {
            return Ok(None);
        }
        haystack.extend_from_slice(&chunk[..n]);
        if let Some(i) = haystack.windows(needle.len()).position(|w| w == needle) {
            return Ok(Some(offset + i as u64));
        }
        let keep = (needle.len() - 1).min(haystack.len());
        let consumed = haystack.len() - keep;
        haystack.drain(..consumed);
        offset += consumed as u64;
    }
}

/// Locates the header of any known container layout.
///
/// The trailing magic layout is tried first,
/// falling back to the leading magic layout on a mismatch.
/// I/O errors are never recovered from.
#[derive(Debug, Default, Clone, Eq, Hash, PartialEq)]
pub struct HeaderLocator {
    trailing: TrailingMagicLocator,
    leading: LeadingMagicLocator,
}

impl HeaderLocator {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn trailing(mut self, locator: TrailingMagicLocator) -> Self {
        self.trailing = locator;
        self
    }

    pub fn leading(mut self, locator: LeadingMagicLocator) -> Self {
        self.leading = locator;
        self
    }

    /// Locate the header,
    /// also reporting which layout the container has.
    pub fn locate<R>(&self, source: &mut R) -> Result<(Layout, HeaderWindow), ReadError>
    where
        R: ?Sized + Read + Seek,
    {
        let trailing_err = match self.trailing.locate(source) {
            Ok(window) => {
                debug!("Found {} header at {}", Layout::TrailingMagic, window);
                return Ok((Layout::TrailingMagic, window));
            }
            Err(ReadError::Mismatch { source }) => source,
            Err(e) => return Err(e),
        };
        debug!("Not {}: {}", Layout::TrailingMagic, trailing_err);

        let leading_err = match self.leading.locate(source) {
            Ok(window) => {
                debug!("Found {} header at {}", Layout::LeadingMagic, window);
                return Ok((Layout::LeadingMagic, window));
            }
            Err(ReadError::Mismatch { source }) => source,
            Err(e) => return Err(e),
        };

        NoLayoutSnafu {
            attempts: format!(
                "{}: {}; {}: {}",
                Layout::TrailingMagic,
                trailing_err,
                Layout::LeadingMagic,
                leading_err
            ),
        }
        .fail()
        .map_err(ReadError::from)
    }
}
