//! Error types for reading raw data containers.
//!
//! Structural problems with the contents of a container
//! are described by [`Mismatch`],
//! which is shared by the tag scanner, the header locators
//! and the format discriminator.
//! Functions working directly on byte streams return a [`ReadError`],
//! which is either a mismatch or an I/O failure.
//! Operations on a [`RawDataFile`](crate::RawDataFile)
//! attach the file name and return the crate level [`Error`].
use crate::classify::PetRawFormat;
use crate::decode;
use crate::window;
use dicom_core::Tag;
use snafu::{Backtrace, Snafu};
use std::path::{Path, PathBuf};

/// Reasons why the contents of a raw data stream
/// do not have the structure expected of them.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum Mismatch {
    #[snafu(display("stream is {} bytes long, but at least {} bytes are required", length, required))]
    TooShort {
        length: u64,
        required: u64,
        backtrace: Backtrace,
    },
    #[snafu(display(
        "expected trailing magic `{}`, found `{}`",
        expected.escape_ascii(),
        found.escape_ascii()
    ))]
    TrailingMagic {
        expected: Vec<u8>,
        found: Vec<u8>,
        backtrace: Backtrace,
    },
    #[snafu(display(
        "expected leading magic `{}`, found `{}`",
        expected.escape_ascii(),
        found.escape_ascii()
    ))]
    LeadingMagic {
        expected: Vec<u8>,
        found: Vec<u8>,
        backtrace: Backtrace,
    },
    #[snafu(display(
        "header size {} exceeds the {} bytes preceding the size field",
        size,
        available
    ))]
    HeaderSizeOutOfRange {
        size: u32,
        available: u64,
        backtrace: Backtrace,
    },
    #[snafu(display(
        "header end delimiter `{}` not found after offset {}",
        delimiter.escape_ascii(),
        from
    ))]
    MissingDelimiter {
        delimiter: Vec<u8>,
        from: u64,
        backtrace: Backtrace,
    },
    #[snafu(display("no known raw data layout matches ({})", attempts))]
    NoLayout {
        attempts: String,
        backtrace: Backtrace,
    },
    #[snafu(display("truncated {} in data element {}", field, tag))]
    TruncatedElement {
        tag: Tag,
        field: &'static str,
        backtrace: Backtrace,
    },
    #[snafu(display("missing Image Type (0008,0008) in header"))]
    MissingImageType { backtrace: Backtrace },
    #[snafu(display("malformed Image Type `{}`: {}", value, reason))]
    ImageTypeShape {
        value: String,
        reason: &'static str,
        backtrace: Backtrace,
    },
    #[snafu(display("expected {} raw data, found {}", expected, found))]
    UnexpectedFormat {
        expected: PetRawFormat,
        found: PetRawFormat,
        backtrace: Backtrace,
    },
}

/// An error raised while reading structures out of a raw data stream.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum ReadError {
    /// The stream contents do not have the expected structure.
    #[snafu(context(false), display("{}", source))]
    Mismatch { source: Mismatch },
    /// The underlying stream failed.
    #[snafu(display("Could not read from stream"))]
    Io {
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

impl ReadError {
    /// Whether this error describes a structural mismatch
    /// rather than an I/O failure.
    pub fn is_mismatch(&self) -> bool {
        matches!(self, ReadError::Mismatch { .. })
    }

    /// Attach the identity of the file being read.
    pub(crate) fn with_filename(self, filename: &Path) -> Error {
        let filename = filename.to_path_buf();
        match self {
            ReadError::Mismatch { source } => Error::FormatMismatch { filename, source },
            ReadError::Io { source, backtrace } => Error::ReadFile {
                filename,
                source,
                backtrace,
            },
        }
    }
}

/// The main error type for operations on raw data files.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Could not open raw data file '{}'", filename.display()))]
    OpenFile {
        filename: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not read from raw data file '{}'", filename.display()))]
    ReadFile {
        filename: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("'{}' is not a recognised raw data file", filename.display()))]
    FormatMismatch { filename: PathBuf, source: Mismatch },
    #[snafu(display("Could not window the header of '{}'", filename.display()))]
    Window {
        filename: PathBuf,
        source: window::Error,
    },
    #[snafu(display("Could not decode the DICOM header of '{}'", filename.display()))]
    DecodeHeader {
        filename: PathBuf,
        source: decode::Error,
    },
    #[snafu(display("{} is not supported for {}", operation, format))]
    NotSupported {
        operation: &'static str,
        format: PetRawFormat,
        backtrace: Backtrace,
    },
}

impl Error {
    /// Whether the file was readable
    /// but its contents do not match the expected structure.
    ///
    /// Callers processing many files usually catch these
    /// and set the file aside as unrecognised.
    pub fn is_format_mismatch(&self) -> bool {
        matches!(self, Error::FormatMismatch { .. })
    }

    /// The structural reason behind a format mismatch, if that is what this is.
    pub fn mismatch(&self) -> Option<&Mismatch> {
        match self {
            Error::FormatMismatch { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
