//! This crate reads the DICOM headers embedded
//! in Siemens Biograph Vision PET raw data files (`.ptd`),
//! and classifies those files by the kind of data they hold.
//!
//! A raw data file is a binary payload
//! (list-mode events, sinograms, count rates, calibration data, ...)
//! with a DICOM data set embedded in it.
//! Where the data set lies depends on the container layout,
//! which is worked out by a [`HeaderLocator`].
//! The header can then be read through a [`RawWindow`],
//! either with the minimal element scanner in [`scan`]
//! or by any [`HeaderDecoder`].
//!
//! # Examples
//!
//! Classify a file and read some attributes:
//!
//! ```no_run
//! use dicom_dictionary_std::tags;
//! use medimage_raw::RawDataFile;
//! # fn foo() -> Result<(), Box<dyn std::error::Error>> {
//! let file = RawDataFile::new("PET.ptd");
//! println!("{} header at {}", file.layout()?, file.dicom_header_limits()?);
//! println!("{}", file.classify()?);
//!
//! let study = file.read_tag(tags::STUDY_INSTANCE_UID)?;
//! # Ok(())
//! # }
//! ```
//!
//! Decode the whole header with `dicom-object`:
//!
//! ```no_run
//! use medimage_raw::{DicomObjectDecoder, RawDataFile};
//! # fn foo() -> Result<(), Box<dyn std::error::Error>> {
//! let file = RawDataFile::new("PET.ptd");
//! let metadata = file.read_metadata(&DicomObjectDecoder::new(), None)?;
//! for (tag, value) in &metadata {
//!     println!("{} {}", tag, value);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Classify a whole collection of files,
//! setting aside those which are not raw data:
//!
//! ```no_run
//! use medimage_raw::batch::{classify_paths, BatchOptions};
//! let (classified, leftovers) = classify_paths(["a.ptd", "b.ptd"], &BatchOptions::default());
//! for item in classified {
//!     println!("{}: {}", item.file.path().display(), item.format);
//! }
//! ```
pub mod batch;
pub mod classify;
pub mod container;
pub mod decode;
pub mod error;
pub mod formats;
pub mod locate;
pub mod sample;
pub mod scan;
pub mod series;
pub mod value;
pub mod window;

pub use crate::batch::{classify_paths, BatchOptions, Classified};
pub use crate::classify::{ImageType, ImageTypePolicy, PetRawFormat};
pub use crate::container::RawDataFile;
pub use crate::decode::{DicomObjectDecoder, HeaderDecoder, HeaderMetadata, ScanDecoder};
pub use crate::error::{Error, Mismatch, ReadError, Result};
pub use crate::locate::{HeaderLocator, Layout, LeadingMagicLocator, TrailingMagicLocator};
pub use crate::series::{group_series, RawSeries, SeriesKey};
pub use crate::value::TagValue;
pub use crate::window::{HeaderWindow, RawWindow};
