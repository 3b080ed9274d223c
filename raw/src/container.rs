//! Raw data files on disk.
//!
//! A [`RawDataFile`] is a handle to a path.
//! Every operation opens the file anew and closes it before returning,
//! while the location of the embedded header is remembered
//! for as long as the file is not modified.
use crate::classify::{self, ImageType, ImageTypePolicy, PetRawFormat};
use crate::decode::{HeaderDecoder, HeaderMetadata};
use crate::error::{
    DecodeHeaderSnafu, Error, NotSupportedSnafu, OpenFileSnafu, ReadFileSnafu, Result,
    UnexpectedFormatSnafu, WindowSnafu,
};
use crate::formats;
use crate::locate::{HeaderLocator, Layout};
use crate::scan::{self, data_set_offset, read_up_to, DATA_SET_PREFIX_LENGTH};
use crate::value::TagValue;
use crate::window::{HeaderWindow, RawWindow};
use dicom_core::Tag;
use snafu::{ensure, OptionExt, ResultExt};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Header location results,
/// valid for as long as the file keeps the same modification time and length.
#[derive(Debug, Copy, Clone, PartialEq)]
struct CachedLimits {
    modified: Option<SystemTime>,
    length: u64,
    layout: Layout,
    window: HeaderWindow,
}

/// A Siemens PET raw data file (`.ptd`).
///
/// # Example
///
/// ```no_run
/// use medimage_raw::{PetRawFormat, RawDataFile};
/// use dicom_dictionary_std::tags;
///
/// let file = RawDataFile::new("LISTMODE.ptd");
/// if file.classify()? == PetRawFormat::ListMode {
///     let series = file.read_tag(tags::SERIES_NUMBER)?;
///     println!("series {:?}", series);
/// }
/// # Result::<(), medimage_raw::Error>::Ok(())
/// ```
#[derive(Debug)]
pub struct RawDataFile {
    path: PathBuf,
    locator: HeaderLocator,
    cached: RefCell<Option<CachedLimits>>,
}

impl RawDataFile {
    /// Create a handle to the raw data file at the given path.
    ///
    /// The file is not accessed until an operation needs it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_locator(path, HeaderLocator::default())
    }

    /// Create a handle which locates headers
    /// with a custom configuration.
    pub fn with_locator(path: impl Into<PathBuf>, locator: HeaderLocator) -> Self {
        RawDataFile {
            path: path.into(),
            locator,
            cached: RefCell::new(None),
        }
    }

    /// Open a raw data file as a specific format,
    /// failing with a format mismatch if it is of any other kind.
    pub fn open_as(
        path: impl Into<PathBuf>,
        format: PetRawFormat,
        policy: ImageTypePolicy,
    ) -> Result<Self> {
        let file = Self::new(path);
        let found = file.classify_with(policy)?;
        if found != format {
            return Err(Error::FormatMismatch {
                filename: file.path.clone(),
                source: UnexpectedFormatSnafu {
                    expected: format,
                    found,
                }
                .build(),
            });
        }
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File> {
        File::open(&self.path).context(OpenFileSnafu {
            filename: &self.path,
        })
    }

    /// Locate the embedded DICOM header.
    pub fn dicom_header_limits(&self) -> Result<HeaderWindow> {
        self.locate().map(|limits| limits.window)
    }

    /// The container layout of the file.
    pub fn layout(&self) -> Result<Layout> {
        self.locate().map(|limits| limits.layout)
    }

    /// Forget the location of the header,
    /// so that it is looked up again on next access.
    pub fn invalidate(&self) {
        *self.cached.borrow_mut() = None;
    }

    fn locate(&self) -> Result<CachedLimits> {
        let metadata = fs::metadata(&self.path).context(OpenFileSnafu {
            filename: &self.path,
        })?;
        let modified = metadata.modified().ok();
        let length = metadata.len();

        let cached = *self.cached.borrow();
        if let Some(limits) = cached {
            if limits.modified == modified && limits.length == length {
                debug!("Reusing header location of {}", self.path.display());
                return Ok(limits);
            }
            debug!("{} changed, locating header again", self.path.display());
        }

        let mut file = self.open()?;
        let (layout, window) = self
            .locator
            .locate(&mut file)
            .map_err(|e| e.with_filename(&self.path))?;
        let limits = CachedLimits {
            modified,
            length,
            layout,
            window,
        };
        *self.cached.borrow_mut() = Some(limits);
        Ok(limits)
    }

    /// Open a read-only view of the embedded header.
    pub fn header_window(&self) -> Result<RawWindow<File>> {
        let window = self.dicom_header_limits()?;
        let file = self.open()?;
        RawWindow::over(file, window).context(WindowSnafu {
            filename: &self.path,
        })
    }

    /// Open a view of the header
    /// positioned at its first data element.
    fn data_set(&self) -> Result<RawWindow<File>> {
        let mut window = self.header_window()?;
        let mut prefix = [0u8; DATA_SET_PREFIX_LENGTH];
        let n = read_up_to(&mut window, &mut prefix).context(ReadFileSnafu {
            filename: &self.path,
        })?;
        let offset = data_set_offset(&prefix[..n]);
        window
            .seek(SeekFrom::Start(offset as u64))
            .context(ReadFileSnafu {
                filename: &self.path,
            })?;
        Ok(window)
    }

    /// Read the value of a single header element,
    /// or `None` if the header does not contain it.
    pub fn read_tag(&self, tag: Tag) -> Result<Option<TagValue>> {
        scan::find_tag(self.data_set()?, tag).map_err(|e| e.with_filename(&self.path))
    }

    /// Read the values of several header elements in one pass.
    /// Elements not in the header are left out.
    pub fn read_tags(&self, tags: &[Tag]) -> Result<BTreeMap<Tag, TagValue>> {
        scan::find_tags(self.data_set()?, tags).map_err(|e| e.with_filename(&self.path))
    }

    /// Read and validate the Image Type of the file
    /// with the default policy.
    pub fn image_type(&self) -> Result<ImageType> {
        self.image_type_with(ImageTypePolicy::default())
    }

    pub fn image_type_with(&self, policy: ImageTypePolicy) -> Result<ImageType> {
        classify::read_image_type(self.data_set()?, policy)
            .map_err(|e| e.with_filename(&self.path))
    }

    /// Determine the kind of raw data in the file.
    ///
    /// A valid Image Type with an unknown marker
    /// results in [`PetRawFormat::Unrecognised`],
    /// whereas a missing or malformed one is a format mismatch.
    pub fn classify(&self) -> Result<PetRawFormat> {
        self.classify_with(ImageTypePolicy::default())
    }

    pub fn classify_with(&self, policy: ImageTypePolicy) -> Result<PetRawFormat> {
        let image_type = self.image_type_with(policy)?;
        let format = image_type.format();
        debug!("{} is {} ({})", self.path.display(), format, image_type);
        Ok(format)
    }

    /// Decode the embedded header with the given decoder.
    ///
    /// The file is classified first,
    /// and its format must allow reading the header.
    /// The decoder receives the whole header,
    /// including any preamble present.
    pub fn read_metadata<D>(&self, decoder: &D, tags: Option<&[Tag]>) -> Result<HeaderMetadata>
    where
        D: ?Sized + HeaderDecoder,
    {
        let format = self.classify()?;
        ensure!(
            formats::entry(format).capabilities.read_header,
            NotSupportedSnafu {
                operation: "header reading",
                format,
            }
        );
        let mut window = self.header_window()?;
        decoder
            .decode(&mut window, tags)
            .context(DecodeHeaderSnafu {
                filename: &self.path,
            })
    }

    /// Write a copy of the file without identifying information
    /// to `destination`, using the de-identifier of its format.
    ///
    /// Formats without a de-identifier fail with [`Error::NotSupported`].
    pub fn deidentify(&self, destination: impl AsRef<Path>) -> Result<RawDataFile> {
        let format = self.classify()?;
        let deidentifier = formats::entry(format)
            .capabilities
            .deidentify
            .context(NotSupportedSnafu {
                operation: "de-identification",
                format,
            })?;
        let destination = destination.as_ref();
        deidentifier(self, destination)?;
        Ok(RawDataFile::with_locator(destination, self.locator.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::RawDataFile;
    use crate::classify::{ImageTypePolicy, PetRawFormat};
    use crate::error::{Error, Mismatch};
    use crate::locate::Layout;
    use crate::sample::{large_pet_raw_data, payload, petct_spl, HeaderBuilder, SampleFile};
    use dicom_core::Tag;
    use dicom_dictionary_std::tags;
    use std::io::Read;

    #[test]
    fn large_pet_raw_data_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = SampleFile::new(PetRawFormat::ListMode)
            .payload_len(1000)
            .write_to(dir.path(), 0)
            .unwrap();
        let file = RawDataFile::new(&path);

        let header = SampleFile::new(PetRawFormat::ListMode).header();
        let window = file.dicom_header_limits().unwrap();
        assert_eq!(window.start(), 1000);
        assert_eq!(window.len(), header.len() as u64);
        assert_eq!(file.layout().unwrap(), Layout::TrailingMagic);

        let mut bytes = Vec::new();
        file.header_window()
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        assert_eq!(bytes, header);

        assert_eq!(file.classify().unwrap(), PetRawFormat::ListMode);
        assert_eq!(
            file.read_tag(tags::SERIES_NUMBER).unwrap().unwrap().to_string(),
            "602"
        );
        assert_eq!(file.read_tag(Tag(0x0029, 0x1010)).unwrap(), None);
    }

    #[test]
    fn petct_spl_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = SampleFile::new(PetRawFormat::CtSpl)
            .write_to(dir.path(), 0)
            .unwrap();
        let file = RawDataFile::new(&path);
        assert_eq!(file.layout().unwrap(), Layout::LeadingMagic);
        assert_eq!(file.dicom_header_limits().unwrap().start(), 10);
        assert_eq!(file.classify().unwrap(), PetRawFormat::CtSpl);
    }

    #[test]
    fn tags_are_read_past_the_preamble() {
        let dir = tempfile::tempdir().unwrap();
        let header = HeaderBuilder::new()
            .with_preamble()
            .text(tags::MODALITY, b"CS", "PT")
            .image_type("PET_PHYSIO")
            .build();
        let path = dir.path().join("physio.ptd");
        std::fs::write(&path, large_pet_raw_data(&payload(64), &header)).unwrap();

        let file = RawDataFile::new(&path);
        assert_eq!(file.classify().unwrap(), PetRawFormat::Physio);
        let found = file.read_tags(&[tags::MODALITY, tags::IMAGE_TYPE]).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn empty_petct_spl_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.ptd");
        std::fs::write(&path, petct_spl(b"", &payload(16))).unwrap();

        let file = RawDataFile::new(&path);
        let window = file.dicom_header_limits().unwrap();
        assert!(window.is_empty());
        assert_eq!(file.read_tag(tags::MODALITY).unwrap(), None);
        let err = file.classify().unwrap_err();
        assert!(matches!(
            err.mismatch(),
            Some(Mismatch::MissingImageType { .. })
        ));
    }

    #[test]
    fn open_as_checks_the_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = SampleFile::new(PetRawFormat::CountRate)
            .write_to(dir.path(), 0)
            .unwrap();

        let policy = ImageTypePolicy::default();
        assert!(RawDataFile::open_as(&path, PetRawFormat::CountRate, policy).is_ok());

        let err = RawDataFile::open_as(&path, PetRawFormat::Sinogram, policy).unwrap_err();
        assert!(err.is_format_mismatch());
        assert!(matches!(
            err.mismatch(),
            Some(Mismatch::UnexpectedFormat {
                expected: PetRawFormat::Sinogram,
                found: PetRawFormat::CountRate,
                ..
            })
        ));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = RawDataFile::new(dir.path().join("nothing.ptd"));
        let err = file.classify().unwrap_err();
        assert!(matches!(err, Error::OpenFile { .. }));
        assert!(!err.is_format_mismatch());
    }

    #[test]
    fn deidentification_is_not_supported() {
        let dir = tempfile::tempdir().unwrap();
        let path = SampleFile::new(PetRawFormat::Normalisation)
            .write_to(dir.path(), 0)
            .unwrap();
        let copy = dir.path().join("copy.ptd");
        let err = RawDataFile::new(&path).deidentify(&copy).unwrap_err();
        assert!(matches!(
            err,
            Error::NotSupported {
                operation: "de-identification",
                format: PetRawFormat::Normalisation,
                ..
            }
        ));
        assert!(!copy.exists());
    }
}
