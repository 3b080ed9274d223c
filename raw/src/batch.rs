//! Classification of many raw data files at once.
//!
//! A file which cannot be classified never stops the batch:
//! its path is set aside and returned with the other leftovers.
use crate::classify::{ImageTypePolicy, PetRawFormat};
use crate::container::RawDataFile;
use crate::error::{Error, Result, UnexpectedFormatSnafu};
use crate::locate::HeaderLocator;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use snafu::Report;
use std::path::PathBuf;
use tracing::warn;

/// Options for classifying files in bulk.
#[derive(Debug, Default, Clone)]
pub struct BatchOptions {
    policy: ImageTypePolicy,
    locator: HeaderLocator,
    expected: Option<Vec<PetRawFormat>>,
}

impl BatchOptions {
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the Image Type validation policy.
    pub fn policy(mut self, policy: ImageTypePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set how headers are located.
    pub fn locator(mut self, locator: HeaderLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Only accept files of the given formats,
    /// setting aside files of any other format.
    pub fn expect(mut self, formats: impl IntoIterator<Item = PetRawFormat>) -> Self {
        self.expected = Some(formats.into_iter().collect());
        self
    }

    pub(crate) fn open(&self, path: PathBuf) -> RawDataFile {
        RawDataFile::with_locator(path, self.locator.clone())
    }

    fn accepts(&self, format: PetRawFormat) -> bool {
        self.expected
            .as_ref()
            .map_or(true, |expected| expected.contains(&format))
    }
}

/// A file which was successfully classified.
#[derive(Debug)]
pub struct Classified {
    pub file: RawDataFile,
    pub format: PetRawFormat,
}

/// Classify a collection of files.
///
/// Returns the files classified, in the order given,
/// and the paths of the files which could not be,
/// also in the order given.
pub fn classify_paths<I, P>(paths: I, options: &BatchOptions) -> (Vec<Classified>, Vec<PathBuf>)
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();

    #[cfg(feature = "rayon")]
    let outcomes: Vec<_> = paths
        .into_par_iter()
        .map(|path| classify_one(path, options))
        .collect();
    #[cfg(not(feature = "rayon"))]
    let outcomes: Vec<_> = paths
        .into_iter()
        .map(|path| classify_one(path, options))
        .collect();

    let mut classified = Vec::new();
    let mut leftovers = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(item) => classified.push(item),
            Err((path, e)) => {
                warn!("Skipping {}: {}", path.display(), Report::from_error(e));
                leftovers.push(path);
            }
        }
    }
    (classified, leftovers)
}

fn classify_one(path: PathBuf, options: &BatchOptions) -> Result<Classified, (PathBuf, Error)> {
    let file = options.open(path);
    match check_format(&file, options) {
        Ok(format) => Ok(Classified { file, format }),
        Err(e) => Err((file.path().to_path_buf(), e)),
    }
}

fn check_format(file: &RawDataFile, options: &BatchOptions) -> Result<PetRawFormat> {
    let format = file.classify_with(options.policy)?;
    if !options.accepts(format) {
        let expected = options
            .expected
            .as_ref()
            .and_then(|expected| expected.first().copied())
            .unwrap_or(PetRawFormat::Unrecognised);
        return Err(Error::FormatMismatch {
            filename: file.path().to_path_buf(),
            source: UnexpectedFormatSnafu { expected, found: format }.build(),
        });
    }
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::{classify_paths, BatchOptions};
    use crate::classify::PetRawFormat;
    use crate::sample::SampleFile;

    #[test]
    fn expected_formats_filter() {
        let dir = tempfile::tempdir().unwrap();
        let listmode = SampleFile::new(PetRawFormat::ListMode)
            .write_to(dir.path(), 0)
            .unwrap();
        let physio = SampleFile::new(PetRawFormat::Physio)
            .write_to(dir.path(), 1)
            .unwrap();

        let options = BatchOptions::new().expect([PetRawFormat::ListMode]);
        let (classified, leftovers) = classify_paths([&listmode, &physio], &options);
        assert_eq!(classified.len(), 1);
        assert_eq!(classified[0].format, PetRawFormat::ListMode);
        assert_eq!(classified[0].file.path(), listmode);
        assert_eq!(leftovers, vec![physio]);
    }

    #[test]
    fn missing_files_are_left_over() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.ptd");
        let (classified, leftovers) = classify_paths([&missing], &BatchOptions::default());
        assert!(classified.is_empty());
        assert_eq!(leftovers, vec![missing]);
    }
}
