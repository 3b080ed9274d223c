//! Grouping of raw data files into acquisition series.
//!
//! Files belong to the same series when they share
//! Study Instance UID and Series Number.
//! A series of more than one sinogram forms a dynamic sinogram series.
use crate::batch::{classify_paths, BatchOptions, Classified};
use crate::classify::PetRawFormat;
use crate::container::RawDataFile;
use crate::value::TagValue;
use dicom_core::Tag;
use dicom_dictionary_std::tags;
use snafu::Report;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SERIES_TAGS: [Tag; 4] = [
    tags::STUDY_INSTANCE_UID,
    tags::SERIES_NUMBER,
    tags::ACQUISITION_DATE,
    tags::ACQUISITION_TIME,
];

/// Identifies a series.
#[derive(Debug, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SeriesKey {
    pub study_instance_uid: String,
    pub series_number: i64,
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.study_instance_uid, self.series_number)
    }
}

/// A classified file in a series.
#[derive(Debug)]
pub struct SeriesMember {
    pub file: RawDataFile,
    pub format: PetRawFormat,
    pub acquisition_date: Option<String>,
    pub acquisition_time: Option<String>,
    time_key: Option<String>,
}

impl SeriesMember {
    fn sort_key(&self) -> (bool, Option<&str>, Option<&str>, &Path) {
        (
            self.time_key.is_none(),
            self.time_key.as_deref(),
            self.acquisition_date.as_deref(),
            self.file.path(),
        )
    }
}

/// Bring a TM value to the full `HHMMSS.FFFFFF` form,
/// filling omitted components with zeros,
/// so that values of different precision compare chronologically.
/// The `HH:MM:SS` form of older headers is also accepted.
fn normalized_time(tm: &str) -> Option<String> {
    let tm: String = tm.trim().chars().filter(|c| *c != ':').collect();
    let (hms, fraction) = tm.split_once('.').unwrap_or((tm.as_str(), ""));
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !matches!(hms.len(), 2 | 4 | 6) || fraction.len() > 6 || !digits(hms) || !digits(fraction) {
        return None;
    }
    Some(format!("{:0<6}.{:0<6}", hms, fraction))
}

/// The raw data files of one series,
/// sorted by acquisition time.
#[derive(Debug)]
pub struct RawSeries {
    pub key: SeriesKey,
    pub members: Vec<SeriesMember>,
}

impl RawSeries {
    /// The kind of raw data in the series as a whole.
    ///
    /// Several sinograms make a [`PetRawFormat::DynamicSinogram`].
    /// A series of files of a single other format has that format,
    /// and a mix of formats is [`PetRawFormat::Unrecognised`].
    pub fn format(&self) -> PetRawFormat {
        let mut formats = self.members.iter().map(|member| member.format);
        let Some(first) = formats.next() else {
            return PetRawFormat::Unrecognised;
        };
        if !formats.all(|format| format == first) {
            return PetRawFormat::Unrecognised;
        }
        if first == PetRawFormat::Sinogram && self.members.len() > 1 {
            PetRawFormat::DynamicSinogram
        } else {
            first
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Classify the given files and group them into series.
///
/// Series are sorted by key, members by acquisition time,
/// then acquisition date, then path.
/// Times of any TM precision are compared chronologically,
/// and members without a readable acquisition time come last.
/// Files which cannot be classified,
/// or which lack a Study Instance UID or a numeric Series Number,
/// are returned as leftovers in the order given.
pub fn group_series<I, P>(paths: I, options: &BatchOptions) -> (Vec<RawSeries>, Vec<PathBuf>)
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
    let (classified, mut leftovers) = classify_paths(paths.iter().cloned(), options);

    let mut groups: BTreeMap<SeriesKey, Vec<SeriesMember>> = BTreeMap::new();
    for Classified { file, format } in classified {
        let values = match file.read_tags(&SERIES_TAGS) {
            Ok(values) => values,
            Err(e) => {
                warn!("Could not read series of {}: {}", file.path().display(), Report::from_error(e));
                leftovers.push(file.path().to_path_buf());
                continue;
            }
        };
        let Some(key) = series_key(&values) else {
            debug!("{} does not identify its series", file.path().display());
            leftovers.push(file.path().to_path_buf());
            continue;
        };
        let text = |tag| values.get(&tag).and_then(TagValue::to_str).map(String::from);
        let acquisition_time = text(tags::ACQUISITION_TIME);
        let member = SeriesMember {
            acquisition_date: text(tags::ACQUISITION_DATE),
            time_key: acquisition_time.as_deref().and_then(normalized_time),
            acquisition_time,
            file,
            format,
        };
        groups.entry(key).or_default().push(member);
    }

    // files without a series key were set aside after the others
    let position: HashMap<&Path, usize> = paths
        .iter()
        .enumerate()
        .rev()
        .map(|(i, path)| (path.as_path(), i))
        .collect();
    leftovers.sort_by_key(|path| position.get(path.as_path()).copied());

    let series = groups
        .into_iter()
        .map(|(key, mut members)| {
            members.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            RawSeries { key, members }
        })
        .collect();
    (series, leftovers)
}

fn series_key(values: &BTreeMap<Tag, TagValue>) -> Option<SeriesKey> {
    let study_instance_uid = values.get(&tags::STUDY_INSTANCE_UID)?.to_str()?;
    let series_number = values.get(&tags::SERIES_NUMBER)?.to_str()?.trim().parse().ok()?;
    if study_instance_uid.is_empty() {
        return None;
    }
    Some(SeriesKey {
        study_instance_uid: study_instance_uid.into_owned(),
        series_number,
    })
}
