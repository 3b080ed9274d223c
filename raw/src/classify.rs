//! Discrimination of raw PET data subtypes
//! through the Image Type (0008,0008) of the embedded header.
//!
//! The Image Type of a raw data file is expected to read
//! `ORIGINAL\PRIMARY\<MARKER>`,
//! where the marker names the kind of data in the payload
//! (see [`formats`](crate::formats) for the known markers).
//! How many components are allowed
//! and which of them holds the marker
//! has varied across scanner software revisions,
//! so both are configurable through an [`ImageTypePolicy`].
use crate::error::{ImageTypeShapeSnafu, MissingImageTypeSnafu, Mismatch, ReadError};
use crate::formats;
use crate::scan;
use crate::value::TagValue;
use dicom_dictionary_std::tags;
use snafu::{ensure, OptionExt, Snafu};
use std::fmt;
use std::io::Read;
use std::str::FromStr;

/// The kinds of raw PET data recognised.
#[derive(Debug, Copy, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PetRawFormat {
    /// list-mode (event by event) projection data
    ListMode,
    /// histogrammed projection data in a reconstruction-friendly format
    Sinogram,
    /// a time series of sinograms from the same acquisition
    DynamicSinogram,
    /// number of prompt/random/single events per unit time
    CountRate,
    /// normalisation scan or the current cross calibration factor
    Normalisation,
    /// replay (reconstruction) parameters
    Parameterisation,
    /// physiological (respiratory/cardiac) gating log
    Physio,
    /// PET/CT scatter, attenuation and reconstruction support data
    CtSpl,
    /// raw data of a kind not known here
    Unrecognised,
}

impl PetRawFormat {
    /// All formats, in declaration order.
    pub const ALL: [PetRawFormat; 9] = [
        PetRawFormat::ListMode,
        PetRawFormat::Sinogram,
        PetRawFormat::DynamicSinogram,
        PetRawFormat::CountRate,
        PetRawFormat::Normalisation,
        PetRawFormat::Parameterisation,
        PetRawFormat::Physio,
        PetRawFormat::CtSpl,
        PetRawFormat::Unrecognised,
    ];

    /// A short, kebab-case name for the format.
    pub fn name(self) -> &'static str {
        match self {
            PetRawFormat::ListMode => "list-mode",
            PetRawFormat::Sinogram => "sinogram",
            PetRawFormat::DynamicSinogram => "dynamic-sinogram",
            PetRawFormat::CountRate => "count-rate",
            PetRawFormat::Normalisation => "normalisation",
            PetRawFormat::Parameterisation => "parameterisation",
            PetRawFormat::Physio => "physio",
            PetRawFormat::CtSpl => "petct-spl",
            PetRawFormat::Unrecognised => "raw-data",
        }
    }

    /// The Image Type markers identifying this format.
    pub fn markers(self) -> &'static [&'static str] {
        formats::entry(self).markers
    }
}

impl fmt::Display for PetRawFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("unknown raw PET data format `{}`", name))]
pub struct ParseFormatError {
    name: String,
}

impl FromStr for PetRawFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PetRawFormat::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(s))
            .context(ParseFormatSnafu { name: s })
    }
}

/// How many Image Type components are accepted.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub enum Arity {
    /// `ORIGINAL\PRIMARY\<MARKER>` and nothing else
    ExactlyThree,
    /// `ORIGINAL\PRIMARY\<MARKER>` optionally followed by more components
    #[default]
    AtLeastThree,
}

/// Which Image Type component holds the format marker.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub enum MarkerComponent {
    #[default]
    Third,
    Last,
}

/// Rules for validating an Image Type and picking its marker.
///
/// The default policy accepts three or more components
/// and reads the marker from the third one.
///
/// # Example
///
/// ```
/// use medimage_raw::classify::{Arity, ImageTypePolicy, MarkerComponent};
///
/// let policy = ImageTypePolicy::new()
///     .arity(Arity::AtLeastThree)
///     .marker(MarkerComponent::Last);
/// assert_ne!(policy, ImageTypePolicy::strict());
/// ```
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub struct ImageTypePolicy {
    pub arity: Arity,
    pub marker: MarkerComponent,
}

impl ImageTypePolicy {
    pub fn new() -> Self {
        Default::default()
    }

    /// Only accept exactly three components.
    pub fn strict() -> Self {
        ImageTypePolicy {
            arity: Arity::ExactlyThree,
            marker: MarkerComponent::Third,
        }
    }

    pub fn arity(mut self, arity: Arity) -> Self {
        self.arity = arity;
        self
    }

    pub fn marker(mut self, marker: MarkerComponent) -> Self {
        self.marker = marker;
        self
    }
}

/// A validated Image Type value.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct ImageType {
    components: Vec<String>,
    marker: usize,
}

impl ImageType {
    /// Validate an Image Type value against the given policy.
    pub fn parse(value: &TagValue, policy: ImageTypePolicy) -> Result<Self, Mismatch> {
        let shown = value.to_string();
        let components = value.components().context(ImageTypeShapeSnafu {
            value: shown.clone(),
            reason: "value is not text",
        })?;
        ensure!(
            components.len() >= 2 && components[0] == "ORIGINAL" && components[1] == "PRIMARY",
            ImageTypeShapeSnafu {
                value: shown,
                reason: "expected the first components to be ORIGINAL\\PRIMARY",
            }
        );
        match policy.arity {
            Arity::ExactlyThree => ensure!(
                components.len() == 3,
                ImageTypeShapeSnafu {
                    value: shown,
                    reason: "expected exactly 3 components",
                }
            ),
            Arity::AtLeastThree => ensure!(
                components.len() >= 3,
                ImageTypeShapeSnafu {
                    value: shown,
                    reason: "expected at least 3 components",
                }
            ),
        }
        let marker = match policy.marker {
            MarkerComponent::Third => 2,
            MarkerComponent::Last => components.len() - 1,
        };
        Ok(ImageType {
            components: components.into_iter().map(String::from).collect(),
            marker,
        })
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// The component which identifies the format.
    pub fn marker(&self) -> &str {
        &self.components[self.marker]
    }

    /// Match the marker against the known formats.
    ///
    /// Markers are compared case-sensitively.
    /// An unknown marker is not an error:
    /// the file is simply [`Unrecognised`](PetRawFormat::Unrecognised).
    pub fn format(&self) -> PetRawFormat {
        formats::by_marker(self.marker())
            .map(|entry| entry.format)
            .unwrap_or(PetRawFormat::Unrecognised)
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.components.join("\\"))
    }
}

/// Scan an explicit VR little endian data set for its Image Type.
///
/// A missing Image Type is a mismatch,
/// as no raw data file can be classified without it.
pub fn read_image_type<R>(source: R, policy: ImageTypePolicy) -> Result<ImageType, ReadError>
where
    R: Read,
{
    let value = scan::find_tag(source, tags::IMAGE_TYPE)?.context(MissingImageTypeSnafu)?;
    Ok(ImageType::parse(&value, policy)?)
}
