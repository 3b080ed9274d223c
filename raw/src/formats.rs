//! Registry of the raw PET data formats
//! produced by the Siemens Biograph Vision (software VR20B).
//!
//! Each format is described by a [`FormatEntry`]:
//! its identifiers, the Image Type markers which select it,
//! and the operations it supports.
use crate::classify::PetRawFormat;
use crate::container::RawDataFile;
use crate::error::Result;
use std::path::Path;

/// File name extension of all Siemens PET raw data files.
pub const EXTENSION: &str = "ptd";

/// Writes a copy of a raw data file without identifying information
/// to the given destination.
pub type Deidentifier = fn(&RawDataFile, &Path) -> Result<()>;

/// The operations a raw data format supports.
#[derive(Debug, Copy, Clone)]
pub struct Capabilities {
    /// the embedded DICOM header can be located and read
    pub read_header: bool,
    /// produces a copy without identifying information
    pub deidentify: Option<Deidentifier>,
}

// the payload of raw data may hold identifying information
// which cannot be told apart from measurements
const RAW_DATA: Capabilities = Capabilities {
    read_header: true,
    deidentify: None,
};

/// A known raw data format.
#[derive(Debug, Copy, Clone)]
pub struct FormatEntry {
    pub format: PetRawFormat,
    /// the format class name used by the `fileformats` type system
    pub identifier: &'static str,
    /// a MIME-like name for the format
    pub mime_like: &'static str,
    /// Image Type markers which identify the format,
    /// covering the spellings of different software revisions
    pub markers: &'static [&'static str],
    pub capabilities: Capabilities,
}

/// All known formats, in the declaration order of [`PetRawFormat`].
pub static REGISTRY: [FormatEntry; 9] = [
    FormatEntry {
        format: PetRawFormat::ListMode,
        identifier: "Vnd_Siemens_Biograph128Vision_Vr20b_PetListMode",
        mime_like: "medimage/vnd.siemens.biograph128-vision.vr20b.pet-list-mode",
        markers: &["PET_LISTMODE"],
        capabilities: RAW_DATA,
    },
    FormatEntry {
        format: PetRawFormat::Sinogram,
        identifier: "Vnd_Siemens_Biograph128Vision_Vr20b_PetSinogram",
        mime_like: "medimage/vnd.siemens.biograph128-vision.vr20b.pet-sinogram",
        markers: &["PET_EM_SINOGRAM", "PET_EM_SINO"],
        capabilities: RAW_DATA,
    },
    FormatEntry {
        format: PetRawFormat::DynamicSinogram,
        identifier: "Vnd_Siemens_Biograph128Vision_Vr20b_PetDynamicSinogramSeries",
        mime_like: "medimage/vnd.siemens.biograph128-vision.vr20b.pet-dynamic-sinogram-series",
        // derived from a series of sinograms, never from a single file
        markers: &[],
        capabilities: RAW_DATA,
    },
    FormatEntry {
        format: PetRawFormat::CountRate,
        identifier: "Vnd_Siemens_Biograph128Vision_Vr20b_PetCountRate",
        mime_like: "medimage/vnd.siemens.biograph128-vision.vr20b.pet-count-rate",
        markers: &["PET_COUNTRATE"],
        capabilities: RAW_DATA,
    },
    FormatEntry {
        format: PetRawFormat::Normalisation,
        identifier: "Vnd_Siemens_Biograph128Vision_Vr20b_PetNormalisation",
        mime_like: "medimage/vnd.siemens.biograph128-vision.vr20b.pet-normalisation",
        markers: &["PET_CALIBRATION", "PET_NORM"],
        capabilities: RAW_DATA,
    },
    FormatEntry {
        format: PetRawFormat::Parameterisation,
        identifier: "Vnd_Siemens_Biograph128Vision_Vr20b_PetParameterisation",
        mime_like: "medimage/vnd.siemens.biograph128-vision.vr20b.pet-parameterisation",
        markers: &["PET_REPLAY_PARAM"],
        capabilities: RAW_DATA,
    },
    FormatEntry {
        format: PetRawFormat::Physio,
        identifier: "Vnd_Siemens_Biograph128Vision_Vr20b_PetPhysio",
        mime_like: "medimage/vnd.siemens.biograph128-vision.vr20b.pet-physio",
        markers: &["PET_PHYSIO"],
        capabilities: RAW_DATA,
    },
    FormatEntry {
        format: PetRawFormat::CtSpl,
        identifier: "Vnd_Siemens_Biograph128Vision_Vr20b_PetCtSpl",
        mime_like: "medimage/vnd.siemens.biograph128-vision.vr20b.pet-ct-spl",
        markers: &["PETCT_SPL"],
        capabilities: RAW_DATA,
    },
    FormatEntry {
        format: PetRawFormat::Unrecognised,
        identifier: "Vnd_Siemens_Biograph128Vision_Vr20b_PetRawData",
        mime_like: "medimage/vnd.siemens.biograph128-vision.vr20b.pet-raw-data",
        markers: &[],
        capabilities: RAW_DATA,
    },
];

/// The registry entry of a format.
pub fn entry(format: PetRawFormat) -> &'static FormatEntry {
    &REGISTRY[format as usize]
}

/// Look up the format selected by an Image Type marker.
pub fn by_marker(marker: &str) -> Option<&'static FormatEntry> {
    REGISTRY
        .iter()
        .find(|entry| entry.markers.iter().any(|m| *m == marker))
}

/// Look up a format by its `fileformats` class name.
pub fn by_identifier(identifier: &str) -> Option<&'static FormatEntry> {
    REGISTRY.iter().find(|entry| entry.identifier == identifier)
}
