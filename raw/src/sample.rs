//! Construction of synthetic raw data files.
//!
//! These are used to test readers and to generate sample data
//! when no scanner output is at hand.
//! The headers produced are minimal explicit VR little endian data sets,
//! and payloads are filler bytes.
use crate::classify::PetRawFormat;
use crate::formats::{self, EXTENSION};
use crate::locate::{LARGE_PET_RAW_DATA_MAGIC, PETCT_SPL_HEADER_END, PETCT_SPL_MAGIC};
use crate::scan::is_long_form;
use dicom_core::Tag;
use dicom_dictionary_std::{tags, uids};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const IMPLEMENTATION_CLASS_UID: &str = "1.2.826.0.1.3680043.2.1125.2";

/// Builder of explicit VR little endian data sets.
#[derive(Debug, Default, Clone)]
pub struct HeaderBuilder {
    preamble: bool,
    meta: Option<Vec<u8>>,
    bytes: Vec<u8>,
}

impl HeaderBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Start the header with a 128-byte preamble and the `DICM` magic code.
    pub fn with_preamble(mut self) -> Self {
        self.preamble = true;
        self
    }

    /// Start the header with a preamble, the `DICM` magic code
    /// and a file meta group declaring explicit VR little endian.
    pub fn with_meta_group(mut self, sop_instance_uid: &str) -> Self {
        let group = HeaderBuilder::new()
            .text(Tag(0x0002, 0x0002), b"UI", uids::POSITRON_EMISSION_TOMOGRAPHY_IMAGE_STORAGE)
            .text(Tag(0x0002, 0x0003), b"UI", sop_instance_uid)
            .text(Tag(0x0002, 0x0010), b"UI", uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .text(Tag(0x0002, 0x0012), b"UI", IMPLEMENTATION_CLASS_UID)
            .build();
        let meta = HeaderBuilder::new()
            .element(Tag(0x0002, 0x0000), b"UL", &(group.len() as u32).to_le_bytes())
            .build();
        self.meta = Some([meta, group].concat());
        self.preamble = true;
        self
    }

    /// Append a data element with the given value bytes, as is.
    pub fn element(mut self, tag: Tag, vr: &[u8; 2], value: &[u8]) -> Self {
        self.bytes.extend_from_slice(&tag.group().to_le_bytes());
        self.bytes.extend_from_slice(&tag.element().to_le_bytes());
        self.bytes.extend_from_slice(vr);
        if is_long_form(*vr) {
            self.bytes.extend_from_slice(&[0, 0]);
            self.bytes
                .extend_from_slice(&(value.len() as u32).to_le_bytes());
        } else {
            self.bytes
                .extend_from_slice(&(value.len() as u16).to_le_bytes());
        }
        self.bytes.extend_from_slice(value);
        self
    }

    /// Append a textual data element, padded to even length.
    pub fn text(self, tag: Tag, vr: &[u8; 2], value: &str) -> Self {
        let mut value = value.as_bytes().to_vec();
        if value.len() % 2 == 1 {
            value.push(if vr == b"UI" { b'\0' } else { b' ' });
        }
        self.element(tag, vr, &value)
    }

    /// Append an Image Type of the form `ORIGINAL\PRIMARY\<marker>`.
    pub fn image_type(self, marker: &str) -> Self {
        self.text(
            tags::IMAGE_TYPE,
            b"CS",
            &format!("ORIGINAL\\PRIMARY\\{}", marker),
        )
    }

    pub fn build(self) -> Vec<u8> {
        if !self.preamble {
            return self.bytes;
        }
        let mut out = vec![0u8; 128];
        out.extend_from_slice(b"DICM");
        out.extend(self.meta.unwrap_or_default());
        out.extend(self.bytes);
        out
    }
}

/// Wrap a header in the large PET raw data layout:
/// payload, header, header size and trailing magic string.
pub fn large_pet_raw_data(payload: &[u8], header: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(payload.len() + header.len() + 24);
    data.extend_from_slice(payload);
    data.extend_from_slice(header);
    data.extend_from_slice(&(header.len() as u32).to_le_bytes());
    data.extend_from_slice(LARGE_PET_RAW_DATA_MAGIC);
    data
}

/// Wrap a header in the PETCT_SPL layout:
/// leading magic string, header, delimiter and payload.
pub fn petct_spl(header: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut data = PETCT_SPL_MAGIC.to_vec();
    data.extend_from_slice(header);
    data.extend_from_slice(PETCT_SPL_HEADER_END);
    data.extend_from_slice(payload);
    data
}

/// Filler payload bytes.
///
/// None of them is `0xFE`,
/// so the PETCT_SPL header delimiter never appears in a payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Description of a synthetic raw data file.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFile {
    pub format: PetRawFormat,
    pub study_instance_uid: String,
    pub series_number: u32,
    pub acquisition_date: String,
    pub acquisition_time: String,
    pub payload_len: usize,
}

impl SampleFile {
    pub fn new(format: PetRawFormat) -> Self {
        SampleFile {
            format,
            study_instance_uid: "1.2.826.0.1.3680043.2.1125.1.1".to_string(),
            series_number: 602,
            acquisition_date: "20230727".to_string(),
            acquisition_time: "084911.676000".to_string(),
            payload_len: 2048,
        }
    }

    pub fn study_instance_uid(mut self, uid: impl Into<String>) -> Self {
        self.study_instance_uid = uid.into();
        self
    }

    pub fn series_number(mut self, series_number: u32) -> Self {
        self.series_number = series_number;
        self
    }

    pub fn acquisition_time(mut self, time: impl Into<String>) -> Self {
        self.acquisition_time = time.into();
        self
    }

    pub fn payload_len(mut self, len: usize) -> Self {
        self.payload_len = len;
        self
    }

    /// The embedded header of the file.
    pub fn header(&self) -> Vec<u8> {
        // formats without a marker of their own get a marker nobody knows
        let marker = self.format.markers().first().copied().unwrap_or("PET_RAW");
        HeaderBuilder::new()
            .image_type(marker)
            .text(tags::ACQUISITION_DATE, b"DA", &self.acquisition_date)
            .text(tags::ACQUISITION_TIME, b"TM", &self.acquisition_time)
            .text(tags::MODALITY, b"CS", "PT")
            .text(tags::MANUFACTURER, b"LO", "SIEMENS")
            .text(tags::STUDY_INSTANCE_UID, b"UI", &self.study_instance_uid)
            .text(tags::SERIES_NUMBER, b"IS", &self.series_number.to_string())
            .build()
    }

    /// The whole contents of the file,
    /// in the layout used by its format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = self.header();
        let payload = payload(self.payload_len);
        match self.format {
            PetRawFormat::CtSpl => petct_spl(&header, &payload),
            _ => large_pet_raw_data(&payload, &header),
        }
    }

    /// A file name in the style of the scanner's exports.
    pub fn file_name(&self, index: usize) -> String {
        let marker = self.format.markers().first().copied().unwrap_or("PET_RAW");
        format!(
            "SAMPLE.PT.{}.{}.{}.{}.{}",
            self.series_number, marker, self.acquisition_date, index, EXTENSION
        )
    }

    /// Write the file into a directory.
    pub fn write_to(&self, dir: &Path, index: usize) -> io::Result<PathBuf> {
        let path = dir.join(self.file_name(index));
        fs::write(&path, self.to_bytes())?;
        Ok(path)
    }
}

/// Write one sample file of every format which can be recognised
/// from a single file.
pub fn write_all_formats(dir: &Path) -> io::Result<Vec<PathBuf>> {
    formats::REGISTRY
        .iter()
        .filter(|entry| !entry.markers.is_empty())
        .enumerate()
        .map(|(i, entry)| SampleFile::new(entry.format).write_to(dir, i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{payload, HeaderBuilder, SampleFile};
    use crate::classify::PetRawFormat;
    use dicom_core::Tag;

    #[test]
    fn short_and_long_form_elements() {
        #[rustfmt::skip]
        let expected: &[u8] = &[
            0x08, 0x00, 0x60, 0x00, b'C', b'S', 0x02, 0x00, b'P', b'T',
            0x09, 0x00, 0x10, 0x10, b'O', b'B', 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0xAB,
            0x20, 0x00, 0x0D, 0x00, b'U', b'I', 0x04, 0x00, b'1', b'.', b'2', 0x00,
        ];
        let bytes = HeaderBuilder::new()
            .text(Tag(0x0008, 0x0060), b"CS", "PT")
            .element(Tag(0x0009, 0x1010), b"OB", &[0xAB])
            .text(Tag(0x0020, 0x000D), b"UI", "1.2")
            .build();
        assert_eq!(bytes, expected);
    }

    #[test]
    fn preamble() {
        let bytes = HeaderBuilder::new().with_preamble().build();
        assert_eq!(bytes.len(), 132);
        assert_eq!(&bytes[128..], b"DICM");
    }

    #[test]
    fn payload_never_contains_the_delimiter_start() {
        assert!(!payload(10_000).contains(&0xFE));
    }

    #[test]
    fn sample_file_names() {
        let sample = SampleFile::new(PetRawFormat::ListMode);
        assert_eq!(
            sample.file_name(3),
            "SAMPLE.PT.602.PET_LISTMODE.20230727.3.ptd"
        );
    }
}
