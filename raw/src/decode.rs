//! Decoding of embedded DICOM headers into tag-value mappings.
//!
//! Reading a whole header is delegated to a [`HeaderDecoder`],
//! supplied by the caller.
//! [`DicomObjectDecoder`] parses the header with `dicom-object`,
//! while [`ScanDecoder`] only relies on the raw element scanner.
//! Any closure of the right signature is also a decoder.
use crate::error::ReadError;
use crate::scan::{self, data_set_offset};
use crate::value::TagValue;
use dicom_core::value::Value;
use dicom_core::{Tag, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_encoding::transfer_syntax::TransferSyntaxIndex;
use dicom_object::file::ReadPreamble;
use dicom_object::mem::{InMemDicomObject, InMemElement};
use dicom_object::OpenFileOptions;
use dicom_transfer_syntax_registry::TransferSyntaxRegistry;
use snafu::{Backtrace, OptionExt, ResultExt, Snafu};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

/// The decoded contents of a header.
pub type HeaderMetadata = BTreeMap<Tag, TagValue>;

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Group number of the file meta information, little endian.
const META_GROUP: [u8; 2] = [0x02, 0x00];

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Could not read header bytes"))]
    ReadHeader {
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not parse header as DICOM"))]
    ParseHeader { source: BoxedError },
    #[snafu(display("Could not scan header elements"))]
    ScanHeader { source: ReadError },
    #[snafu(display("Transfer syntax `{}` is not available", uid))]
    MissingTransferSyntax {
        uid: &'static str,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A capability to decode the DICOM header of a raw data file.
///
/// The source is positioned at the start of the header
/// and ends where the header ends.
/// When `tags` is given,
/// only those tags need to be present in the result.
pub trait HeaderDecoder {
    fn decode(&self, source: &mut dyn Read, tags: Option<&[Tag]>) -> Result<HeaderMetadata>;
}

impl<F> HeaderDecoder for F
where
    F: Fn(&mut dyn Read, Option<&[Tag]>) -> Result<HeaderMetadata>,
{
    fn decode(&self, source: &mut dyn Read, tags: Option<&[Tag]>) -> Result<HeaderMetadata> {
        self(source, tags)
    }
}

/// Decodes headers with the full DICOM parser of `dicom-object`.
///
/// Headers with a preamble, with only the `DICM` magic code,
/// or consisting of a bare explicit VR little endian data set
/// are all accepted.
/// A file meta group is read when one follows the magic code,
/// otherwise the data set is read as explicit VR little endian.
#[derive(Debug, Clone, PartialEq)]
pub struct DicomObjectDecoder {
    read_until: Option<Tag>,
}

impl Default for DicomObjectDecoder {
    fn default() -> Self {
        DicomObjectDecoder {
            read_until: Some(tags::PIXEL_DATA),
        }
    }
}

impl DicomObjectDecoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Stop parsing once this tag is reached.
    pub fn read_until(mut self, tag: Tag) -> Self {
        self.read_until = Some(tag);
        self
    }

    /// Parse the header to the end.
    pub fn read_all(mut self) -> Self {
        self.read_until = None;
        self
    }
}

impl HeaderDecoder for DicomObjectDecoder {
    fn decode(&self, source: &mut dyn Read, tags: Option<&[Tag]>) -> Result<HeaderMetadata> {
        let mut buffer = Vec::new();
        source.read_to_end(&mut buffer).context(ReadHeaderSnafu)?;

        let offset = data_set_offset(&buffer);
        if offset > 0 && buffer[offset..].starts_with(&META_GROUP) {
            // keep the magic code, which the file reader expects
            buffer.drain(..offset - 4);
            let mut options = OpenFileOptions::new().read_preamble(ReadPreamble::Never);
            if let Some(tag) = self.read_until {
                options = options.read_until(tag);
            }
            let obj = options
                .from_reader(Cursor::new(buffer))
                .map_err(|e| Error::ParseHeader {
                    source: Box::new(e),
                })?;
            Ok(collect(&obj, tags))
        } else {
            // no file meta group, the data elements follow right away
            buffer.drain(..offset);
            let ts = TransferSyntaxRegistry
                .get(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .context(MissingTransferSyntaxSnafu {
                    uid: uids::EXPLICIT_VR_LITTLE_ENDIAN,
                })?;
            let obj = InMemDicomObject::read_dataset_with_ts(Cursor::new(buffer), ts).map_err(
                |e| Error::ParseHeader {
                    source: Box::new(e),
                },
            )?;
            Ok(collect(&obj, tags))
        }
    }
}

fn collect(obj: &InMemDicomObject, tags: Option<&[Tag]>) -> HeaderMetadata {
    obj.into_iter()
        .filter(|elem| tags.map_or(true, |tags| tags.contains(&elem.header().tag)))
        .filter_map(|elem| Some((elem.header().tag, element_value(elem)?)))
        .collect()
}

fn element_value(elem: &InMemElement) -> Option<TagValue> {
    let Value::Primitive(value) = elem.value() else {
        // sequences and encapsulated pixel data are not mapped
        return None;
    };
    match elem.header().vr {
        VR::OB | VR::OW | VR::OF | VR::OD | VR::OL | VR::UN => {
            Some(TagValue::Bytes(value.to_bytes().into_owned()))
        }
        _ => match value.strings() {
            Ok(strings) if strings.len() > 1 => Some(TagValue::Strings(strings.to_vec())),
            _ => Some(TagValue::Text(value.to_str().into_owned())),
        },
    }
}

/// Decodes headers with the raw element scanner alone.
///
/// Values are kept as they appear in the header,
/// and sequences must have an explicit length.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub struct ScanDecoder;

impl HeaderDecoder for ScanDecoder {
    fn decode(&self, source: &mut dyn Read, tags: Option<&[Tag]>) -> Result<HeaderMetadata> {
        let mut buffer = Vec::new();
        source.read_to_end(&mut buffer).context(ReadHeaderSnafu)?;
        let data = &buffer[data_set_offset(&buffer)..];

        match tags {
            Some(tags) => scan::find_tags(data, tags).context(ScanHeaderSnafu),
            None => scan::raw_elements(data)
                .map(|element| element.map(|e| (e.tag, e.into_value())))
                .collect::<Result<HeaderMetadata, ReadError>>()
                .context(ScanHeaderSnafu),
        }
    }
}
