//! A fast path for reading individual data elements
//! out of explicit VR little endian data sets.
//!
//! The scanner does not interpret the data set:
//! it walks element by element,
//! skipping values until the requested tag is found.
//! This is enough to classify raw data files
//! without involving a full DICOM parser,
//! and it tolerates the non-standard bytes around embedded headers.
//!
//! Only the VRs `OB`, `OW`, `OF`, `SQ`, `UT` and `UN`
//! are read with a reserved field and a 32-bit length.
//! Every other VR, including unknown ones,
//! is read with a 16-bit length.
use crate::error::{IoSnafu, ReadError, TruncatedElementSnafu};
use crate::value::TagValue;
use byteordered::byteorder::{ByteOrder, LittleEndian};
use dicom_core::{Tag, VR};
use snafu::{ensure, ResultExt};
use std::collections::BTreeMap;
use std::io::{self, ErrorKind, Read};

/// VRs encoded with 2 reserved bytes followed by a 32-bit value length.
const LONG_FORM_VRS: [[u8; 2]; 6] = [*b"OB", *b"OW", *b"OF", *b"SQ", *b"UT", *b"UN"];

/// Length of the preamble which precedes the `DICM` magic code.
const PREAMBLE_LENGTH: usize = 128;

const DICM_MAGIC: &[u8; 4] = b"DICM";

const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Whether elements of the given VR are encoded in long form
/// (reserved bytes and a 32-bit length).
pub fn is_long_form(vr: [u8; 2]) -> bool {
    LONG_FORM_VRS.contains(&vr)
}

/// Determine where the data elements start,
/// given the first bytes of an embedded header.
///
/// Headers may carry the 128-byte preamble and `DICM` magic code,
/// only the magic code,
/// or start directly with the first data element.
pub fn data_set_offset(prefix: &[u8]) -> usize {
    let magic_end = PREAMBLE_LENGTH + DICM_MAGIC.len();
    if prefix.len() >= magic_end && &prefix[PREAMBLE_LENGTH..magic_end] == DICM_MAGIC {
        magic_end
    } else if prefix.starts_with(DICM_MAGIC) {
        DICM_MAGIC.len()
    } else {
        0
    }
}

/// The number of leading bytes [`data_set_offset`] needs to look at.
pub const DATA_SET_PREFIX_LENGTH: usize = PREAMBLE_LENGTH + 4;

/// A data element as found by the scanner.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RawElement {
    pub tag: Tag,
    /// the two VR characters as they appear in the stream
    pub vr: [u8; 2],
    pub value: Vec<u8>,
}

impl RawElement {
    /// The value representation,
    /// if it is one known to the standard.
    pub fn vr(&self) -> Option<VR> {
        VR::from_binary(self.vr)
    }

    pub fn to_value(&self) -> TagValue {
        TagValue::from_bytes(self.value.clone())
    }

    pub fn into_value(self) -> TagValue {
        TagValue::from_bytes(self.value)
    }
}

/// An iterator over the data elements of an explicit VR little endian stream.
///
/// Iteration ends when fewer than 4 bytes are left for the next tag,
/// or after an element of undefined length,
/// whose value is taken to be the rest of the stream.
/// Any other truncation yields an error,
/// after which the iterator is exhausted.
#[derive(Debug)]
pub struct RawElements<R> {
    source: R,
    done: bool,
}

/// Walk the data elements of an explicit VR little endian stream.
pub fn raw_elements<R>(source: R) -> RawElements<R>
where
    R: Read,
{
    RawElements {
        source,
        done: false,
    }
}

impl<R> RawElements<R>
where
    R: Read,
{
    fn read_element(&mut self) -> Result<Option<RawElement>, ReadError> {
        let mut buf = [0u8; 4];
        let n = read_up_to(&mut self.source, &mut buf).context(IoSnafu)?;
        if n < buf.len() {
            return Ok(None);
        }
        let tag = Tag(
            LittleEndian::read_u16(&buf[0..2]),
            LittleEndian::read_u16(&buf[2..4]),
        );

        let mut vr = [0u8; 2];
        read_field(&mut self.source, &mut vr, tag, "value representation")?;

        let len = if is_long_form(vr) {
            read_field(&mut self.source, &mut buf[0..2], tag, "reserved bytes")?;
            read_field(&mut self.source, &mut buf, tag, "value length")?;
            LittleEndian::read_u32(&buf)
        } else {
            read_field(&mut self.source, &mut buf[0..2], tag, "value length")?;
            u32::from(LittleEndian::read_u16(&buf[0..2]))
        };
        let mut value = Vec::new();
        if len == UNDEFINED_LENGTH {
            // the value takes up the rest of the stream
            self.source.read_to_end(&mut value).context(IoSnafu)?;
            self.done = true;
            return Ok(Some(RawElement { tag, vr, value }));
        }

        // do not trust the length enough to allocate it upfront
        (&mut self.source)
            .take(u64::from(len))
            .read_to_end(&mut value)
            .context(IoSnafu)?;
        ensure!(
            value.len() as u64 == u64::from(len),
            TruncatedElementSnafu {
                tag,
                field: "value",
            }
        );

        Ok(Some(RawElement { tag, vr, value }))
    }
}

impl<R> Iterator for RawElements<R>
where
    R: Read,
{
    type Item = Result<RawElement, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_element() {
            Ok(Some(element)) => Some(Ok(element)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Look for a single data element and return its value,
/// or `None` if the stream ends before it is found.
pub fn find_tag<R>(source: R, tag: Tag) -> Result<Option<TagValue>, ReadError>
where
    R: Read,
{
    for element in raw_elements(source) {
        let element = element?;
        if element.tag == tag {
            return Ok(Some(element.into_value()));
        }
    }
    Ok(None)
}

/// Look for several data elements in a single pass.
///
/// Scanning stops as soon as all of them have been found.
/// Tags which are not present are left out of the returned map.
pub fn find_tags<R>(source: R, tags: &[Tag]) -> Result<BTreeMap<Tag, TagValue>, ReadError>
where
    R: Read,
{
    let mut found = BTreeMap::new();
    if tags.is_empty() {
        return Ok(found);
    }
    for element in raw_elements(source) {
        let element = element?;
        if tags.contains(&element.tag) && !found.contains_key(&element.tag) {
            found.insert(element.tag, element.into_value());
            if found.len() == tags.len() {
                break;
            }
        }
    }
    Ok(found)
}

fn read_field<R>(
    source: &mut R,
    buf: &mut [u8],
    tag: Tag,
    field: &'static str,
) -> Result<(), ReadError>
where
    R: Read,
{
    let n = read_up_to(source, buf).context(IoSnafu)?;
    ensure!(n == buf.len(), TruncatedElementSnafu { tag, field });
    Ok(())
}

/// Fill as much of `buf` as the source allows,
/// returning the number of bytes read.
pub(crate) fn read_up_to<R>(source: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: Read + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::{data_set_offset, find_tag, find_tags, is_long_form, raw_elements};
    use crate::error::{Mismatch, ReadError};
    use crate::value::TagValue;
    use dicom_core::{Tag, VR};

    // manually crafting some data elements
    #[rustfmt::skip]
    const RAW: &[u8] = &[
        0x08, 0x00, 0x60, 0x00,     // (0008,0060) Modality
            b'C', b'S',             // VR: CS
            0x02, 0x00,             // Length: 2 bytes
                b'P', b'T',
        0x09, 0x00, 0x10, 0x10,     // (0009,1010) private element
            b'O', b'B',             // VR: OB
            0x00, 0x00,             // reserved
            0x03, 0x00, 0x00, 0x00, // Length: 3 bytes
                0xFF, 0xFE, 0xFD,
        0x20, 0x00, 0x11, 0x00,     // (0020,0011) Series Number
            b'I', b'S',             // VR: IS
            0x02, 0x00,             // Length: 2 bytes
                b'7', b' ',
    ];

    #[test]
    fn finds_second_element() {
        let value = find_tag(RAW, Tag(0x0009, 0x1010)).unwrap();
        assert_eq!(value, Some(TagValue::Bytes(vec![0xFF, 0xFE, 0xFD])));
    }

    #[test]
    fn finds_text_elements() {
        let value = find_tag(RAW, Tag(0x0020, 0x0011)).unwrap().unwrap();
        assert_eq!(value, TagValue::Text("7 ".to_string()));
        assert_eq!(value.to_str().unwrap(), "7");
    }

    #[test]
    fn missing_tag_is_none() {
        assert_eq!(find_tag(RAW, Tag(0x0010, 0x0010)).unwrap(), None);
        assert_eq!(find_tag(&[][..], Tag(0x0010, 0x0010)).unwrap(), None);
    }

    #[test]
    fn partial_trailing_tag_ends_the_scan() {
        let mut data = RAW.to_vec();
        data.extend_from_slice(&[0x10, 0x00, 0x10]);
        assert_eq!(find_tag(&data[..], Tag(0x0010, 0x0010)).unwrap(), None);
        assert_eq!(raw_elements(&data[..]).count(), 3);
    }

    #[test]
    fn truncated_value_is_a_mismatch() {
        let data = &RAW[..RAW.len() - 1];
        let err = find_tag(data, Tag(0x0010, 0x0010)).unwrap_err();
        assert!(matches!(
            err,
            ReadError::Mismatch {
                source: Mismatch::TruncatedElement { field: "value", .. }
            }
        ));
    }

    #[test]
    fn truncated_length_is_a_mismatch() {
        // tag and VR of the first element, then one byte of its length
        let data = &RAW[..7];
        let err = find_tag(data, Tag(0x0010, 0x0010)).unwrap_err();
        assert!(err.is_mismatch());
    }

    #[test]
    fn undefined_length_takes_the_rest_of_the_stream() {
        #[rustfmt::skip]
        let data: &[u8] = &[
            0x54, 0x00, 0x16, 0x00,     // (0054,0016) Radiopharmaceutical Information Sequence
                b'S', b'Q',
                0x00, 0x00,
                0xFF, 0xFF, 0xFF, 0xFF, // undefined length
            0xFE, 0xFF, 0x00, 0xE0,     // (FFFE,E000) item
                0xFF, 0xFF, 0xFF, 0xFF,
            0x08, 0x00, 0x08, 0x00,     // (0008,0008) nested, never reached
                b'C', b'S',
                0x02, 0x00,
                    b'X', b' ',
        ];
        assert_eq!(find_tag(data, Tag(0x0008, 0x0008)).unwrap(), None);

        let elements: Vec<_> = raw_elements(data).collect::<Result<_, _>>().unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].tag, Tag(0x0054, 0x0016));
        assert_eq!(elements[0].value, &data[12..]);
    }

    #[test]
    fn unknown_vrs_use_the_short_form() {
        #[rustfmt::skip]
        let data: &[u8] = &[
            0x29, 0x00, 0x10, 0x10,     // (0029,1010)
                b'U', b'C',             // VR: UC (long form in the standard)
                0x02, 0x00,             // read as a 16-bit length here
                    b'A', b'B',
            0x29, 0x00, 0x20, 0x10,     // (0029,1020)
                b'?', b'?',             // VR: not a VR at all
                0x02, 0x00,
                    b'C', b'D',
        ];
        let values = find_tags(data, &[Tag(0x0029, 0x1010), Tag(0x0029, 0x1020)]).unwrap();
        assert_eq!(values[&Tag(0x0029, 0x1010)], TagValue::Text("AB".into()));
        assert_eq!(values[&Tag(0x0029, 0x1020)], TagValue::Text("CD".into()));
    }

    #[test]
    fn long_form_vrs() {
        for vr in [b"OB", b"OW", b"OF", b"SQ", b"UT", b"UN"] {
            assert!(is_long_form(*vr));
        }
        for vr in [b"CS", b"UC", b"UR", b"OD", b"OL"] {
            assert!(!is_long_form(*vr));
        }
    }

    #[test]
    fn elements_expose_their_vr() {
        let elements: Vec<_> = raw_elements(RAW).collect::<Result<_, _>>().unwrap();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0].vr(), Some(VR::CS));
        assert_eq!(elements[1].vr(), Some(VR::OB));
        assert_eq!(elements[2].tag, Tag(0x0020, 0x0011));
    }

    #[test]
    fn find_several_tags() {
        let values = find_tags(RAW, &[Tag(0x0020, 0x0011), Tag(0x0008, 0x0060), Tag(1, 1)]).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[&Tag(0x0008, 0x0060)], TagValue::Text("PT".into()));
    }

    #[test]
    fn data_set_offsets() {
        let mut with_preamble = vec![0u8; 128];
        with_preamble.extend_from_slice(b"DICM");
        with_preamble.extend_from_slice(RAW);
        assert_eq!(data_set_offset(&with_preamble), 132);

        let mut magic_only = b"DICM".to_vec();
        magic_only.extend_from_slice(RAW);
        assert_eq!(data_set_offset(&magic_only), 4);

        assert_eq!(data_set_offset(RAW), 0);
    }
}
