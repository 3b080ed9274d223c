//! Values read out of embedded DICOM headers.
use std::borrow::Cow;
use std::fmt;

/// The value of a single DICOM data element.
///
/// Only point lookups are modelled,
/// so values are either text, a list of strings or opaque bytes.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub enum TagValue {
    /// A textual value, possibly holding several
    /// backslash-delimited components.
    Text(String),
    /// A multi-valued string, already split into its components.
    Strings(Vec<String>),
    /// A value which is not valid text.
    Bytes(Vec<u8>),
}

impl TagValue {
    /// Interpret the raw bytes of an element value,
    /// preferring text when the bytes decode cleanly.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => TagValue::Text(text),
            Err(e) => TagValue::Bytes(e.into_bytes()),
        }
    }

    /// The value as a single string without trailing padding,
    /// or `None` for binary values.
    pub fn to_str(&self) -> Option<Cow<'_, str>> {
        match self {
            TagValue::Text(text) => Some(Cow::Borrowed(trim_padding(text))),
            TagValue::Strings(strings) => Some(Cow::Owned(strings.join("\\"))),
            TagValue::Bytes(_) => None,
        }
    }

    /// The backslash-delimited components of a textual value,
    /// each stripped of padding.
    pub fn components(&self) -> Option<Vec<&str>> {
        match self {
            TagValue::Text(text) => Some(trim_padding(text).split('\\').map(trim_padding).collect()),
            TagValue::Strings(strings) => Some(strings.iter().map(|s| trim_padding(s)).collect()),
            TagValue::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            TagValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Text(text) => f.write_str(trim_padding(text)),
            TagValue::Strings(strings) => f.write_str(&strings.join("\\")),
            TagValue::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// Strip the space and null characters used to pad values to even length.
fn trim_padding(s: &str) -> &str {
    s.trim_matches(|c| c == ' ' || c == '\0')
}
