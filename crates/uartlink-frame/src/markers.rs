use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const IMAGE_START: &[u8] = b"--IMAGE_START--";
pub const IMAGE_END: &[u8] = b"--IMAGE_END--";
pub const TEXT_DELIMITER: u8 = b'\n';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarkerError {
    #[error("{0} marker must not be empty")]
    Empty(&'static str),
    #[error("{0} marker must not contain the text delimiter")]
    ContainsDelimiter(&'static str),
    #[error("image start and end markers must differ")]
    Identical,
}

/// The image sentinels agreed on by both ends of the link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MarkerStrings", into = "MarkerStrings")]
pub struct Markers {
    image_start: Vec<u8>,
    image_end: Vec<u8>,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            image_start: IMAGE_START.to_vec(),
            image_end: IMAGE_END.to_vec(),
        }
    }
}

impl Markers {
    pub fn new(image_start: &[u8], image_end: &[u8]) -> Result<Self, MarkerError> {
        for (name, marker) in [("image start", image_start), ("image end", image_end)] {
            if marker.is_empty() {
                return Err(MarkerError::Empty(name));
            }
            if marker.contains(&TEXT_DELIMITER) {
                return Err(MarkerError::ContainsDelimiter(name));
            }
        }
        if image_start == image_end {
            return Err(MarkerError::Identical);
        }
        Ok(Self {
            image_start: image_start.to_vec(),
            image_end: image_end.to_vec(),
        })
    }

    pub fn image_start(&self) -> &[u8] {
        &self.image_start
    }

    pub fn image_end(&self) -> &[u8] {
        &self.image_end
    }

    /// Whether `payload` contains either image marker.
    ///
    /// Such a payload cannot be framed safely; callers may warn but the
    /// bytes are still sent as-is.
    pub fn collides(&self, payload: &[u8]) -> bool {
        find(payload, &self.image_start, 0).is_some() || find(payload, &self.image_end, 0).is_some()
    }

    /// Whether text `content` would not arrive as exactly one text frame:
    /// it holds the delimiter or an image marker.
    pub fn collides_text(&self, content: &[u8]) -> bool {
        content.contains(&TEXT_DELIMITER) || self.collides(content)
    }
}

#[derive(Serialize, Deserialize)]
struct MarkerStrings {
    image_start: String,
    image_end: String,
}

impl TryFrom<MarkerStrings> for Markers {
    type Error = MarkerError;

    fn try_from(raw: MarkerStrings) -> Result<Self, Self::Error> {
        Markers::new(raw.image_start.as_bytes(), raw.image_end.as_bytes())
    }
}

impl From<Markers> for MarkerStrings {
    fn from(markers: Markers) -> Self {
        Self {
            image_start: String::from_utf8_lossy(&markers.image_start).into_owned(),
            image_end: String::from_utf8_lossy(&markers.image_end).into_owned(),
        }
    }
}

/// First occurrence of `needle` in `haystack` at or after `from`.
pub(crate) fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_markers() {
        let markers = Markers::default();
        assert_eq!(markers.image_start(), b"--IMAGE_START--");
        assert_eq!(markers.image_end(), b"--IMAGE_END--");
    }

    #[test]
    fn test_rejects_bad_markers() {
        assert_eq!(Markers::new(b"", b"END"), Err(MarkerError::Empty("image start")));
        assert_eq!(
            Markers::new(b"START", b"E\nD"),
            Err(MarkerError::ContainsDelimiter("image end"))
        );
        assert_eq!(Markers::new(b"SAME", b"SAME"), Err(MarkerError::Identical));
    }

    #[test]
    fn test_collides() {
        let markers = Markers::default();
        assert!(markers.collides(b"abc--IMAGE_END--def"));
        assert!(markers.collides(b"--IMAGE_START--"));
        assert!(!markers.collides(b"--IMAGE_"));
    }

    #[test]
    fn test_collides_text() {
        let markers = Markers::default();
        assert!(markers.collides_text(b"two\nlines"));
        assert!(markers.collides_text(b"x--IMAGE_START--"));
        assert!(!markers.collides_text(b"plain text"));
        assert!(!markers.collides(b"two\nlines"));
    }

    #[test]
    fn test_find_from_offset() {
        assert_eq!(find(b"abab", b"ab", 0), Some(0));
        assert_eq!(find(b"abab", b"ab", 1), Some(2));
        assert_eq!(find(b"abab", b"ab", 3), None);
        assert_eq!(find(b"ab", b"ab", 9), None);
    }

    #[test]
    fn test_serde_validates() {
        let markers: Markers =
            serde_json::from_str(r#"{"image_start":"<<IMG","image_end":"IMG>>"}"#).unwrap();
        assert_eq!(markers.image_start(), b"<<IMG");

        let json = serde_json::to_string(&Markers::default()).unwrap();
        assert!(json.contains("--IMAGE_START--"));

        let bad = serde_json::from_str::<Markers>(r#"{"image_start":"","image_end":"x"}"#);
        assert!(bad.is_err());
    }
}
