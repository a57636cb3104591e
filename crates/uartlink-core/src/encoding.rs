use encoding_rs::{GBK, UTF_16LE, UTF_8};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Character set used to render received text frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Auto,
    Utf8,
    Utf16,
    Ascii,
    Gbk,
}

#[derive(Debug, Error)]
#[error("unknown text encoding {0:?}")]
pub struct UnknownEncoding(pub String);

impl std::str::FromStr for TextEncoding {
    type Err = UnknownEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "AUTO" => Self::Auto,
            "UTF-8" | "UTF8" => Self::Utf8,
            "UTF-16" | "UTF16" => Self::Utf16,
            "ASCII" => Self::Ascii,
            "GBK" | "GB2312" => Self::Gbk,
            _ => return Err(UnknownEncoding(s.to_string())),
        })
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Utf8 => "UTF-8",
            Self::Utf16 => "UTF-16",
            Self::Ascii => "ASCII",
            Self::Gbk => "GBK",
        })
    }
}

impl TextEncoding {
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            Self::Auto => detect_and_decode(bytes),
            Self::Utf8 => UTF_8.decode(bytes).0,
            Self::Utf16 => UTF_16LE.decode(bytes).0,
            Self::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '?' })
                .collect::<String>()
                .into(),
            Self::Gbk => GBK.decode(bytes).0,
        }
    }
}

fn detect_and_decode(bytes: &[u8]) -> Cow<'_, str> {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Cow::Borrowed(s);
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true).decode(bytes).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("utf-8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert_eq!("GB2312".parse::<TextEncoding>().unwrap(), TextEncoding::Gbk);
        assert_eq!("auto".parse::<TextEncoding>().unwrap(), TextEncoding::Auto);
        assert!("EBCDIC".parse::<TextEncoding>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        for encoding in [
            TextEncoding::Auto,
            TextEncoding::Utf8,
            TextEncoding::Utf16,
            TextEncoding::Ascii,
            TextEncoding::Gbk,
        ] {
            assert_eq!(encoding.to_string().parse::<TextEncoding>().unwrap(), encoding);
        }
    }

    #[test]
    fn test_decode() {
        assert_eq!(TextEncoding::Auto.decode("héllo".as_bytes()), "héllo");
        assert_eq!(TextEncoding::Ascii.decode(&[b'o', b'k', 0xff]), "ok?");
        assert_eq!(TextEncoding::Gbk.decode(&[0xc4, 0xe3, 0xba, 0xc3]), "你好");
        assert_eq!(TextEncoding::Auto.decode(b""), "");
    }
}
