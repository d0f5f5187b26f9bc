//! Encoding cascade for CMS source files.
//!
//! CMS publishes a mix of UTF-8, Windows-1252, and the occasional
//! UTF-16 export. Detection runs on a bounded head of the file:
//! BOM strip first, then strict UTF-8, then CP1252, then Latin-1,
//! which cannot fail. The chosen encoding and whether a fallback was
//! used are reported so the metrics can record them.

use encoding_rs::{UTF_16BE, UTF_16LE, WINDOWS_1252};

/// Detection window; only the head participates in sniffing.
const HEAD_LIMIT: usize = 8 * 1024;

/// Decoded body plus provenance of the decode.
#[derive(Debug, Clone)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
    /// True when the strict UTF-8 path was not taken.
    pub fallback: bool,
}

/// Decode a full file body using head-based detection.
#[must_use]
pub fn decode_with_cascade(bytes: &[u8]) -> DecodedText {
    // BOM dispatch first.
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        let rest = &bytes[3..];
        if let Ok(text) = std::str::from_utf8(rest) {
            return DecodedText {
                text: text.to_string(),
                encoding: "utf-8-bom",
                fallback: false,
            };
        }
        return decode_cp1252_or_latin1(rest);
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        let (cow, _, _) = UTF_16LE.decode(bytes);
        return DecodedText {
            text: cow.into_owned(),
            encoding: "utf-16-le",
            fallback: false,
        };
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let (cow, _, _) = UTF_16BE.decode(bytes);
        return DecodedText {
            text: cow.into_owned(),
            encoding: "utf-16-be",
            fallback: false,
        };
    }

    // Strict UTF-8, sniffed on the head then applied to the body.
    let head = &bytes[..bytes.len().min(HEAD_LIMIT)];
    let head_is_utf8 = match std::str::from_utf8(head) {
        Ok(_) => true,
        // A multi-byte sequence can straddle the head boundary; only
        // treat the head as non-UTF-8 when the error is interior.
        Err(e) => e.valid_up_to() + 4 >= head.len() && head.len() == HEAD_LIMIT,
    };
    if head_is_utf8 {
        if let Ok(text) = std::str::from_utf8(bytes) {
            return DecodedText {
                text: text.to_string(),
                encoding: "utf-8",
                fallback: false,
            };
        }
    }

    decode_cp1252_or_latin1(bytes)
}

fn decode_cp1252_or_latin1(bytes: &[u8]) -> DecodedText {
    let (cow, _, had_errors) = WINDOWS_1252.decode(bytes);
    if !had_errors {
        return DecodedText {
            text: cow.into_owned(),
            encoding: "windows-1252",
            fallback: true,
        };
    }
    // Latin-1 maps every byte; this branch cannot fail.
    DecodedText {
        text: bytes.iter().map(|&b| b as char).collect(),
        encoding: "latin-1",
        fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_utf8_is_not_a_fallback() {
        let d = decode_with_cascade("hcpcs,work_rvu\n99213,1.30\n".as_bytes());
        assert_eq!(d.encoding, "utf-8");
        assert!(!d.fallback);
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("cf_type,cf_value\n".as_bytes());
        let d = decode_with_cascade(&bytes);
        assert_eq!(d.encoding, "utf-8-bom");
        assert!(d.text.starts_with("cf_type"));
        assert!(!d.text.contains('\u{feff}'));
    }

    #[test]
    fn cp1252_smart_quote_decodes() {
        // 0x92 is a right single quote in CP1252 and invalid UTF-8.
        let bytes = b"O\x92Brien County";
        let d = decode_with_cascade(bytes);
        assert_eq!(d.encoding, "windows-1252");
        assert!(d.fallback);
        assert_eq!(d.text, "O\u{2019}Brien County");
    }

    #[test]
    fn utf16_le_bom_decodes() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "ab".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let d = decode_with_cascade(&bytes);
        assert_eq!(d.encoding, "utf-16-le");
        assert_eq!(d.text, "ab");
    }

    #[test]
    fn empty_input_is_utf8() {
        let d = decode_with_cascade(b"");
        assert_eq!(d.encoding, "utf-8");
        assert_eq!(d.text, "");
    }
}
