//! Text normalization: byte decoding with a fallback ladder and RFC 2047
//! encoded-word decoding for header values.

use std::borrow::Cow;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::model::message::RawText;

/// Base64 engine for encoded words; senders routinely drop the padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

type Decoder = fn(&[u8]) -> Option<String>;

/// Decoders tried in order for bytes of unknown encoding.
const LADDER: [(&str, Decoder); 5] = [
    ("utf-8", decode_utf8),
    ("windows-1251", decode_windows_1251),
    ("windows-1252", decode_windows_1252),
    ("latin-1", decode_latin1),
    ("ascii", decode_ascii),
];

/// Turn raw container text into a `String`. Never fails.
///
/// Text passes through unchanged. Bytes are decoded with the first encoding
/// of the ladder that accepts them; if none does, UTF-8 with U+FFFD
/// replacement is used.
pub fn normalize(raw: &RawText) -> String {
    match raw {
        RawText::Text(s) => s.clone(),
        RawText::Bytes(bytes) => normalize_bytes(bytes),
    }
}

/// Byte-slice form of [`normalize`].
pub fn normalize_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    LADDER
        .iter()
        .find_map(|(_, decode)| decode(bytes))
        .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned())
}

fn decode_utf8(bytes: &[u8]) -> Option<String> {
    std::str::from_utf8(bytes).ok().map(str::to_string)
}

fn decode_windows_1251(bytes: &[u8]) -> Option<String> {
    decode_strict(encoding_rs::WINDOWS_1251, bytes)
}

fn decode_windows_1252(bytes: &[u8]) -> Option<String> {
    decode_strict(encoding_rs::WINDOWS_1252, bytes)
}

/// ISO-8859-1 proper: every byte maps to the code point of the same value.
fn decode_latin1(bytes: &[u8]) -> Option<String> {
    Some(bytes.iter().map(|&b| b as char).collect())
}

fn decode_ascii(bytes: &[u8]) -> Option<String> {
    bytes
        .is_ascii()
        .then(|| bytes.iter().map(|&b| b as char).collect())
}

fn decode_strict(encoding: &'static encoding_rs::Encoding, bytes: &[u8]) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
}

/// Decode RFC 2047 encoded words in a header value. Never fails.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Literal text and decoded words are concatenated in their original order;
/// whitespace between two adjacent encoded words is dropped (RFC 2047 §6.2).
/// A word with an unknown charset or undecodable bytes is decoded as lossy
/// UTF-8 and reported. If a word is structurally broken, the whole value is
/// returned unchanged.
pub fn decode_header(value: &str, diagnostics: &dyn Diagnostics) -> String {
    if !value.contains("=?") {
        return value.to_string();
    }

    let mut result = String::with_capacity(value.len());
    let mut remaining = value;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];
        match parse_encoded_word(after_start) {
            WordParse::Decoded(word) => {
                result.push_str(&decode_word_bytes(word.charset, &word.bytes, diagnostics));
                remaining = &after_start[word.consumed..];
                last_was_encoded = true;
            }
            WordParse::NotAWord => {
                result.push_str("=?");
                remaining = after_start;
                last_was_encoded = false;
            }
            WordParse::Broken => {
                diagnostics.report(Diagnostic::new(
                    DiagnosticKind::HeaderDecode,
                    format!("malformed encoded word, keeping literal header: {value}"),
                ));
                return value.to_string();
            }
        }
    }

    result.push_str(remaining);
    result
}

struct EncodedWord<'a> {
    charset: &'a str,
    bytes: Vec<u8>,
    /// Bytes consumed after the leading `=?`.
    consumed: usize,
}

enum WordParse<'a> {
    Decoded(EncodedWord<'a>),
    /// The `=?` did not start an encoded word; treat it as literal text.
    NotAWord,
    /// Well-delimited word whose payload cannot be decoded.
    Broken,
}

fn parse_encoded_word(s: &str) -> WordParse<'_> {
    // charset?encoding?encoded_text?=
    let Some(first_q) = s.find('?') else {
        return WordParse::NotAWord;
    };
    let charset = &s[..first_q];
    let rest = &s[first_q + 1..];
    let Some(second_q) = rest.find('?') else {
        return WordParse::NotAWord;
    };
    let encoding = &rest[..second_q];
    let payload_area = &rest[second_q + 1..];
    let Some(end) = payload_area.find("?=") else {
        return WordParse::NotAWord;
    };
    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return WordParse::NotAWord;
    }
    let payload = &payload_area[..end];

    let bytes = if encoding.eq_ignore_ascii_case("B") {
        match LENIENT_BASE64.decode(payload.trim()) {
            Ok(bytes) => bytes,
            Err(_) => return WordParse::Broken,
        }
    } else if encoding.eq_ignore_ascii_case("Q") {
        decode_q(payload)
    } else {
        return WordParse::NotAWord;
    };

    WordParse::Decoded(EncodedWord {
        charset,
        bytes,
        consumed: first_q + 1 + second_q + 1 + end + 2,
    })
}

/// Q-encoding (RFC 2047 §4.2): `_` is a space, `=XX` is a byte.
fn decode_q(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                out.push(b' ');
                i += 1;
            }
            b'=' => {
                match hex_pair(&bytes[i + 1..]) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

/// Parse two leading hex digits.
pub(crate) fn hex_pair(bytes: &[u8]) -> Option<u8> {
    let digits = bytes.get(..2)?;
    let hi = (digits[0] as char).to_digit(16)?;
    let lo = (digits[1] as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

/// Decode the bytes of one word using its declared charset.
fn decode_word_bytes(charset: &str, bytes: &[u8], diagnostics: &dyn Diagnostics) -> String {
    // RFC 2231 allows a language suffix: "utf-8*en"
    let label = charset.split('*').next().unwrap_or(charset);

    let Some(encoding) = encoding_rs::Encoding::for_label(label.trim().as_bytes()) else {
        diagnostics.report(Diagnostic::new(
            DiagnosticKind::HeaderDecode,
            format!("unknown charset '{charset}', decoding as UTF-8"),
        ));
        return String::from_utf8_lossy(bytes).into_owned();
    };

    match decode_strict(encoding, bytes) {
        Some(text) => text,
        None => {
            diagnostics.report(Diagnostic::new(
                DiagnosticKind::HeaderDecode,
                format!("invalid {charset} bytes in encoded word, decoding as UTF-8"),
            ));
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnostics;

    fn decode(input: &str) -> String {
        decode_header(input, &CollectingDiagnostics::new())
    }

    #[test]
    fn test_normalize_text_passthrough() {
        assert_eq!(normalize(&RawText::from("héllo")), "héllo");
    }

    #[test]
    fn test_normalize_utf8_bytes() {
        assert_eq!(normalize(&RawText::Bytes("Привет".as_bytes().to_vec())), "Привет");
    }

    #[test]
    fn test_normalize_windows_1251_bytes() {
        // "Привет" in windows-1251
        let bytes = vec![0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2];
        assert_eq!(normalize(&RawText::Bytes(bytes)), "Привет");
    }

    #[test]
    fn test_normalize_strips_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"body");
        assert_eq!(normalize_bytes(&bytes), "body");
    }

    #[test]
    fn test_normalize_arbitrary_bytes_terminates() {
        let all: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let text = normalize_bytes(&all);
        assert!(!text.is_empty());
    }

    #[test]
    fn test_decode_base64_word() {
        assert_eq!(decode("=?UTF-8?B?SG9sYSBtdW5kbw==?="), "Hola mundo");
    }

    #[test]
    fn test_decode_base64_word_without_padding() {
        assert_eq!(decode("=?UTF-8?B?SG9sYSBtdW5kbw?="), "Hola mundo");
    }

    #[test]
    fn test_decode_q_word() {
        assert_eq!(decode("=?ISO-8859-1?Q?R=E9sum=E9_du_projet?="), "Résumé du projet");
    }

    #[test]
    fn test_decode_adjacent_words_drop_whitespace() {
        assert_eq!(decode("=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="), "Hola mundo");
    }

    #[test]
    fn test_decode_mixed_literal_and_encoded() {
        assert_eq!(decode("Re: =?UTF-8?B?SG9sYQ==?= there"), "Re: Hola there");
    }

    #[test]
    fn test_decode_windows_1251_word() {
        // "Тест" in windows-1251, Q-encoded
        assert_eq!(decode("=?windows-1251?Q?=D2=E5=F1=F2?="), "Тест");
    }

    #[test]
    fn test_unknown_charset_falls_back_to_utf8() {
        let sink = CollectingDiagnostics::new();
        let out = decode_header("=?x-klingon?Q?abc?=", &sink);
        assert_eq!(out, "abc");
        assert_eq!(sink.count(DiagnosticKind::HeaderDecode), 1);
    }

    #[test]
    fn test_broken_base64_returns_original() {
        let input = "Subj =?utf-8?B?!!!!?=";
        assert_eq!(decode(input), input);
    }

    #[test]
    fn test_not_a_word_is_literal() {
        assert_eq!(decode("a =? b"), "a =? b");
    }
}
