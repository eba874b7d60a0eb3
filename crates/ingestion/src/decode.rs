//! Text decoding with fallback encodings.

use encoding_rs::{Encoding, UTF_8};

use crate::issue::FileIssue;

/// Decoded file contents and the encoding that succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
}

/// Decode `bytes` as UTF-8, then as each fallback in order.
///
/// A byte-order mark selects its encoding directly and is stripped. Decoding
/// never substitutes replacement characters: an encoding either maps every
/// byte or is skipped.
pub fn decode(bytes: &[u8], fallbacks: &[&'static Encoding]) -> Result<DecodedText, FileIssue> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_len..]) {
            return Ok(DecodedText {
                text: text.into_owned(),
                encoding: encoding.name(),
            });
        }
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(DecodedText {
            text: text.to_string(),
            encoding: UTF_8.name(),
        });
    }

    for encoding in fallbacks {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return Ok(DecodedText {
                text: text.into_owned(),
                encoding: encoding.name(),
            });
        }
    }

    let mut tried = vec![UTF_8.name().to_string()];
    tried.extend(fallbacks.iter().map(|e| e.name().to_string()));
    Err(FileIssue::EncodingError(tried))
}
