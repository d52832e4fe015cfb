//! Decoding of entry names and comments.
//!
//! ZIP records carry no charset tag apart from the UTF-8 flag bit, so
//! anything that is not valid UTF-8 goes through charset detection. When
//! the detected charset cannot decode the bytes cleanly we fall back to
//! [`REFERENCE_ENCODING`], which maps every byte to some character. A name
//! therefore always decodes; it may just decode to the wrong characters
//! for adversarial or unusual input.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;

/// Encoding used when detection produces a charset that rejects the bytes.
pub static REFERENCE_ENCODING: &Encoding = &encoding_rs::WINDOWS_1252_INIT;

/// General purpose flag bit 11: name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 1 << 11;

pub fn decode(bytes: &[u8], flags: u16) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_owned();
    }
    if flags & FLAG_UTF8 != 0 {
        log::warn!("name flagged as UTF-8 is not valid UTF-8, detecting charset instead");
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);

    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if !had_errors {
        log::debug!("decoded {} bytes as {}", bytes.len(), encoding.name());
        return text.into_owned();
    }

    log::debug!(
        "{} could not decode {} bytes, using {}",
        encoding.name(),
        bytes.len(),
        REFERENCE_ENCODING.name()
    );
    let (text, _) = REFERENCE_ENCODING.decode_without_bom_handling(bytes);
    text.into_owned()
}
