//! # Base64 Encoding/Decoding
//!
//! Standard-alphabet decoder for `Authorization: Basic` credentials.

use base64::{engine::general_purpose, Engine as _};

/// Decode a standard (padded) base64 string to UTF-8, as used by HTTP Basic auth.
pub fn b64_decode_to_string(b64: &str) -> Result<String, Error> {
    general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|_| Error::FailToB64Decode)
        .and_then(|bytes| String::from_utf8(bytes).map_err(|_| Error::FailToB64Decode))
}

// region:    --- Error
#[derive(Debug)]
pub enum Error {
    FailToB64Decode,
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for Error {}
// endregion: --- Error

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_credentials_decode() {
        // "admin:secret"
        let decoded = b64_decode_to_string("YWRtaW46c2VjcmV0").unwrap();
        assert_eq!(decoded, "admin:secret");
    }

    #[test]
    fn test_rejects_non_utf8_and_garbage() {
        assert!(b64_decode_to_string("***").is_err());
        // 0xff 0xfe
        assert!(b64_decode_to_string("//4=").is_err());
    }
}
