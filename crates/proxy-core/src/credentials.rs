use std::fmt;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use unicode_normalization::UnicodeNormalization;

use crate::error::{ProxyError, ProxyResult};

/// Standard alphabet, padding optional on input.
const BASIC_TOKEN: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const MALFORMED_HEADER: &str = "Malformed authorization header.";
const INVALID_VALUE: &str = "Invalid authorization value.";

/// User/secret pair carried by an HTTP Basic `Authorization` header.
///
/// The secret is the caller's upstream API key; `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub secret: String,
}

impl Credentials {
    /// Parses an `Authorization` header value of the form `Basic <base64(user:secret)>`.
    ///
    /// The decoded text is NFC-normalized, must not contain control characters
    /// (`%x00-1F / %x7F`) anywhere, and is split on its first colon so the
    /// secret may itself contain colons.
    pub fn from_header(value: &str) -> ProxyResult<Self> {
        let (scheme, encoded) = value
            .split_once(' ')
            .ok_or_else(|| ProxyError::bad_request(MALFORMED_HEADER))?;
        if scheme != "Basic" || encoded.is_empty() {
            return Err(ProxyError::bad_request(MALFORMED_HEADER));
        }

        let bytes = BASIC_TOKEN
            .decode(encoded)
            .map_err(|_| ProxyError::bad_request(INVALID_VALUE))?;
        let decoded = String::from_utf8(bytes)
            .map_err(|_| ProxyError::bad_request(INVALID_VALUE))?
            .nfc()
            .collect::<String>();

        if decoded.chars().any(is_control) {
            return Err(ProxyError::bad_request(INVALID_VALUE));
        }
        let (user, secret) = decoded
            .split_once(':')
            .ok_or_else(|| ProxyError::bad_request(INVALID_VALUE))?;

        Ok(Self {
            user: user.to_owned(),
            secret: secret.to_owned(),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

fn is_control(ch: char) -> bool {
    ch <= '\u{1f}' || ch == '\u{7f}'
}
