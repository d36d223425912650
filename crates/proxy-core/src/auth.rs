use crate::error::{ProxyError, ProxyResult};

/// Username reserved for license-key authentication.
pub const LICENSE_KEY_USER: &str = "licensekey";

/// Identity policy applied to every request.
///
/// Only the username is checked. The password is the caller's upstream API
/// key and is forwarded as-is, so a bad key is reported by the upstream call
/// rather than here.
#[derive(Debug, Clone)]
pub struct Authorizer {
    license_user: String,
}

impl Default for Authorizer {
    fn default() -> Self {
        Self::new(LICENSE_KEY_USER)
    }
}

impl Authorizer {
    pub fn new(license_user: impl Into<String>) -> Self {
        Self {
            license_user: license_user.into(),
        }
    }

    pub fn license_user(&self) -> &str {
        &self.license_user
    }

    pub fn authorize(&self, user: &str) -> ProxyResult<()> {
        if constant_time_eq(user.as_bytes(), self.license_user.as_bytes()) {
            Ok(())
        } else {
            Err(ProxyError::unauthorized(format!(
                "Invalid username, please use {} as username.",
                self.license_user
            )))
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (&left, &right) in a.iter().zip(b.iter()) {
        diff |= left ^ right;
    }
    diff == 0
}
