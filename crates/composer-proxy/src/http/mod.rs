pub mod download;
pub mod error;
pub mod gate;
pub mod manifest;

pub(crate) const JSON_UTF8: &str = "application/json;charset=UTF-8";
pub(crate) const NO_STORE: &str = "no-store";
