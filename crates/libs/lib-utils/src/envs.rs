//! # Environment Variables
//!
//! Utilities for reading and parsing environment variables, with and without defaults.

use std::env;
use std::str::FromStr;

/// Get an environment variable by name.
pub fn get_env(name: &'static str) -> Result<String, Error> {
    env::var(name).map_err(|_| Error::MissingEnv(name))
}

/// Get an environment variable, falling back to `default` when unset or empty.
pub fn get_env_or(name: &'static str, default: &str) -> String {
    match env::var(name) {
        Ok(val) if !val.trim().is_empty() => val,
        _ => default.to_string(),
    }
}

/// Parse an environment variable, falling back to `default` when unset.
///
/// A value that is present but unparsable is an error rather than a silent default.
pub fn get_env_parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, Error> {
    match env::var(name) {
        Ok(val) if !val.trim().is_empty() => {
            val.trim().parse::<T>().map_err(|_| Error::WrongFormat(name))
        }
        _ => Ok(default),
    }
}

/// Read a boolean flag (`true/false/1/0/yes/no`), falling back to `default` when unset.
pub fn get_env_bool_or(name: &'static str, default: bool) -> Result<bool, Error> {
    match env::var(name) {
        Ok(val) if !val.trim().is_empty() => match val.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(Error::WrongFormat(name)),
        },
        _ => Ok(default),
    }
}

// region:    --- Error
#[derive(Debug)]
pub enum Error {
    MissingEnv(&'static str),
    WrongFormat(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for Error {}
// endregion: --- Error
