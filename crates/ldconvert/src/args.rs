//! Converter argument construction.
//!
//! Turns a [`ConversionRequest`] plus the resolved output path into the
//! argument vector of the external converter:
//!
//! ```text
//! <source> <kind> --frequency <f> [--dbc <dictionary>] --output <path> [--<key> <value>]*
//! ```
//!
//! Every argument is a discrete element; nothing is ever joined into a shell
//! string.

use std::ffi::OsString;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::request::ConversionRequest;

/// Flags owned by the converter contract that metadata may not shadow.
const RESERVED_FLAGS: &[&str] = &["frequency", "dbc", "output"];

fn flag_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("valid flag pattern"))
}

/// Build the converter argument vector for `request`.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] if a CAN request has no signal
/// dictionary, the frequency is not a positive finite number, or a metadata
/// key cannot be expressed as a flag.
pub fn build_arguments(request: &ConversionRequest, output: &Path) -> Result<Vec<OsString>> {
    if !request.frequency.is_finite() || request.frequency <= 0.0 {
        return Err(Error::invalid_request(format!(
            "frequency must be a positive number, got {}",
            request.frequency
        )));
    }

    let mut args: Vec<OsString> = vec![
        request.source.clone().into_os_string(),
        request.kind.token().into(),
        "--frequency".into(),
        format_frequency(request.frequency).into(),
    ];

    if request.kind.requires_dictionary() {
        let dictionary = request.required_dictionary()?;
        args.push("--dbc".into());
        args.push(dictionary.as_os_str().to_owned());
    }

    args.push("--output".into());
    args.push(output.as_os_str().to_owned());

    for (key, value) in request.metadata.present() {
        check_metadata_key(key)?;
        args.push(format!("--{key}").into());
        args.push(value.into());
    }

    Ok(args)
}

/// Render a frequency the way the converter expects (`20`, not `20.0`).
#[must_use]
pub fn format_frequency(frequency: f64) -> String {
    frequency.to_string()
}

fn check_metadata_key(key: &str) -> Result<()> {
    if !flag_name_pattern().is_match(key) {
        return Err(Error::invalid_request(format!(
            "metadata key '{key}' is not a valid flag name"
        )));
    }
    if RESERVED_FLAGS.contains(&key) {
        return Err(Error::invalid_request(format!(
            "metadata key '{key}' collides with a converter option"
        )));
    }
    Ok(())
}
