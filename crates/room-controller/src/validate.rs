//! Inbound payload validation.
//!
//! Every field of every client command is validated before it reaches an
//! actor. Failures produce `RcError::Validation` and the command is dropped
//! without a reply, so these helpers never need to produce client-safe
//! messages.

use crate::errors::RcError;
use url::Url;

/// Maximum room identifier length.
pub const MAX_ROOM_ID_LEN: usize = 100;

/// Maximum display name length (after trimming).
pub const MAX_DISPLAY_NAME_LEN: usize = 50;

/// Maximum chat message / playlist title length (after trimming).
pub const MAX_TEXT_LEN: usize = 500;

/// Maximum media URL length.
pub const MAX_URL_LEN: usize = 2000;

/// Maximum reaction emoji length in characters.
pub const MAX_EMOJI_CHARS: usize = 10;

/// Display name used when a client supplies no usable name.
pub const DEFAULT_DISPLAY_NAME: &str = "Guest";

/// Validate a room identifier: non-empty, at most 100 bytes.
pub fn room_id(raw: &str) -> Result<&str, RcError> {
    if raw.is_empty() || raw.len() > MAX_ROOM_ID_LEN {
        return Err(RcError::Validation(format!(
            "room id length {} out of range",
            raw.len()
        )));
    }
    Ok(raw)
}

/// Normalize a display name: trimmed, 1-50 characters, falling back to the
/// default placeholder when missing, empty, or over-long.
#[must_use]
pub fn display_name(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(name) if !name.is_empty() && name.chars().count() <= MAX_DISPLAY_NAME_LEN => {
            name.to_string()
        }
        _ => DEFAULT_DISPLAY_NAME.to_string(),
    }
}

/// Validate a username a client asserts on a payload (reactions): trimmed,
/// 1-50 characters. Unlike [`display_name`] there is no fallback; invalid
/// usernames fail the whole command.
pub fn username(raw: &str) -> Result<String, RcError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(RcError::Validation(
            "username length out of range".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Validate a playback position: finite and non-negative.
pub fn playback_time(time: f64) -> Result<f64, RcError> {
    if !time.is_finite() || time < 0.0 {
        return Err(RcError::Validation(format!(
            "playback time {time} not finite and non-negative"
        )));
    }
    Ok(time)
}

/// Validate free text (chat message or playlist title): trimmed, 1-500
/// characters.
pub fn text(raw: &str) -> Result<String, RcError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_TEXT_LEN {
        return Err(RcError::Validation("text length out of range".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Validate a media URL: well-formed per the `url` crate and at most 2000
/// bytes.
pub fn media_url(raw: &str) -> Result<String, RcError> {
    if raw.len() > MAX_URL_LEN {
        return Err(RcError::Validation(format!(
            "url length {} exceeds {MAX_URL_LEN}",
            raw.len()
        )));
    }
    Url::parse(raw).map_err(|e| RcError::Validation(format!("malformed url: {e}")))?;
    Ok(raw.to_string())
}

/// Validate a reaction emoji: 1-10 characters.
pub fn emoji(raw: &str) -> Result<&str, RcError> {
    let chars = raw.chars().count();
    if chars == 0 || chars > MAX_EMOJI_CHARS {
        return Err(RcError::Validation(format!(
            "emoji length {chars} out of range"
        )));
    }
    Ok(raw)
}

/// Validate a reaction overlay coordinate: 0-100 percent.
pub fn coordinate(value: f64) -> Result<f64, RcError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(RcError::Validation(format!(
            "coordinate {value} out of range"
        )));
    }
    Ok(value)
}
