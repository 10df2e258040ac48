//! Age decisions over artifact filenames.
//!
//! The timestamp token embedded in a filename is the sole identity and the
//! sole source of age information. Names that do not carry a recognized
//! suffix and a parseable token are never eligible for deletion.

use chrono::NaiveDateTime;

pub const STREAM_SUFFIX: &str = ".xbstream";
pub const LOG_SUFFIX: &str = ".xbstream.log";
pub const TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Strips a recognized artifact suffix, yielding the timestamp token.
fn timestamp_token(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(LOG_SUFFIX)
        .or_else(|| file_name.strip_suffix(STREAM_SUFFIX))
}

pub fn is_log_artifact(file_name: &str) -> bool {
    file_name.ends_with(LOG_SUFFIX)
}

/// Creation time embedded in an artifact filename. Unrecognized shapes and
/// malformed tokens yield None rather than an error.
pub fn artifact_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    let token = timestamp_token(file_name)?;
    NaiveDateTime::parse_from_str(token, TIMESTAMP_FORMAT).ok()
}

/// An artifact is eligible once strictly older than the threshold.
pub fn is_eligible_for_deletion(file_name: &str, now: NaiveDateTime, threshold_secs: u64) -> bool {
    match artifact_timestamp(file_name) {
        Some(created) => (now - created).num_seconds() > threshold_secs as i64,
        None => false,
    }
}
