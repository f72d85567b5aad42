//! Display-name convention for secrets minted by this system
//!
//! `{principal_id}-Auto-Generated-{YYYYMMDDTHHMMSSZ}`
//!
//! The principal id is opaque and may itself contain dashes, so decoding splits
//! on the last marker and requires a well-formed timestamp after it. Names that
//! do not decode are treated as foreign and never touched by cleanup.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::error::{Error, Result};

pub const MARKER: &str = "-Auto-Generated-";

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]Z");

/// Build the display name for a secret owned by `principal_id`.
pub fn compose(principal_id: &str, created_at: OffsetDateTime) -> Result<String> {
    let stamp = created_at
        .to_offset(UtcOffset::UTC)
        .format(TIMESTAMP_FORMAT)
        .map_err(|e| Error::CredentialCreationFailed(format!("cannot format timestamp: {e}")))?;
    Ok(format!("{principal_id}{MARKER}{stamp}"))
}

/// A decoded display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedName<'a> {
    pub principal_id: &'a str,
    pub created_at: OffsetDateTime,
}

/// Decode a display name produced by [`compose`].
///
/// Returns `None` for anything that does not follow the convention.
pub fn parse(display_name: &str) -> Option<OwnedName<'_>> {
    let (principal_id, stamp) = display_name.rsplit_once(MARKER)?;
    if principal_id.is_empty() {
        return None;
    }
    let created_at = PrimitiveDateTime::parse(stamp, TIMESTAMP_FORMAT)
        .ok()?
        .assume_utc();
    Some(OwnedName {
        principal_id,
        created_at,
    })
}

/// Whether `display_name` is a secret this system minted for `principal_id`.
pub fn is_owned_by(display_name: &str, principal_id: &str) -> bool {
    parse(display_name).is_some_and(|name| name.principal_id == principal_id)
}
