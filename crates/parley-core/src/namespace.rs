//! Compound keys that let one collection hold two kinds of records.
//!
//! An owner (a custom assistant) has exactly one configuration record under
//! `CONFIG_<owner>` and any number of session records under
//! `CHAT_<owner>_<session>`. Which kind a record is follows from its key
//! alone; there is no secondary index.
//!
//! Changing these prefixes orphans every existing record and therefore
//! requires a collection migration.

use crate::error::{ParleyError, Result};

pub const CONFIG_PREFIX: &str = "CONFIG_";
pub const SESSION_PREFIX: &str = "CHAT_";
pub const DELIMITER: char = '_';

/// Key of the configuration record for `owner_id`.
pub fn config_key(owner_id: &str) -> String {
    format!("{CONFIG_PREFIX}{owner_id}")
}

/// Prefix shared by every session of `owner_id`, delimiter included.
///
/// The trailing delimiter keeps owner `7` from matching sessions of owner `70`.
pub fn session_key_prefix(owner_id: &str) -> String {
    format!("{SESSION_PREFIX}{owner_id}{DELIMITER}")
}

pub fn session_key(owner_id: &str, session_id: &str) -> String {
    format!("{}{}", session_key_prefix(owner_id), session_id)
}

/// True when `key` names a session record of `owner_id`.
pub fn is_session_of(key: &str, owner_id: &str) -> bool {
    key.starts_with(&session_key_prefix(owner_id)) && !key.starts_with(CONFIG_PREFIX)
}

pub fn is_config_key(key: &str) -> bool {
    key.starts_with(CONFIG_PREFIX)
}

/// Owner id encoded in a configuration key.
pub fn owner_of_config(key: &str) -> Option<&str> {
    key.strip_prefix(CONFIG_PREFIX).filter(|owner| !owner.is_empty())
}

/// Session part of a session key belonging to `owner_id`.
pub fn session_id_of<'a>(key: &'a str, owner_id: &str) -> Option<&'a str> {
    if !is_session_of(key, owner_id) {
        return None;
    }
    key.get(session_key_prefix(owner_id).len()..)
}

/// Owner ids must be non-empty and must not contain the delimiter;
/// otherwise owner `a` would claim the sessions of owner `a_b`.
pub fn validate_owner_id(owner_id: &str) -> Result<()> {
    if owner_id.is_empty() {
        return Err(ParleyError::invalid("owner id must not be empty"));
    }
    if owner_id.contains(DELIMITER) {
        return Err(ParleyError::invalid(format!(
            "owner id '{owner_id}' must not contain '{DELIMITER}'"
        )));
    }
    Ok(())
}
