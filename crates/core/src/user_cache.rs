// crates/core/src/user_cache.rs
//! Reader for the server's identity list (`usercache.json`).
//!
//! The file is a JSON array of `{name, uuid, expiresOn}` records, rewritten
//! wholesale by the server. Individual bad records are skipped; a file that
//! is not valid JSON fails as a whole.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::UserCacheError;

/// `expiresOn` timestamp layout, e.g. `2024-06-01 18:30:00 +0200`.
pub const EXPIRES_ON_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// One validated identity from the user cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub uuid: Uuid,
    pub expires_on: DateTime<Utc>,
}

impl User {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_on
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUser {
    name: Option<String>,
    #[serde(alias = "identifier")]
    uuid: Option<String>,
    expires_on: Option<String>,
}

impl RawUser {
    fn validate(self) -> Result<User, String> {
        let name = self.name.ok_or("name required")?;
        if name.is_empty() {
            return Err("name must not be empty".into());
        }
        let uuid = self.uuid.ok_or("uuid required")?;
        let uuid = Uuid::parse_str(&uuid).map_err(|e| format!("invalid uuid '{uuid}': {e}"))?;
        let expires_on = self.expires_on.ok_or("expiresOn required")?;
        let expires_on = parse_expires_on(&expires_on)
            .ok_or_else(|| format!("invalid expiresOn '{expires_on}'"))?;
        Ok(User {
            name,
            uuid,
            expires_on,
        })
    }
}

/// Parse an `expiresOn` value. Hour-only offsets (`+01`) are accepted too.
pub fn parse_expires_on(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let parsed = DateTime::parse_from_str(value, EXPIRES_ON_FORMAT)
        .ok()
        .or_else(|| {
            let (_, offset) = value.rsplit_once(' ')?;
            let hour_only = offset.len() == 3 && offset.starts_with(['+', '-']);
            hour_only
                .then(|| DateTime::parse_from_str(&format!("{value}00"), EXPIRES_ON_FORMAT).ok())
                .flatten()
        })?;
    Some(parsed.with_timezone(&Utc))
}

/// Read and parse the user cache at `path`.
pub fn read_user_cache(path: &Path) -> Result<Vec<User>, UserCacheError> {
    let json = std::fs::read_to_string(path).map_err(|e| UserCacheError::io(path, e))?;
    parse_user_cache(path, &json)
}

/// Parse user cache JSON. `path` only names the source in errors and logs.
pub fn parse_user_cache(path: &Path, json: &str) -> Result<Vec<User>, UserCacheError> {
    let raw: Vec<RawUser> =
        serde_json::from_str(json).map_err(|e| UserCacheError::MalformedJson {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let users = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, raw)| match raw.validate() {
            Ok(user) => Some(user),
            Err(reason) => {
                warn!(path = %path.display(), index, %reason, "Skipping invalid user cache entry");
                None
            }
        })
        .collect();
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn path() -> PathBuf {
        PathBuf::from("/srv/usercache.json")
    }

    #[test]
    fn test_parses_vanilla_entries() {
        let json = r#"[
            {"name":"Alice","uuid":"069a79f4-44e9-4726-a5be-fca90e38aaf5","expiresOn":"2024-06-01 18:30:00 +0200"},
            {"name":"Bob","uuid":"853c80ef-3c37-49fd-aa49-938b674adae6","expiresOn":"2024-06-02 00:00:00 +0000"}
        ]"#;
        let users = parse_user_cache(&path(), json).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].name, "Alice");
        assert_eq!(
            users[0].expires_on,
            Utc.with_ymd_and_hms(2024, 6, 1, 16, 30, 0).unwrap()
        );
        assert_eq!(
            users[1].uuid,
            Uuid::parse_str("853c80ef-3c37-49fd-aa49-938b674adae6").unwrap()
        );
    }

    #[test]
    fn test_identifier_alias() {
        let json = r#"[{"name":"Alice","identifier":"069a79f4-44e9-4726-a5be-fca90e38aaf5","expiresOn":"2024-06-01 18:30:00 +0000"}]"#;
        let users = parse_user_cache(&path(), json).unwrap();
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn test_invalid_entries_are_skipped() {
        let json = r#"[
            {"name":"","uuid":"069a79f4-44e9-4726-a5be-fca90e38aaf5","expiresOn":"2024-06-01 18:30:00 +0000"},
            {"name":"NoUuid","expiresOn":"2024-06-01 18:30:00 +0000"},
            {"name":"BadDate","uuid":"069a79f4-44e9-4726-a5be-fca90e38aaf5","expiresOn":"tomorrow"},
            {"name":"Good","uuid":"069a79f4-44e9-4726-a5be-fca90e38aaf5","expiresOn":"2024-06-01 18:30:00 +0000"}
        ]"#;
        let users = parse_user_cache(&path(), json).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "Good");
    }

    #[test]
    fn test_malformed_json_fails_whole_file() {
        let err = parse_user_cache(&path(), "[{\"name\":").unwrap_err();
        assert!(matches!(err, UserCacheError::MalformedJson { .. }));
        assert!(err.to_string().contains("usercache.json"));
    }

    #[test]
    fn test_hour_only_offset() {
        let parsed = parse_expires_on("2024-06-01 18:30:00 +01").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 6, 1, 17, 30, 0).unwrap());
        assert!(parse_expires_on("2024-06-01 18:30:00").is_none());
    }

    #[test]
    fn test_expiry_is_exclusive() {
        let user = User {
            name: "Alice".into(),
            uuid: Uuid::nil(),
            expires_on: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        };
        assert!(!user.is_expired(user.expires_on - chrono::Duration::seconds(1)));
        assert!(user.is_expired(user.expires_on));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_user_cache(&dir.path().join("usercache.json")).unwrap_err();
        assert!(matches!(err, UserCacheError::NotFound { .. }));
    }
}
