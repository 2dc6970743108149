//! Typed client for the application user registry.
//!
//! Application users live in an external account management CLI (by default `yunohost`), not in
//! this process. This module wraps that CLI behind the [`Registry`] trait so that the helper
//! logic works on structured records instead of scraping command output inline. The real client
//! parses two output formats the CLI offers:
//!
//! - the JSON listing (`--output-as json`), a `{"users": {"<name>": {...}}}` object,
//! - the plain listing/profile format (`--output-as plain`), where field names appear on marker
//!   lines prefixed with `#` characters and values follow on the next line, and per-user
//!   profiles are line-oriented `key: value` pairs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use color_eyre::eyre::{WrapErr, ensure};
use color_eyre::{Result, Section};
use tracing::debug;

use crate::errors::RegistryError;

// -------------------------------------------------------------------------------------------------
// Registry interface
// -------------------------------------------------------------------------------------------------

/// Capability set of the application user registry.
///
/// "Not found" is a normal outcome and is reported through return values, never as an error;
/// callers branch on it routinely.
pub(crate) trait Registry {
    /// Whether a user with exactly this name is registered.
    async fn exists(&self, username: &str) -> Result<bool, RegistryError>;

    /// All registered usernames, in the registry's listing order.
    async fn list(&self) -> Result<Vec<String>, RegistryError>;

    /// The profile fields of one user.
    async fn info(&self, username: &str) -> Result<BTreeMap<String, String>, RegistryError>;
}

// -------------------------------------------------------------------------------------------------
// Real client
// -------------------------------------------------------------------------------------------------

/// Registry client shelling out to the account management CLI.
#[derive(Debug, Clone)]
pub(crate) struct YunohostClient {
    cmd: PathBuf,
}

impl YunohostClient {
    /// Creates a client for the given CLI command, resolving it on `PATH` up front so that a
    /// missing tool surfaces as one clear error instead of failing on first use.
    pub(crate) fn new(cmd: &str) -> Result<Self> {
        let cmd = which::which(cmd)
            .wrap_err_with(|| format!("Account management CLI '{}' not found", cmd))
            .suggestion("Check the value of `registry_cmd` in the userdeploy config")?;
        Ok(Self { cmd })
    }

    /// Runs the CLI with the given arguments and returns its stdout as a string.
    async fn run(&self, args: &[&str]) -> Result<String, RegistryError> {
        debug!("Querying registry: {} {}", self.cmd.display(), args.join(" "));
        let output = tokio::process::Command::new(&self.cmd)
            .args(args)
            .stdin(std::process::Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(RegistryError::CommandFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8(output.stdout)?)
    }
}

impl Registry for YunohostClient {
    async fn exists(&self, username: &str) -> Result<bool, RegistryError> {
        let out = self
            .run(&["user", "list", "--output-as", "json", "--quiet"])
            .await?;
        Ok(parse_listed_users(&out)?.iter().any(|u| u == username))
    }

    async fn list(&self) -> Result<Vec<String>, RegistryError> {
        let out = self
            .run(&["user", "list", "--output-as", "plain", "--quiet"])
            .await?;
        Ok(parse_username_stanzas(&out))
    }

    async fn info(&self, username: &str) -> Result<BTreeMap<String, String>, RegistryError> {
        let out = self
            .run(&["user", "info", username, "--output-as", "plain", "--quiet"])
            .await
            .map_err(|e| match e {
                // The CLI reports a lookup miss as a plain command failure; surface it as the
                // typed variant so callers can tell it apart from an invocation problem
                RegistryError::CommandFailed { ref stderr, .. }
                    if stderr.to_lowercase().contains("unknown user") =>
                {
                    RegistryError::UnknownUser(username.to_string())
                }
                other => other,
            })?;
        Ok(parse_profile_fields(&out))
    }
}

// -------------------------------------------------------------------------------------------------
// Output parsers
// -------------------------------------------------------------------------------------------------

/// Extracts the registered usernames from the JSON listing.
///
/// The listing is an object whose `users` member maps each username to its record; only the
/// keys matter here.
fn parse_listed_users(json: &str) -> Result<Vec<String>, RegistryError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let users = value
        .get("users")
        .and_then(|u| u.as_object())
        .ok_or(RegistryError::MalformedListing)?;
    Ok(users.keys().cloned().collect())
}

/// Extracts usernames from the plain listing format.
///
/// The listing consists of repeated stanzas; within each, a marker line carrying the field name
/// `username` (prefixed with `#` characters) is followed by the value on the next line.
fn parse_username_stanzas(text: &str) -> Vec<String> {
    let mut users = Vec::new();
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        if line.trim_start_matches('#') == "username" {
            if let Some(value) = lines.next() {
                let value = value.trim();
                if !value.is_empty() {
                    users.push(value.to_string());
                }
            }
        }
    }
    users
}

/// Parses a line-oriented `key: value` profile into a field map.
///
/// Lines without a separator are ignored. An empty value is kept as an empty string; it is the
/// caller's business to distinguish that from a missing key.
fn parse_profile_fields(text: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for line in text.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim_start_matches('#').trim();
            if !key.is_empty() {
                fields.insert(key.to_string(), value.trim().to_string());
            }
        }
    }
    fields
}

// -------------------------------------------------------------------------------------------------
// Helper operations
// -------------------------------------------------------------------------------------------------

/// Checks whether an application user is registered.
///
/// # Arguments
///
/// * `registry` - The registry to query.
/// * `username` - Name of the user to look for. Must be non-empty.
pub(crate) async fn user_exists<R: Registry>(registry: &R, username: &str) -> Result<bool> {
    ensure!(!username.is_empty(), "Username must not be empty");
    let found = registry
        .exists(username)
        .await
        .wrap_err_with(|| format!("Failed to check whether user '{}' exists", username))?;
    debug!(
        "User '{}' {}",
        username,
        if found { "is registered" } else { "is not registered" }
    );
    Ok(found)
}

/// Fetches one field of a user's profile.
///
/// A key that is absent from the profile is a hard error; an empty stored value comes back as an
/// empty string.
///
/// # Arguments
///
/// * `registry` - The registry to query.
/// * `username` - Name of the user.
/// * `key` - Name of the profile field.
pub(crate) async fn user_info<R: Registry>(
    registry: &R,
    username: &str,
    key: &str,
) -> Result<String> {
    ensure!(!username.is_empty(), "Username must not be empty");
    ensure!(!key.is_empty(), "Key must not be empty");
    let fields = registry
        .info(username)
        .await
        .wrap_err_with(|| format!("Failed to fetch the profile of user '{}'", username))?;
    let value = fields
        .get(key)
        .cloned()
        .ok_or_else(|| RegistryError::MissingField {
            user: username.to_string(),
            key: key.to_string(),
        })?;
    Ok(value)
}

/// Enumerates all registered application usernames, in listing order.
pub(crate) async fn user_list<R: Registry>(registry: &R) -> Result<Vec<String>> {
    let users = registry
        .list()
        .await
        .wrap_err("Failed to list registered users")?;
    Ok(users)
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory registry fake preserving insertion order for listings.
    struct FakeRegistry {
        users: Vec<(String, BTreeMap<String, String>)>,
    }

    impl FakeRegistry {
        fn new() -> Self {
            Self { users: Vec::new() }
        }

        fn with_user(mut self, name: &str, fields: &[(&str, &str)]) -> Self {
            let fields = fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.users.push((name.to_string(), fields));
            self
        }
    }

    impl Registry for FakeRegistry {
        async fn exists(&self, username: &str) -> Result<bool, RegistryError> {
            Ok(self.users.iter().any(|(name, _)| name == username))
        }

        async fn list(&self) -> Result<Vec<String>, RegistryError> {
            Ok(self.users.iter().map(|(name, _)| name.clone()).collect())
        }

        async fn info(&self, username: &str) -> Result<BTreeMap<String, String>, RegistryError> {
            self.users
                .iter()
                .find(|(name, _)| name == username)
                .map(|(_, fields)| fields.clone())
                .ok_or_else(|| RegistryError::UnknownUser(username.to_string()))
        }
    }

    // --
    // * Parsers

    #[test]
    fn test_parse_listed_users() -> Result<()> {
        let json = r#"{"users": {"alice": {"fullname": "Alice"}, "bob": {"fullname": "Bob"}}}"#;
        let mut users = parse_listed_users(json)?;
        users.sort();
        assert_eq!(users, vec!["alice", "bob"]);
        Ok(())
    }

    #[test]
    fn test_parse_listed_users_empty() -> Result<()> {
        assert!(parse_listed_users(r#"{"users": {}}"#)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_parse_listed_users_malformed() {
        assert!(matches!(
            parse_listed_users(r#"{"accounts": {}}"#),
            Err(RegistryError::MalformedListing)
        ));
        assert!(matches!(
            parse_listed_users("not json"),
            Err(RegistryError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_parse_username_stanzas() {
        let out = "#users\n##username\nalice\n##fullname\nAlice Doe\n##username\nbob\n##fullname\nBob Doe\n";
        assert_eq!(parse_username_stanzas(out), vec!["alice", "bob"]);
    }

    #[test]
    fn test_parse_username_stanzas_listing_order_kept() {
        let out = "##username\nzoe\n##username\nadam\n";
        assert_eq!(parse_username_stanzas(out), vec!["zoe", "adam"]);
    }

    #[test]
    fn test_parse_username_stanzas_ignores_other_fields() {
        let out = "##mail\nalice@example.org\n##fullname\nAlice\n";
        assert!(parse_username_stanzas(out).is_empty());
    }

    #[test]
    fn test_parse_profile_fields() {
        let out = "username: alice\nfullname: Alice Doe\nmail: alice@example.org\n";
        let fields = parse_profile_fields(out);
        assert_eq!(fields.get("mail").map(String::as_str), Some("alice@example.org"));
        assert_eq!(fields.get("username").map(String::as_str), Some("alice"));
        assert_eq!(fields.get("shell"), None);
    }

    #[test]
    fn test_parse_profile_fields_empty_value() {
        let fields = parse_profile_fields("mail:\n");
        assert_eq!(fields.get("mail").map(String::as_str), Some(""));
    }

    #[test]
    fn test_parse_profile_fields_marker_prefix_stripped() {
        let fields = parse_profile_fields("#mail: alice@example.org\n");
        assert_eq!(fields.get("mail").map(String::as_str), Some("alice@example.org"));
    }

    // --
    // * Helper operations

    #[tokio::test]
    async fn test_user_exists() -> Result<()> {
        let registry = FakeRegistry::new().with_user("alice", &[("mail", "alice@example.org")]);
        assert!(user_exists(&registry, "alice").await?);
        assert!(!user_exists(&registry, "bob").await?);
        // Exact match, not a substring match
        assert!(!user_exists(&registry, "ali").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_user_exists_empty_name() {
        let registry = FakeRegistry::new();
        assert!(user_exists(&registry, "").await.is_err());
    }

    #[tokio::test]
    async fn test_user_info() -> Result<()> {
        let registry =
            FakeRegistry::new().with_user("alice", &[("mail", "alice@example.org"), ("note", "")]);
        assert_eq!(user_info(&registry, "alice", "mail").await?, "alice@example.org");
        // Empty value and missing key are distinguishable
        assert_eq!(user_info(&registry, "alice", "note").await?, "");
        assert!(user_info(&registry, "alice", "shell").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_user_info_unknown_user() {
        let registry = FakeRegistry::new();
        assert!(user_info(&registry, "ghost", "mail").await.is_err());
    }

    #[tokio::test]
    async fn test_user_list_in_listing_order() -> Result<()> {
        let registry = FakeRegistry::new()
            .with_user("zoe", &[])
            .with_user("adam", &[]);
        assert_eq!(user_list(&registry).await?, vec!["zoe", "adam"]);
        Ok(())
    }
}
