//! This module defines custom error types for talking to the external account management CLI.

use thiserror::Error;

/// Represents errors that can occur while querying the application user registry.
#[derive(Error, Debug)]
pub(crate) enum RegistryError {
    /// The registry CLI could not be spawned at all.
    #[error("Failed to invoke the account management CLI")]
    Invoke(#[from] std::io::Error),

    /// The registry CLI ran but exited with a non-zero status.
    #[error("Account management CLI failed (exit code {code:?}): {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    /// The JSON listing could not be parsed.
    #[error("Account management CLI returned invalid JSON")]
    InvalidJson(#[from] serde_json::Error),

    /// The CLI printed bytes that are not valid UTF-8.
    #[error("Account management CLI returned non-UTF-8 output")]
    NonUtf8(#[from] std::string::FromUtf8Error),

    /// The JSON listing parsed but did not contain the expected `users` object.
    #[error("Malformed user listing: missing 'users' object")]
    MalformedListing,

    /// No record exists for the requested username.
    #[error("No user named '{0}' is registered")]
    UnknownUser(String),

    /// The user exists but its profile has no such field.
    #[error("User '{user}' has no profile field '{key}'")]
    MissingField { user: String, key: String },
}
