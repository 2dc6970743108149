//! File system path helpers.

use color_eyre::Result;
use color_eyre::eyre::eyre;
use std::path::{Path, PathBuf};

/// Expands a path, resolving environment variables and tilde expressions.
///
/// This function takes a path and expands any environment variables (e.g., $HOME) and tilde
/// expressions (~) within it.
///
/// # Arguments
///
/// * `path` - Any type that can be converted to a Path
///
/// # Errors
///
/// Returns an error if environment variables cannot be expanded.
pub(crate) fn expand_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let home_dir = || -> Option<PathBuf> { dirs::home_dir() };

    let context = |var: &str| -> Result<Option<std::ffi::OsString>> { Ok(std::env::var_os(var)) };

    let expanded = shellexpand::path::full_with_context(&path, home_dir, context)
        .map_err(|e| eyre!("Failed to expand path: {:?}", e))?;

    Ok(PathBuf::from(expanded))
}

//
// Tests
