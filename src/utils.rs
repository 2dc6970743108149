//! This module provides various utility functions needed throughout userdeploy.
//!
//! These include running external commands, expanding file system paths and elevating privileges.

pub(crate) mod commands;
pub(crate) mod file_fs;
pub(crate) mod sudo;
