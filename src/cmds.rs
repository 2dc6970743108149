//! Command handlers: thin adapters from parsed CLI commands to the library operations,
//! mapping results onto stdout and process exit codes.

pub(crate) mod app_user;
pub(crate) mod exec;
pub(crate) mod system_user;
