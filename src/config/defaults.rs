//! Built-in settings defaults

/// Prefix of workspace directory names.
pub const WORKSPACE_PREFIX: &str = "observer-setup-";

/// Default `tracing` filter directive of the command-line tool.
pub const LOG_FILTER: &str = "observer_setup=info";

/// Settings file looked up in the current directory when none is given.
pub const CONFIG_FILE: &str = "observer-setup.toml";
