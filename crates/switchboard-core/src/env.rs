//! Environment variable handling.

use std::env;

/// Well-known environment variable names.
pub mod vars {
    /// Overrides `server.port`.
    pub const PORT: &str = "SWITCHBOARD_PORT";
    /// Path to the configuration file.
    pub const CONFIG: &str = "SWITCHBOARD_CONFIG";
}

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable as a u16 (e.g., for ports).
pub fn get_u16(name: &str) -> Option<u16> {
    get_var(name).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_var_missing() {
        assert!(get_var("SWITCHBOARD_TEST_SURELY_UNSET_VAR").is_none());
        assert!(get_u16("SWITCHBOARD_TEST_SURELY_UNSET_VAR").is_none());
    }
}
