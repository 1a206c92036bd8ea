//! Storage key constants.

/// Storage keys used by the credential store
pub struct StorageKeys;

impl StorageKeys {
    /// Whole session record: access token, refresh token and user profile (JSON)
    pub const SESSION: &'static str = "session";

    /// "Remember me" flag chosen at login ("true" / "false")
    pub const REMEMBER_ME: &'static str = "remember_me";
}
