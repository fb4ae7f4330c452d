//! Registry configuration

/// Default display name for members that do not provide one
pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

/// Default maximum room id length in bytes
pub const DEFAULT_MAX_ROOM_ID_LEN: usize = 64;

/// Room registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Display name used when a member sends none (or an empty one)
    pub default_display_name: String,

    /// Maximum room id length in bytes
    pub max_room_id_len: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_display_name: DEFAULT_DISPLAY_NAME.to_string(),
            max_room_id_len: DEFAULT_MAX_ROOM_ID_LEN,
        }
    }
}

impl RegistryConfig {
    /// Set the fallback display name
    pub fn default_display_name(mut self, name: impl Into<String>) -> Self {
        self.default_display_name = name.into();
        self
    }

    /// Set the maximum room id length
    pub fn max_room_id_len(mut self, len: usize) -> Self {
        self.max_room_id_len = len;
        self
    }
}
