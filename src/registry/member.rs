//! Room and member identifiers
//!
//! Both are opaque string tokens. Member ids are assigned by the server per
//! connection and are never reused across reconnects.

use serde::{Deserialize, Serialize};

/// Identifier of a room (the shared rendezvous code)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Create a new room id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Connection-scoped member identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    /// Create a new member id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a member id from a server session number
    pub fn from_session(session_id: u64) -> Self {
        Self(format!("peer-{}", session_id))
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Display metadata a member publishes to its room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    /// Human readable name
    pub display_name: String,
    /// Presence color (CSS color string), if the member picked one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl MemberInfo {
    /// Create member info with just a display name
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            color: None,
        }
    }

    /// Set the presence color
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_id_from_session() {
        assert_eq!(MemberId::from_session(7).as_str(), "peer-7");
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&MemberId::from("Alice")).unwrap();
        assert_eq!(json, "\"Alice\"");

        let room: RoomId = serde_json::from_str("\"R1\"").unwrap();
        assert_eq!(room, RoomId::from("R1"));
    }

    #[test]
    fn test_member_info_omits_missing_color() {
        let json = serde_json::to_string(&MemberInfo::new("Bob")).unwrap();
        assert_eq!(json, r#"{"displayName":"Bob"}"#);

        let info = MemberInfo::new("Bob").with_color("#ff0000");
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(json, r##"{"displayName":"Bob","color":"#ff0000"}"##);
    }
}
