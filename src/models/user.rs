use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// User record as returned by the identity service.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<String>,
}

impl UserRecord {
    /// Confirmed by the identity service, or flagged as confirmed in metadata.
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
            || self
                .user_metadata
                .extra
                .get("email_confirmed")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }
}

/// The metadata map this service reads and patches. Keys it does not know about
/// are carried through `extra` so a write never drops them.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct UserMetadata {
    #[serde(default, deserialize_with = "lenient_credits")]
    pub credits: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_data: Option<LastData>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserMetadata {
    pub fn is_disabled(&self) -> bool {
        self.disabled.as_deref() == Some("True")
    }
}

/// Last submitted generation form, mirrored between the session and the user metadata.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct LastData {
    #[serde(default)]
    pub last_prompt: Option<String>,
    #[serde(default)]
    pub last_selected_images: Vec<String>,
    #[serde(default)]
    pub last_width: Option<u32>,
    #[serde(default)]
    pub last_height: Option<u32>,
    #[serde(default)]
    pub last_repeat: Option<u32>,
    #[serde(default)]
    pub last_resolution: Option<String>,
    #[serde(default)]
    pub last_type: Option<String>,
}

/// Authenticated user resolved by the auth middleware for the current request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub metadata: UserMetadata,
}

// Credits have been written both as numbers and as numeric strings.
fn lenient_credits<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}
