use serde::{Deserialize, Deserializer, Serialize};

/// Cached identity snapshot of the logged-in account.
///
/// Serialized exactly as the backend sends it (camelCase), which is also the
/// format of the stored `user_data` slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    /// Stable public identifier
    pub uid: String,
    pub username: String,
    /// Display name
    pub name: String,
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub require_password_change: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: Vec<String>,
}

/// Read an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl UserProfile {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Apply a partial update, keeping fields the patch leaves out.
    pub fn apply(&mut self, patch: ProfilePatch) {
        if let Some(id) = patch.id {
            self.id = id;
        }
        if let Some(uid) = patch.uid {
            self.uid = uid;
        }
        if let Some(username) = patch.username {
            self.username = username;
        }
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(email) = patch.email {
            self.email = email;
        }
        if let Some(require) = patch.require_password_change {
            self.require_password_change = require;
        }
        if let Some(roles) = patch.roles {
            self.roles = roles;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub id: Option<String>,
    pub uid: Option<String>,
    pub username: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub require_password_change: Option<bool>,
    pub roles: Option<Vec<String>>,
}

impl ProfilePatch {
    /// Patch applied once a password change went through.
    pub fn password_changed() -> Self {
        Self {
            require_password_change: Some(false),
            ..Self::default()
        }
    }
}
