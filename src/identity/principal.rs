use serde::{Deserialize, Serialize};

/// The authenticated principal issued by the identity provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: String,
}

/// Application-level permission label, stored apart from the identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "StoredRole")]
pub struct Role {
    pub id: String,
    pub name: String,
}

/// Profiles store a role either as `{id, name}` or as a bare name.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRole {
    Name(String),
    Full { id: String, name: String },
}

impl From<StoredRole> for Role {
    fn from(r: StoredRole) -> Self {
        match r {
            StoredRole::Name(name) => Role { id: name.clone(), name },
            StoredRole::Full { id, name } => Role { id, name },
        }
    }
}

pub const DEFAULT_ROLE: &str = "user";

impl Role {
    pub fn new<S: Into<String>>(id: S, name: S) -> Self { Self { id: id.into(), name: name.into() } }

    /// Role granted when no profile can be resolved for an identity.
    pub fn default_role() -> Self { Self::new(DEFAULT_ROLE, DEFAULT_ROLE) }
}

impl Default for Role {
    fn default() -> Self { Self::default_role() }
}

/// An identity merged with its resolved role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionUser {
    pub uid: String,
    pub email: String,
    pub role: Role,
}

impl SessionUser {
    pub fn new(identity: Identity, role: Role) -> Self {
        Self { uid: identity.uid, email: identity.email, role }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_reads_object_or_bare_name() {
        let full: Role = serde_json::from_value(json!({"id": "r1", "name": "admin"})).unwrap();
        assert_eq!(full, Role::new("r1", "admin"));
        let bare: Role = serde_json::from_value(json!("manager")).unwrap();
        assert_eq!(bare, Role::new("manager", "manager"));
        assert_eq!(serde_json::to_value(&bare).unwrap(), json!({"id": "manager", "name": "manager"}));
        assert!(serde_json::from_value::<Role>(json!({"label": "x"})).is_err());
    }
}
