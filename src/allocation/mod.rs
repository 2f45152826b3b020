/// Allocation core: claims, cooldowns, and permission policy
///
/// Everything here takes the caller's identity and scope as explicit
/// arguments; nothing reads ambient session state.
pub mod engine;
pub mod policy;

pub use engine::AllocationEngine;
pub use policy::{CooldownTracker, PermissionLevel};

use serde::{Deserialize, Serialize};

/// Identity of whoever is asking, as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: String,
    /// Role ids the requester holds in the message's scope
    pub role_ids: Vec<String>,
    /// Platform-native administrator capability in that scope
    pub is_scope_admin: bool,
}

impl Requester {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role_ids: Vec::new(),
            is_scope_admin: false,
        }
    }

    pub fn with_roles(mut self, role_ids: Vec<String>) -> Self {
        self.role_ids = role_ids;
        self
    }

    pub fn as_scope_admin(mut self) -> Self {
        self.is_scope_admin = true;
        self
    }
}
