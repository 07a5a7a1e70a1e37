//! User profile store and role classification.
//!
//! Holds the [`DecodedIdentity`] of the signed-in user. The snapshot is kept
//! in memory and persisted as JSON in the general store under
//! [`USER_PROFILE_KEY`], so it survives a restart and is loaded lazily on the
//! first read.

use crate::config::SessionConfig;
use crate::errors::StorageError;
use crate::identity::DecodedIdentity;
use crate::storage::{load_json, save_json, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// General-store entry holding the identity snapshot.
pub const USER_PROFILE_KEY: &str = "userProfile";

/// Coarse role used to gate booking features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Staff,
    Unknown,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Staff => write!(f, "staff"),
            Role::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classify `roles` against the configured role-name sets.
///
/// Matching is exact and case-sensitive. Staff wins when both sets match.
pub fn classify_roles(
    roles: &BTreeSet<String>,
    student_roles: &BTreeSet<String>,
    staff_roles: &BTreeSet<String>,
) -> Role {
    if !roles.is_disjoint(staff_roles) {
        Role::Staff
    } else if !roles.is_disjoint(student_roles) {
        Role::Student
    } else {
        Role::Unknown
    }
}

#[derive(Default)]
struct ProfileState {
    loaded: bool,
    current: Option<DecodedIdentity>,
}

/// Current-user snapshot, cached in memory and persisted.
pub struct UserProfileStore {
    store: Arc<dyn KeyValueStore>,
    state: Mutex<ProfileState>,
    student_roles: BTreeSet<String>,
    staff_roles: BTreeSet<String>,
}

impl UserProfileStore {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        student_roles: BTreeSet<String>,
        staff_roles: BTreeSet<String>,
    ) -> Self {
        Self {
            store,
            state: Mutex::new(ProfileState::default()),
            student_roles,
            staff_roles,
        }
    }

    pub fn from_config(config: &SessionConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(
            store,
            config.student_roles.clone(),
            config.staff_roles.clone(),
        )
    }

    /// Replace the snapshot. Memory is updated only after the write succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the general store rejects the write.
    pub async fn save(&self, identity: &DecodedIdentity) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        save_json(self.store.as_ref(), USER_PROFILE_KEY, identity).await?;
        state.current = Some(identity.clone());
        state.loaded = true;
        debug!(target: "auth.profile", role_count = identity.roles.len(), "Profile saved");
        Ok(())
    }

    /// The current snapshot, loading the persisted one on first use.
    ///
    /// An unreadable persisted snapshot is logged and treated as absent.
    pub async fn current(&self) -> Option<DecodedIdentity> {
        let mut state = self.state.lock().await;
        if !state.loaded {
            match load_json::<DecodedIdentity>(self.store.as_ref(), USER_PROFILE_KEY).await {
                Ok(identity) => {
                    state.current = identity;
                    state.loaded = true;
                }
                Err(e) => {
                    warn!(target: "auth.profile", error = %e, "Failed to load persisted profile");
                    return None;
                }
            }
        }
        state.current.clone()
    }

    /// Drop the snapshot from memory and storage.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the persisted copy cannot be removed; the
    /// in-memory copy is dropped regardless.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.current = None;
        state.loaded = true;
        self.store.remove(USER_PROFILE_KEY).await?;
        debug!(target: "auth.profile", "Profile cleared");
        Ok(())
    }

    pub fn classify(&self, identity: &DecodedIdentity) -> Role {
        classify_roles(&identity.roles, &self.student_roles, &self.staff_roles)
    }
}
