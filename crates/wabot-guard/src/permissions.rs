//! Static command privilege checks.
//!
//! A pure function of configuration plus caller-supplied chat context: an
//! owner-only set and an admin-only-in-group set. Command names compare
//! case-insensitively.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use wabot_types::OwnerSet;

/// Why a command was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionDenied {
    #[error("owner-only command")]
    OwnerOnly,
    #[error("admin-only in groups")]
    AdminOnlyInGroup,
}

pub struct PermissionChecker {
    owners: Arc<OwnerSet>,
    owner_only: HashSet<String>,
    admin_only_in_group: HashSet<String>,
}

impl PermissionChecker {
    pub fn new<I, J>(owners: Arc<OwnerSet>, owner_only: I, admin_only_in_group: J) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        J: IntoIterator,
        J::Item: AsRef<str>,
    {
        Self {
            owners,
            owner_only: owner_only
                .into_iter()
                .map(|c| c.as_ref().to_lowercase())
                .collect(),
            admin_only_in_group: admin_only_in_group
                .into_iter()
                .map(|c| c.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn check(
        &self,
        raw_sender: &str,
        command: &str,
        is_group: bool,
        is_admin: bool,
    ) -> Result<(), PermissionDenied> {
        let command = command.to_lowercase();
        if self.owner_only.contains(&command) && !self.owners.is_owner(raw_sender) {
            return Err(PermissionDenied::OwnerOnly);
        }
        if is_group && !is_admin && self.admin_only_in_group.contains(&command) {
            return Err(PermissionDenied::AdminOnlyInGroup);
        }
        Ok(())
    }

    pub fn is_owner_only(&self, command: &str) -> bool {
        self.owner_only.contains(&command.to_lowercase())
    }
}
