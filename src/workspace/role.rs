//! The membership role sum type.
//!
//! Narrower than the teacher's `teams/members.rs::MemberRole` (which has
//! seven tiers with a numeric hierarchy level) — this platform only needs
//! the four roles the spec names, with a total `allows` predicate instead of
//! a hierarchy comparison, since C7's rules branch on exact role, not rank.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "member_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Member,
    Guest,
}

/// Coarse actions a role may or may not perform on its own workspace.
/// Fine-grained artifact visibility is C7's job, not this type's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ManageBilling,
    ManageMembers,
    ManageBranding,
    CreateArtifacts,
    ReadPrivateArtifacts,
}

impl Role {
    pub fn is_owner_or_admin(self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }

    pub fn allows(self, action: Action) -> bool {
        use Action::*;
        use Role::*;
        match (self, action) {
            (Owner, _) => true,
            (Admin, ManageBilling) => false,
            (Admin, _) => true,
            (Member, CreateArtifacts) | (Member, ReadPrivateArtifacts) => true,
            (Member, _) => false,
            (Guest, _) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_allows_everything() {
        for action in [
            Action::ManageBilling,
            Action::ManageMembers,
            Action::ManageBranding,
            Action::CreateArtifacts,
            Action::ReadPrivateArtifacts,
        ] {
            assert!(Role::Owner.allows(action));
        }
    }

    #[test]
    fn admin_cannot_manage_billing() {
        assert!(!Role::Admin.allows(Action::ManageBilling));
        assert!(Role::Admin.allows(Action::ManageMembers));
    }

    #[test]
    fn guest_allows_nothing() {
        assert!(!Role::Guest.allows(Action::CreateArtifacts));
        assert!(!Role::Guest.allows(Action::ReadPrivateArtifacts));
    }

    #[test]
    fn member_can_create_and_read_private_but_not_manage() {
        assert!(Role::Member.allows(Action::CreateArtifacts));
        assert!(Role::Member.allows(Action::ReadPrivateArtifacts));
        assert!(!Role::Member.allows(Action::ManageMembers));
    }
}
