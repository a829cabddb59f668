//! Workspace/Member Store (C3).
//!
//! Grounded in `src/saas/tenant.rs` for the row shapes and
//! `src/teams/members.rs` for the role/membership operations, narrowed to
//! the four-role model and exact contracts of §4.1.

pub mod model;
pub mod role;
pub mod store;

pub use model::{Branding, Contacts, Invitation, Member, PlanLimits, Workspace};
pub use role::{Action, Role};
pub use store::WorkspaceError;
