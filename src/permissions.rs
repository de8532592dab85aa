//! Role × action permission table.
//!
//! Every role-gated operation asks [`allows`] instead of comparing role strings, so adding a
//! role only touches this table.

use crate::{error::AppError, models::Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ManageProjects,
    IssueProjectToken,
    UpdateOrderStatus,
    CancelAnyOrder,
    ViewAnyOrder,
    ViewAggregation,
    SendReminders,
    /// Order in a project without holding a membership.
    BypassMembership,
}

pub fn allows(role: Role, action: Action) -> bool {
    use Action::*;
    match role {
        Role::Admin => true,
        Role::Producer => matches!(
            action,
            UpdateOrderStatus | ViewAnyOrder | ViewAggregation | SendReminders | BypassMembership
        ),
        Role::ProjectManager => matches!(
            action,
            IssueProjectToken
                | UpdateOrderStatus
                | ViewAnyOrder
                | ViewAggregation
                | SendReminders
                | BypassMembership
        ),
        Role::Vip | Role::Regular => false,
    }
}

pub fn ensure(role: Role, action: Action) -> Result<(), AppError> {
    if allows(role, action) {
        Ok(())
    } else {
        tracing::debug!(role = role.as_str(), ?action, "permission denied");
        Err(AppError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admins_cancel_other_members_orders() {
        assert!(allows(Role::Admin, Action::CancelAnyOrder));
        assert!(!allows(Role::Producer, Action::CancelAnyOrder));
        assert!(!allows(Role::ProjectManager, Action::CancelAnyOrder));
        assert!(!allows(Role::Regular, Action::CancelAnyOrder));
    }

    #[test]
    fn production_roles_update_status() {
        for role in [Role::Admin, Role::Producer, Role::ProjectManager] {
            assert!(allows(role, Action::UpdateOrderStatus));
        }
        for role in [Role::Vip, Role::Regular] {
            assert!(ensure(role, Action::UpdateOrderStatus).is_err());
        }
    }
}
