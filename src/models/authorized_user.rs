use super::role::{PolicyType, Role, RoleAssignment, RoleName, UserType};
use super::user::User;

/// A role resolved against the resource it was granted on.
#[derive(Debug, Clone)]
pub struct Grant {
    pub resource: String,
    pub role: Role,
}

/// The caller of a request with every role assignment resolved.
///
/// Organization-level assignments are expanded into one grant per linked
/// deployment when the user is loaded.
#[derive(Debug, Clone)]
pub struct AuthorizedUser {
    pub user: User,
    pub grants: Vec<Grant>,
}

impl AuthorizedUser {
    pub fn new(user: User, grants: Vec<Grant>) -> Self {
        Self { user, grants }
    }

    pub fn id(&self) -> String {
        self.user.id_hex()
    }

    pub fn is_super_admin(&self) -> bool {
        self.grants
            .iter()
            .any(|g| g.role.id.as_deref() == Some(RoleName::SUPER_ADMIN))
    }

    /// Patients: no grant above the `User` type.
    pub fn is_user(&self) -> bool {
        self.grants.iter().all(|g| g.role.user_type == UserType::User)
    }

    pub fn is_manager(&self) -> bool {
        self.grants.iter().any(|g| g.role.user_type == UserType::Manager)
    }

    pub fn deployment_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .grants
            .iter()
            .filter_map(|g| g.resource.strip_prefix("deployment/").map(str::to_string))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn has_policy_for(&self, resource: &str, policy: PolicyType) -> bool {
        if self.is_super_admin() {
            return true;
        }
        self.grants.iter().any(|g| {
            (g.resource == resource || g.resource == RoleAssignment::ALL_RESOURCES)
                && g.role.has(&[policy])
        })
    }

    /// True if `policy` is granted on at least one of the deployments.
    pub fn has_policy_in_any_deployment(&self, deployment_ids: &[String], policy: PolicyType) -> bool {
        if self.is_super_admin() {
            return true;
        }
        deployment_ids
            .iter()
            .any(|id| self.has_policy_for(&format!("deployment/{}", id), policy))
    }

    /// True if `policy` is granted on any resource at all.
    pub fn has_policy_anywhere(&self, policy: PolicyType) -> bool {
        self.is_super_admin() || self.grants.iter().any(|g| g.role.has(&[policy]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::default_role;
    use crate::models::user::test_user;

    fn grant(resource: &str, role_id: &str) -> Grant {
        Grant {
            resource: resource.to_string(),
            role: default_role(role_id).unwrap().clone(),
        }
    }

    #[test]
    fn test_patient_only_has_own_policies() {
        let user = AuthorizedUser::new(test_user(vec![]), vec![grant("deployment/d1", RoleName::USER)]);

        assert!(user.is_user());
        assert!(!user.is_manager());
        assert!(user.has_policy_for("deployment/d1", PolicyType::ViewOwnMessages));
        assert!(!user.has_policy_for("deployment/d1", PolicyType::SendPatientMessage));
        assert_eq!(user.deployment_ids(), vec!["d1"]);
    }

    #[test]
    fn test_staff_policy_is_scoped_to_resource() {
        let user = AuthorizedUser::new(test_user(vec![]), vec![grant("deployment/d1", RoleName::CONTRIBUTOR)]);

        assert!(user.is_manager());
        assert!(user.has_policy_for("deployment/d1", PolicyType::SendPatientMessage));
        assert!(!user.has_policy_for("deployment/d2", PolicyType::SendPatientMessage));
        assert!(user.has_policy_in_any_deployment(
            &["d2".to_string(), "d1".to_string()],
            PolicyType::ViewPatientData
        ));
    }

    #[test]
    fn test_wildcard_resource_matches_everything() {
        let user = AuthorizedUser::new(test_user(vec![]), vec![grant("*", RoleName::ACCOUNT_MANAGER)]);
        assert!(user.has_policy_for("organization/o1", PolicyType::CreateOrganization));
        assert!(!user.is_super_admin());
    }

    #[test]
    fn test_super_admin_passes_every_check() {
        let user = AuthorizedUser::new(test_user(vec![]), vec![grant("*", RoleName::SUPER_ADMIN)]);
        assert!(user.is_super_admin());
        assert!(user.has_policy_for("deployment/any", PolicyType::SendPatientMessage));
        assert!(user.has_policy_anywhere(PolicyType::ExportPatientData));
    }

    #[test]
    fn test_super_admin_reaches_users_without_deployments() {
        let admin = AuthorizedUser::new(test_user(vec![]), vec![grant("*", RoleName::SUPER_ADMIN)]);
        assert!(admin.has_policy_in_any_deployment(&[], PolicyType::ViewPatientData));

        let staff = AuthorizedUser::new(test_user(vec![]), vec![grant("deployment/d1", RoleName::CONTRIBUTOR)]);
        assert!(!staff.has_policy_in_any_deployment(&[], PolicyType::ViewPatientData));
    }
}
