use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::utils::error::AppError;

/// Coarse permissions attached to roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionType {
    ViewOwnData,
    ManageOwnData,
    ViewProxyProfile,
    GenerateAuthToken,
    ViewPatientData,
    ManagePatientData,
    EditPatientData,
    ContactPatient,
    ViewPatientIdentifier,
    ExportPatientData,
    ManagePatientModuleConfig,
    AddStaffMembers,
    AddPatients,
    ViewStaffList,
    EditRolePermissions,
    ManageLabels,
    ManageDeployment,
    EditDeployment,
    CreateOrganization,
    ManageOrganization,
    DeleteOrganization,
    RemoveUser,
    ViewDashboard,
}

impl PermissionType {
    pub fn common_permissions() -> Vec<PermissionType> {
        vec![
            PermissionType::ViewOwnData,
            PermissionType::ManageOwnData,
            PermissionType::ViewProxyProfile,
            PermissionType::GenerateAuthToken,
        ]
    }

    pub fn policies(&self) -> &'static [PolicyType] {
        use PolicyType::*;
        match self {
            PermissionType::ViewOwnData => &[
                ViewOwnProfile,
                ViewOwnData,
                ViewOwnDeployment,
                ViewOwnEvents,
                ViewOwnMessages,
            ],
            PermissionType::ManageOwnData => &[EditOwnProfile, EditOwnData],
            PermissionType::ViewProxyProfile => &[ViewProxyProfile],
            PermissionType::GenerateAuthToken => &[GenerateAuthToken],
            PermissionType::ViewPatientData => &[ViewPatientProfile, ViewPatientData],
            PermissionType::ManagePatientData => &[
                AddRemovePatient,
                ChangePatientStatus,
                EditPatientNote,
                EditPatientProfile,
                EditPatientData,
                AssignPatientToStaff,
                OffBoardPatient,
                InvitePatients,
            ],
            PermissionType::EditPatientData => &[EditPatientProfile, EditPatientData],
            PermissionType::ContactPatient => &[
                ScheduleAndCallPatient,
                SendPatientMessage,
                ViewPatientMessage,
            ],
            PermissionType::ViewPatientIdentifier => &[ViewPatientIdentifier],
            PermissionType::ExportPatientData => &[ExportPatientData],
            PermissionType::ManagePatientModuleConfig => &[ManagePatientModuleConfig],
            PermissionType::AddStaffMembers => &[InviteStaffs, AssignRolesToStaff],
            PermissionType::AddPatients => &[InvitePatients],
            PermissionType::ViewStaffList => &[ViewStaffList],
            PermissionType::EditRolePermissions => &[EditCustomRoles, ViewCustomRoles],
            PermissionType::ManageLabels => &[CreatePatientLabels, EditPatientLabels],
            PermissionType::ManageDeployment => &[CreateDeployment, ViewDeployment, EditDeployment],
            PermissionType::EditDeployment => &[ViewDeployment, EditDeployment],
            PermissionType::CreateOrganization => &[CreateOrganization],
            PermissionType::ManageOrganization => &[ViewOrganization, CreateOrganization, EditOrganization],
            PermissionType::DeleteOrganization => &[DeleteOrganization],
            PermissionType::RemoveUser => &[RemoveUser],
            PermissionType::ViewDashboard => &[ViewDashboard],
        }
    }
}

/// Fine-grained checks performed by handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyType {
    ViewOwnData,
    EditOwnData,
    ViewOwnProfile,
    EditOwnProfile,
    ViewOwnDeployment,
    ViewOwnEvents,
    ViewProxyProfile,
    ViewOwnMessages,
    GenerateAuthToken,

    ViewPatientData,
    EditPatientData,
    ViewPatientProfile,
    EditPatientProfile,
    EditPatientNote,
    ChangePatientStatus,
    AssignPatientToStaff,
    ScheduleAndCallPatient,
    ExportPatientData,
    ViewPatientIdentifier,
    AddRemovePatient,
    InvitePatients,
    InviteStaffs,
    AssignRolesToStaff,
    ViewCustomRoles,
    EditCustomRoles,
    ViewStaffList,
    OffBoardPatient,
    SendPatientMessage,
    ViewPatientMessage,
    ManagePatientModuleConfig,
    CreatePatientLabels,
    EditPatientLabels,

    ViewDeployment,
    EditDeployment,
    CreateDeployment,
    RemoveUser,
    ViewOrganization,
    CreateOrganization,
    EditOrganization,
    DeleteOrganization,
    ViewDashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum UserType {
    SuperAdmin,
    Manager,
    User,
    Proxy,
    ServiceAccount,
}

pub struct RoleName;

impl RoleName {
    pub const SUPER_ADMIN: &'static str = "SuperAdmin";
    pub const ACCOUNT_MANAGER: &'static str = "AccountManager";
    pub const ORGANIZATION_OWNER: &'static str = "OrganizationOwner";
    pub const ACCESS_CONTROLLER: &'static str = "AccessController";
    pub const ADMIN: &'static str = "Admin";
    pub const CONTRIBUTOR: &'static str = "Contributor";
    pub const DEPLOYMENT_STAFF: &'static str = "DeploymentStaff";
    pub const CALL_CENTER: &'static str = "CallCenter";
    pub const MANAGER: &'static str = "Manager";
    pub const USER: &'static str = "User";
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<PermissionType>,
    #[serde(default = "default_user_type")]
    pub user_type: UserType,
}

fn default_user_type() -> UserType {
    UserType::Manager
}

impl Role {
    /// Builds a role that always carries the common permissions.
    pub fn new(id: Option<&str>, name: &str, permissions: &[PermissionType], user_type: UserType) -> Self {
        let mut role = Role {
            id: id.map(str::to_string),
            name: name.to_string(),
            permissions: permissions.to_vec(),
            user_type,
        };
        role.normalize_permissions();
        role
    }

    pub fn normalize_permissions(&mut self) {
        let unique: BTreeSet<PermissionType> = self
            .permissions
            .iter()
            .copied()
            .chain(PermissionType::common_permissions())
            .collect();
        self.permissions = unique.into_iter().collect();
    }

    /// True iff every requested policy is granted by at least one permission.
    pub fn has(&self, policies: &[PolicyType]) -> bool {
        if self.permissions.is_empty() {
            return false;
        }
        let granted: Vec<PolicyType> = self
            .permissions
            .iter()
            .flat_map(|p| p.policies().iter().copied())
            .collect();
        policies.iter().all(|policy| granted.contains(policy))
    }

    pub fn has_extra_permissions(&self) -> bool {
        self.permissions != PermissionType::common_permissions()
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }
}

/// A role granted to a user on a resource.
///
/// `resource` is `deployment/<id>`, `organization/<id>`, `*`, or the
/// `user/<id>` record a patient signed up with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub role_id: String,
    pub resource: String,
}

impl RoleAssignment {
    pub const ALL_RESOURCES: &'static str = "*";

    pub fn new(role_id: &str, resource: &str) -> Self {
        Self {
            role_id: role_id.to_string(),
            resource: resource.to_string(),
        }
    }

    pub fn for_deployment(role_id: &str, deployment_id: &str) -> Self {
        Self::new(role_id, &format!("deployment/{}", deployment_id))
    }

    pub fn for_organization(role_id: &str, organization_id: &str) -> Self {
        Self::new(role_id, &format!("organization/{}", organization_id))
    }

    /// Assignment scoped to the user's own record, given at sign-up.
    pub fn for_user(role_id: &str, user_id: &str) -> Self {
        Self::new(role_id, &format!("user/{}", user_id))
    }

    pub fn deployment_id(&self) -> Option<&str> {
        self.resource.strip_prefix("deployment/")
    }

    pub fn organization_id(&self) -> Option<&str> {
        self.resource.strip_prefix("organization/")
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let valid = self.resource == Self::ALL_RESOURCES
            || self.deployment_id().map_or(false, |id| !id.is_empty())
            || self.organization_id().map_or(false, |id| !id.is_empty());
        if !valid {
            return Err(AppError::InvalidRole(format!(
                "Invalid role resource: {}",
                self.resource
            )));
        }
        Ok(())
    }
}

lazy_static! {
    pub static ref DEFAULT_ROLES: HashMap<&'static str, Role> = build_default_roles();
}

fn build_default_roles() -> HashMap<&'static str, Role> {
    use PermissionType::*;

    let roles = vec![
        Role::new(
            Some(RoleName::SUPER_ADMIN),
            RoleName::SUPER_ADMIN,
            &[
                ManageDeployment,
                EditDeployment,
                CreateOrganization,
                ManageOrganization,
                DeleteOrganization,
                RemoveUser,
                AddStaffMembers,
                EditRolePermissions,
                ViewDashboard,
            ],
            UserType::SuperAdmin,
        ),
        Role::new(
            Some(RoleName::ACCOUNT_MANAGER),
            RoleName::ACCOUNT_MANAGER,
            &[CreateOrganization, AddPatients],
            UserType::SuperAdmin,
        ),
        Role::new(
            Some(RoleName::ORGANIZATION_OWNER),
            RoleName::ORGANIZATION_OWNER,
            &[
                ManageOrganization,
                EditDeployment,
                AddStaffMembers,
                EditRolePermissions,
                ViewStaffList,
                ViewDashboard,
            ],
            UserType::Manager,
        ),
        Role::new(
            Some(RoleName::ACCESS_CONTROLLER),
            RoleName::ACCESS_CONTROLLER,
            &[
                AddStaffMembers,
                AddPatients,
                EditRolePermissions,
                ExportPatientData,
                ManageLabels,
                ViewPatientData,
                ViewStaffList,
                ViewDashboard,
            ],
            UserType::Manager,
        ),
        Role::new(
            Some(RoleName::ADMIN),
            RoleName::ADMIN,
            &[
                ManagePatientData,
                ContactPatient,
                ViewPatientData,
                ViewPatientIdentifier,
                EditRolePermissions,
                AddStaffMembers,
                ExportPatientData,
                ManagePatientModuleConfig,
                ManageLabels,
            ],
            UserType::Manager,
        ),
        Role::new(
            Some(RoleName::CONTRIBUTOR),
            RoleName::CONTRIBUTOR,
            &[ManagePatientData, ContactPatient, ViewPatientData, ViewPatientIdentifier],
            UserType::Manager,
        ),
        Role::new(
            Some(RoleName::DEPLOYMENT_STAFF),
            RoleName::DEPLOYMENT_STAFF,
            &[ContactPatient, ManagePatientData, ViewPatientData, ViewPatientIdentifier],
            UserType::Manager,
        ),
        Role::new(
            Some(RoleName::CALL_CENTER),
            RoleName::CALL_CENTER,
            &[ViewPatientData, ViewPatientIdentifier],
            UserType::Manager,
        ),
        Role::new(
            Some(RoleName::MANAGER),
            RoleName::MANAGER,
            &[ViewPatientData, ContactPatient],
            UserType::Manager,
        ),
        Role::new(Some(RoleName::USER), RoleName::USER, &[], UserType::User),
    ];

    roles
        .into_iter()
        .map(|role| {
            let key: &'static str = match role.name.as_str() {
                RoleName::SUPER_ADMIN => RoleName::SUPER_ADMIN,
                RoleName::ACCOUNT_MANAGER => RoleName::ACCOUNT_MANAGER,
                RoleName::ORGANIZATION_OWNER => RoleName::ORGANIZATION_OWNER,
                RoleName::ACCESS_CONTROLLER => RoleName::ACCESS_CONTROLLER,
                RoleName::ADMIN => RoleName::ADMIN,
                RoleName::CONTRIBUTOR => RoleName::CONTRIBUTOR,
                RoleName::DEPLOYMENT_STAFF => RoleName::DEPLOYMENT_STAFF,
                RoleName::CALL_CENTER => RoleName::CALL_CENTER,
                RoleName::MANAGER => RoleName::MANAGER,
                _ => RoleName::USER,
            };
            (key, role)
        })
        .collect()
}

pub fn default_role(role_id: &str) -> Option<&'static Role> {
    DEFAULT_ROLES.get(role_id)
}

/// Custom roles stored on a deployment or organization.
pub struct CustomRolesExtension<'a> {
    pub roles: &'a [Role],
}

impl<'a> CustomRolesExtension<'a> {
    pub fn role_name_exists(&self, role_name: &str) -> bool {
        self.roles.iter().any(|r| r.name == role_name)
    }

    pub fn find_role_by_id(&self, role_id: &str) -> Option<&'a Role> {
        self.roles.iter().find(|r| r.id.as_deref() == Some(role_id))
    }

    /// New roles must have unique names, existing ones must be known.
    pub fn validate_roles(&self, incoming: &[Role]) -> Result<(), AppError> {
        for role in incoming {
            match &role.id {
                None if self.role_name_exists(&role.name) => return Err(AppError::DuplicateRoleName),
                Some(id) if self.find_role_by_id(id).is_none() => return Err(AppError::RoleDoesNotExist),
                _ => {}
            }
        }

        let mut names = BTreeSet::new();
        for role in incoming {
            if !names.insert(role.name.as_str()) {
                return Err(AppError::DuplicateRoleName);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_permissions_always_present_and_sorted() {
        let role = Role::new(None, "Nurse", &[PermissionType::ViewPatientData, PermissionType::ViewOwnData], UserType::Manager);

        for p in PermissionType::common_permissions() {
            assert!(role.permissions.contains(&p));
        }
        let mut sorted = role.permissions.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(role.permissions, sorted);
        assert!(role.has_extra_permissions());
    }

    #[test]
    fn test_has_requires_every_policy() {
        let role = default_role(RoleName::CONTRIBUTOR).unwrap();

        assert!(role.has(&[PolicyType::ViewPatientData, PolicyType::SendPatientMessage]));
        assert!(!role.has(&[PolicyType::ViewPatientData, PolicyType::CreateDeployment]));
    }

    #[test]
    fn test_user_role_only_has_common_permissions() {
        let role = default_role(RoleName::USER).unwrap();
        assert!(!role.has_extra_permissions());
        assert!(role.has(&[PolicyType::ViewOwnMessages]));
        assert!(!role.has(&[PolicyType::ViewPatientData]));
        assert_eq!(role.user_type, UserType::User);
    }

    #[test]
    fn test_default_roles_are_indexed_by_name() {
        assert_eq!(DEFAULT_ROLES.len(), 10);
        for (key, role) in DEFAULT_ROLES.iter() {
            assert_eq!(*key, role.name);
            assert_eq!(role.id.as_deref(), Some(*key));
        }
    }

    #[test]
    fn test_role_assignment_resources() {
        let a = RoleAssignment::for_deployment("Admin", "abc");
        assert_eq!(a.deployment_id(), Some("abc"));
        assert!(a.validate().is_ok());

        assert!(RoleAssignment::new("Admin", "*").validate().is_ok());
        assert!(RoleAssignment::new("Admin", "deployment/").validate().is_err());
        assert!(RoleAssignment::new("Admin", "planet/earth").validate().is_err());
    }

    #[test]
    fn test_custom_roles_validation() {
        let existing = vec![Role::new(Some("r1"), "Nurse", &[], UserType::Manager)];
        let ext = CustomRolesExtension { roles: &existing };

        let duplicate = vec![Role::new(None, "Nurse", &[], UserType::Manager)];
        assert!(matches!(ext.validate_roles(&duplicate), Err(AppError::DuplicateRoleName)));

        let unknown = vec![Role::new(Some("r2"), "Doctor", &[], UserType::Manager)];
        assert!(matches!(ext.validate_roles(&unknown), Err(AppError::RoleDoesNotExist)));

        let ok = vec![
            Role::new(Some("r1"), "Nurse", &[], UserType::Manager),
            Role::new(None, "Doctor", &[], UserType::Manager),
        ];
        assert!(ext.validate_roles(&ok).is_ok());
    }
}
