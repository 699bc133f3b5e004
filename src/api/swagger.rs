use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Phoenix Platform API",
        version = "1.0.0",
        description = "Modular health backend: authentication, role-based access, patient inbox, file storage, identity verification, questionnaire scoring, deployments and organizations.\n\n**Authentication:** every endpoint except sign up, sign in, token refresh, signed downloads and the verification callback requires a JWT Bearer access token.",
        contact(
            name = "Phoenix Platform Team",
            email = "support@phoenix-platform.dev"
        )
    ),
    paths(
        // Health & Metrics
        crate::api::health::health_check,
        crate::api::metrics::get_metrics,

        // Auth
        crate::api::auth::sign_up,
        crate::api::auth::sign_in,
        crate::api::auth::refresh_token,
        crate::api::auth::sign_out,
        crate::api::auth::auth_profile,
        crate::api::auth::retrieve_sessions,
        crate::api::auth::delete_user,

        // Users & roles
        crate::api::user::retrieve_profile,
        crate::api::user::update_profile,
        crate::api::user::add_role,
        crate::api::user::list_default_roles,

        // Inbox
        crate::api::inbox::send_message,
        crate::api::inbox::send_message_to_user_list,
        crate::api::inbox::search_messages,
        crate::api::inbox::search_summary,
        crate::api::inbox::confirm_messages,
        crate::api::inbox::unread_count,

        // Storage
        crate::api::storage::upload_to_bucket,
        crate::api::storage::download_from_bucket,
        crate::api::storage::signed_url_for_bucket,
        crate::api::storage::upload_file,
        crate::api::storage::download_file,
        crate::api::storage::retrieve_signed_url,
        crate::api::storage::download_signed,

        // Identity verification
        crate::api::identity_verification::verification_callback,
        crate::api::identity_verification::register_applicant,
        crate::api::identity_verification::retrieve_verification_log,

        // Module results
        crate::api::module_result::submit_module_result,
        crate::api::module_result::retrieve_module_results,

        // Deployments
        crate::api::deployment::create_deployment,
        crate::api::deployment::search_deployments,
        crate::api::deployment::retrieve_deployment,
        crate::api::deployment::update_deployment,
        crate::api::deployment::delete_deployment,
        crate::api::deployment::create_or_update_module_config,
        crate::api::deployment::delete_module_config,
        crate::api::deployment::create_or_update_roles,

        // Organizations
        crate::api::organization::create_organization,
        crate::api::organization::search_organizations,
        crate::api::organization::retrieve_organization,
        crate::api::organization::update_organization,
        crate::api::organization::delete_organization,
        crate::api::organization::link_deployment,
        crate::api::organization::unlink_deployment,
        crate::api::organization::create_or_update_roles,

        // Notifications
        crate::api::notification::register_device,
        crate::api::notification::unregister_device,
        crate::api::notification::retrieve_devices,
    ),
    components(
        schemas(
            crate::api::health::HealthResponse,

            // Auth
            crate::services::auth_service::SignUpRequest,
            crate::services::auth_service::SignUpResponse,
            crate::services::auth_service::SignInRequest,
            crate::services::auth_service::RefreshTokenRequest,
            crate::services::auth_service::SignOutRequest,
            crate::services::auth_service::AuthResponse,
            crate::models::SessionResponse,

            // Users & roles
            crate::models::UserProfile,
            crate::models::UpdateProfileRequest,
            crate::models::AddRoleRequest,
            crate::models::VerificationStatus,
            crate::models::Role,
            crate::models::RoleAssignment,
            crate::models::PermissionType,
            crate::models::UserType,

            // Inbox
            crate::models::SendMessageRequest,
            crate::models::SendMessageToUserListRequest,
            crate::models::SearchMessagesRequest,
            crate::models::ConfirmMessagesRequest,
            crate::models::MessageResponse,
            crate::models::MessageStatus,
            crate::models::MessageSummary,
            crate::models::MessageSummaryResponse,

            // Storage
            crate::models::SignedUrlResponse,
            crate::models::UploadResponse,
            crate::models::FileStorageResponse,

            // Identity verification
            crate::models::VerificationCheck,
            crate::models::RegisterApplicantRequest,
            crate::models::VerificationLogResponse,
            crate::models::CheckStatus,
            crate::models::CheckResult,

            // Module results
            crate::models::SubmitModuleResultRequest,
            crate::models::QuestionnaireAnswer,
            crate::models::ModuleResultResponse,

            // Deployments
            crate::models::CreateDeploymentRequest,
            crate::models::UpdateDeploymentRequest,
            crate::models::ListDeploymentsRequest,
            crate::models::UpdateRolesRequest,
            crate::models::DeploymentResponse,
            crate::models::DeploymentStatus,
            crate::models::ModuleConfig,
            crate::models::ModuleConfigStatus,
            crate::models::Features,
            crate::models::MessagingFeature,

            // Organizations
            crate::models::CreateOrganizationRequest,
            crate::models::UpdateOrganizationRequest,
            crate::models::ListOrganizationsRequest,
            crate::models::LinkDeploymentRequest,
            crate::models::OrganizationResponse,
            crate::models::OrganizationStatus,

            // Notifications
            crate::models::RegisterDeviceRequest,
            crate::models::UnregisterDeviceRequest,
            crate::models::DeviceResponse,
            crate::models::PushIdType,
        )
    ),
    tags(
        (name = "Health", description = "Health check and Prometheus metrics."),
        (name = "Auth", description = "Email and password sign up, sign in, token refresh, sign out and sessions."),
        (name = "Users", description = "User profiles, role assignment and the default role catalog."),
        (name = "Inbox", description = "Messages between deployment staff and patients."),
        (name = "Storage", description = "Bucket objects, user files and signed download URLs."),
        (name = "Identity Verification", description = "Onfido applicant registration, result callback and verification log."),
        (name = "Module Results", description = "Questionnaire submissions and their computed scores."),
        (name = "Deployments", description = "Deployments, their module configs and custom roles."),
        (name = "Organizations", description = "Organizations and the deployments linked to them."),
        (name = "Notifications", description = "Push device registration for the caller."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Access token from /api/auth/v1/signin"))
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_module_paths() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;

        assert!(paths.contains_key("/api/auth/v1/signin"));
        assert!(paths.contains_key("/api/extensions/v1beta/user/{user_id}/module-result/{module_id}"));
        assert!(paths.contains_key("/api/storage/v1/signed/{token}"));
        assert!(doc
            .components
            .as_ref()
            .map_or(false, |c| c.security_schemes.contains_key("bearer_auth")));
    }
}
