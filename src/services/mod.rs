pub mod auth_service;
pub mod authorization_service;
pub mod deployment_service;
pub mod identity_verification_service;
pub mod inbox_service;
pub mod module_result_service;
pub mod notification_service;
pub mod organization_service;
pub mod storage_service;
