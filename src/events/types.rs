use crate::models::{AuthorizedUser, CheckResult, CheckStatus, VerificationStatus};

use super::Event;

macro_rules! impl_event {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Event for $ty {
                fn name(&self) -> &'static str {
                    stringify!($ty)
                }
            }
        )*
    };
}

pub struct PreSignUpEvent {
    pub email: String,
    pub display_name: Option<String>,
}

pub struct PostSignUpEvent {
    pub user_id: String,
    pub email: String,
}

pub struct PostSignOutEvent {
    pub user_id: String,
    pub device_agent: Option<String>,
}

pub struct DeleteUserEvent {
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxAction {
    SendMessage,
    SearchMessages,
    SummaryMessages,
    ConfirmMessages,
    SendMessageToUserList,
}

/// Raised before an inbox operation so authorization can veto it.
pub struct InboxAuthEvent {
    pub action: InboxAction,
    pub caller: AuthorizedUser,
    pub target_user_id: Option<String>,
}

pub struct PreCreateMessageEvent {
    pub text: String,
    pub custom: bool,
    pub submitter_id: String,
    pub receiver_id: String,
}

pub struct PostCreateModuleResultEvent {
    pub module_result_id: String,
    pub user_id: String,
    pub deployment_id: String,
    pub module_id: String,
}

pub struct VerificationResultEvent {
    pub user_id: String,
    pub status: VerificationStatus,
    pub check_status: Option<CheckStatus>,
    pub check_result: Option<CheckResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageAction {
    Download,
    SignedUrl,
}

/// Raised before a stored file is read by someone other than its owner.
pub struct StorageAuthEvent {
    pub action: StorageAction,
    pub caller: AuthorizedUser,
    pub owner_id: String,
}

impl_event!(
    PreSignUpEvent,
    PostSignUpEvent,
    PostSignOutEvent,
    DeleteUserEvent,
    InboxAuthEvent,
    PreCreateMessageEvent,
    PostCreateModuleResultEvent,
    VerificationResultEvent,
    StorageAuthEvent,
);
