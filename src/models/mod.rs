pub mod authorized_user;
pub mod deployment;
pub mod device;
pub mod file_storage;
pub mod message;
pub mod module_result;
pub mod organization;
pub mod role;
pub mod user;
pub mod verification;

pub use authorized_user::*;
pub use deployment::*;
pub use device::*;
pub use file_storage::*;
pub use message::*;
pub use module_result::*;
pub use organization::*;
pub use role::*;
pub use user::*;
pub use verification::*;

use mongodb::bson::DateTime as BsonDateTime;

/// RFC 3339 rendering used in every API response.
pub fn format_datetime(dt: &BsonDateTime) -> String {
    dt.try_to_rfc3339_string().unwrap_or_default()
}
