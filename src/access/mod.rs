//! Role-based access control: who a client is and which APIs it may call.

mod resolver;
mod role;

pub use resolver::{AccessDenied, RoleResolver};
pub use role::{
    sha256_hex, ApiAllowance, AuthMethod, ResolvedRole, RoleConfigError, RoleDefinition, RoleSet,
};
