//! 认证模块
//!
//! JWT validation for user-facing endpoints plus the shared-secret guard used
//! by machine callers (sweep scheduler, payment confirmation callback).

mod extractor;
mod jwt;

pub use extractor::ServiceAuth;
pub use jwt::{Claims, CurrentUser, JwtConfig, JwtError, JwtService, Role};
