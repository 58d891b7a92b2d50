/*!
 * Authentication context extractor
 *
 * Responsibility:
 * - Give handlers the authenticated context (AuthCtx)
 * - axum glue lives in core, the type in types
 *
 * Public API:
 * - AuthCtx
 * - AuthCtxExtractor
 */

mod core;
mod types;

pub use core::AuthCtxExtractor;
pub use types::{ADMIN_ROLES, AuthCtx};
