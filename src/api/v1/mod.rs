/*
 * Responsibility
 * - Public surface of v1 (routes(), handlers, extractors)
 */
pub mod extractors;
pub mod handlers;
mod routes;

pub use routes::routes;
