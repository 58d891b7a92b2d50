/*
 * Responsibility
 * - Public surface of the middleware (access / rbac / cors / http / metrics)
 */
pub mod auth;
pub mod cors;
pub mod http;
pub mod metrics;
