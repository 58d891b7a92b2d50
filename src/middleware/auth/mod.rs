pub mod access;
pub mod rbac;
