//! Route paths shared by the router and the access guards.

pub const HOME: &str = "/";
pub const LOGIN: &str = "/login";
pub const ORGANIZATION_JOIN: &str = "/organization/join";
pub const DASHBOARD: &str = "/dashboard";
