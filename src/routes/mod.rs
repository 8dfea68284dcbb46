/// Router Module Index
///
/// Splits the API by who may reach it. The split is documentation only: the access guard
/// wraps the merged router and is the single place where access is decided.

/// Routes on the guard's public allow-list (health, login, logout).
pub mod public;

/// Routes that require an admin session (settings, identity).
pub mod admin;
