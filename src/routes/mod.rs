/// Router Module Index
///
/// Routes grouped by who may reach them. Access control is attached per group
/// in `create_router`.

/// Routes open to every visitor.
pub mod public;

/// Routes behind the `login_required` layer.
pub mod authenticated;

/// Admin panel routes. Each handler requires a staff session.
pub mod admin;
