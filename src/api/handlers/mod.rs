//! API handlers for amora-auth.

pub mod auth;
pub mod health;
pub mod me;
pub mod root;
