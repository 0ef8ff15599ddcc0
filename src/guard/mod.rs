//! Pre-credential gates on the login path: attempt throttling and account
//! lockout.

pub mod lockout;
pub mod rate_limit;
