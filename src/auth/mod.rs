//! Token-based session resumption.

mod token;

pub use token::{Claims, TokenService};
