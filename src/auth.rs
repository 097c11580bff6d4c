//! Bearer credentials consumed from the identity layer.

pub mod secret;
pub mod token_source;

pub use secret::*;
pub use token_source::*;
