mod helpers;
mod secret;

pub use helpers::{parse_boolean_flag, parse_number_or_default};
pub use secret::Secret;
