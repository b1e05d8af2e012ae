//! Shared utility helpers.

pub mod encoding;
pub mod error;

pub use encoding::{author_id, number_to_encoded, AUTHOR_ALPHABET};
pub use error::{BlueMarbleError, BlueMarbleResult};
