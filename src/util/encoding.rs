//! Text encodings used by the persisted template document.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::util::{BlueMarbleError, BlueMarbleResult};

/// Alphabet for author identifiers: printable ASCII `!`..`~` without `"` and `\`.
pub const AUTHOR_ALPHABET: &str =
    "!#$%&'()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[]^_`abcdefghijklmnopqrstuvwxyz{|}~";

/// Encodes `number` in the base given by the length of `alphabet`.
///
/// The most significant digit comes first; zero maps to the first character.
/// An empty alphabet yields an empty string, and a single-character alphabet
/// cannot express positional digits, so it repeats that character once.
pub fn number_to_encoded(mut number: u64, alphabet: &str) -> String {
    let digits: Vec<char> = alphabet.chars().collect();
    let Some(&zero) = digits.first() else {
        return String::new();
    };
    if number == 0 || digits.len() == 1 {
        return zero.to_string();
    }

    let base = digits.len() as u64;
    let mut out = Vec::new();
    while number > 0 {
        out.push(digits[(number % base) as usize]);
        number /= base;
    }
    out.iter().rev().collect()
}

/// Encodes a user identifier as an author namespace token.
pub fn author_id(user_id: u64) -> String {
    number_to_encoded(user_id, AUTHOR_ALPHABET)
}

/// Standard base64 (with padding) of `bytes`.
pub fn bytes_to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes standard base64 text.
pub fn base64_to_bytes(text: &str) -> BlueMarbleResult<Vec<u8>> {
    STANDARD
        .decode(text.trim())
        .map_err(|err| BlueMarbleError::decode(format!("invalid base64: {err}")))
}
