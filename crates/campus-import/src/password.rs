//! Initial password generation for newly created entries.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generate a random alphanumeric password.
///
/// Issued once at creation and exported via the password artifact; the
/// pipeline never stores it as a plain attribute.
#[must_use]
pub fn generate_password(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
