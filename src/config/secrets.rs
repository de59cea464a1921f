//! Secret handling utilities.
//!
//! Re-exports secrecy types. Secrets only leave the process through
//! [`serialize_exposed`], used on the worker-facing token responses.

pub use secrecy::{ExposeSecret, SecretString};

/// `serialize_with` helper that writes the secret in clear text.
pub fn serialize_exposed<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}
