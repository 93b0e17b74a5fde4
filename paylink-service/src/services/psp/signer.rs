//! Request signing for the PSP api.
//!
//! The PSP wants the form body path-escaped but verifies the signature over
//! the query-escaped form of the same fields. Both serializations are built
//! here from one ordered field list; only the query form is ever signed.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use secrecy::{ExposeSecret, Secret};
use service_core::utils::signature::hmac_sha256_base64;

use super::PspError;

pub const SIGNATURE_FIELD: &str = "ApiSignature";

/// Unreserved characters plus the sub-delims allowed in a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');

/// Only unreserved characters stay literal.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// Path segment escaping, space becomes `%20`.
    Path,
    /// Query component escaping, space becomes `+`.
    Query,
}

impl Encoding {
    pub fn escape(self, value: &str) -> String {
        match self {
            Encoding::Path => utf8_percent_encode(value, PATH_SEGMENT).to_string(),
            // a literal '%' is always escaped to %25, so every %20 left is a space
            Encoding::Query => utf8_percent_encode(value, QUERY_COMPONENT)
                .to_string()
                .replace("%20", "+"),
        }
    }
}

/// `key=value` pairs joined by `&`, in the given order, both sides escaped.
pub fn serialize<K: AsRef<str>, V: AsRef<str>>(fields: &[(K, V)], encoding: Encoding) -> String {
    fields
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                encoding.escape(key.as_ref()),
                encoding.escape(value.as_ref())
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Clone)]
pub struct RequestSigner {
    secret: Secret<String>,
    fixed_signature: Option<String>,
}

impl RequestSigner {
    pub fn new(secret: Secret<String>) -> Self {
        Self {
            secret,
            fixed_signature: None,
        }
    }

    /// Replace every computed signature with a literal, so that contract
    /// tests can match request bodies byte for byte. Never set in production.
    pub fn with_fixed_signature(mut self, signature: impl Into<String>) -> Self {
        self.fixed_signature = Some(signature.into());
        self
    }

    /// Base64 HMAC-SHA256 of `payload`.
    pub fn sign(&self, payload: &str) -> Result<String, PspError> {
        if let Some(fixed) = &self.fixed_signature {
            return Ok(fixed.clone());
        }
        hmac_sha256_base64(self.secret.expose_secret().as_bytes(), payload.as_bytes())
            .map_err(|e| PspError::Downstream(format!("failed to sign request: {}", e)))
    }

    /// Path-escaped body with the signature of the query-escaped fields appended.
    pub fn signed_body<K: AsRef<str>, V: AsRef<str>>(
        &self,
        fields: &[(K, V)],
    ) -> Result<String, PspError> {
        let body = serialize(fields, Encoding::Path);
        let signature = self.sign(&serialize(fields, Encoding::Query))?;
        let signature_field = format!(
            "{}={}",
            SIGNATURE_FIELD,
            Encoding::Query.escape(&signature)
        );

        Ok(if body.is_empty() {
            signature_field
        } else {
            format!("{}&{}", body, signature_field)
        })
    }
}
