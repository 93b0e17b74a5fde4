//! Small helpers shared by the PSP and webhook payload types.

use serde::{Deserialize, Deserializer};

/// Treat an explicit `null` like a missing field.
///
/// `#[serde(default)]` only covers absent fields, the PSP sends `null` for
/// unset strings and numbers as well.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
