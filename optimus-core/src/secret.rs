//! Secret registration and lookup
//!
//! Secrets are scoped to a project, optionally narrowed to a namespace.
//! Values travel base64-encoded on the wire and are validated on write.

use crate::tenant::{NamespaceId, ProjectId};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Names with this prefix are reserved for system-managed secrets and
/// rejected on user writes.
pub const SYSTEM_DEFINED_SECRET_PREFIX: &str = "_OPTIMUS_";

/// A secret registered under a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    /// Secret name, unique within the project
    pub name: String,

    /// Decoded secret value
    pub value: String,

    /// Owning project
    pub project_id: ProjectId,

    /// Optional namespace restriction
    pub namespace_id: Option<NamespaceId>,
}

/// A name/value pair handed to plugins during dependency generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretItem {
    pub name: String,
    pub value: String,
}

impl Secret {
    /// Validate and construct a secret from its wire form.
    ///
    /// The wire value must be valid base64; names carrying the reserved
    /// system prefix are rejected.
    pub fn from_wire(
        name: impl Into<String>,
        encoded_value: &str,
        project_id: ProjectId,
        namespace_id: Option<NamespaceId>,
    ) -> crate::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::Error::invalid_argument(
                "unable to register secret",
                "secret name cannot be empty",
            ));
        }
        if name.starts_with(SYSTEM_DEFINED_SECRET_PREFIX) {
            return Err(crate::Error::invalid_argument(
                "unable to register secret",
                format!(
                    "secret name cannot be started with {}",
                    SYSTEM_DEFINED_SECRET_PREFIX
                ),
            ));
        }

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded_value)
            .map_err(|e| {
                crate::Error::invalid_argument(
                    "unable to register secret",
                    format!("failed to decode base64 string: {}", e),
                )
            })?;
        let value = String::from_utf8(decoded).map_err(|e| {
            crate::Error::invalid_argument(
                "unable to register secret",
                format!("secret value is not valid utf-8: {}", e),
            )
        })?;

        Ok(Self {
            name,
            value,
            project_id,
            namespace_id,
        })
    }

    /// Base64-encode the value for the wire
    pub fn encoded_value(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.value.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_from_wire() {
        let project_id = ProjectId::new();
        let secret = Secret::from_wire("BQ_KEY", "c2VjcmV0LXZhbHVl", project_id, None).unwrap();
        assert_eq!(secret.value, "secret-value");
        assert_eq!(secret.encoded_value(), "c2VjcmV0LXZhbHVl");
    }

    #[test]
    fn test_reserved_prefix_rejected() {
        let result = Secret::from_wire("_OPTIMUS_TOKEN", "dg==", ProjectId::new(), None);
        assert!(matches!(result, Err(crate::Error::InvalidArgument(_))));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let result = Secret::from_wire("BQ_KEY", "not base64!!", ProjectId::new(), None);
        assert!(matches!(result, Err(crate::Error::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = Secret::from_wire("", "dg==", ProjectId::new(), None);
        assert!(matches!(result, Err(crate::Error::InvalidArgument(_))));
    }
}
