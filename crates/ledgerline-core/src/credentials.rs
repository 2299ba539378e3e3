//! Access-credential resolution for provider calls
//!
//! Links store an opaque credential handle. Turning that handle into the
//! secret the provider expects is delegated so that at-rest encryption can
//! live outside the ledger.

use crate::error::{Error, Result};
use crate::models::Link;

/// Resolves a link's stored handle into a usable provider credential
pub trait CredentialResolver: Send + Sync {
    fn resolve_access_credential(&self, link: &Link) -> Result<String>;
}

/// Treats the stored handle as the credential itself
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredCredentials;

impl CredentialResolver for StoredCredentials {
    fn resolve_access_credential(&self, link: &Link) -> Result<String> {
        let credential = link.access_credential.trim();
        if credential.is_empty() {
            return Err(Error::CredentialUnavailable(format!(
                "Link {} has no stored access credential",
                link.id
            )));
        }
        Ok(credential.to_string())
    }
}
