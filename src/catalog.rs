//! Loading OTP entries from a 2FAS backup file.
//!
//! The backup format, its decryption and code generation all belong to
//! external crates; this module only routes a path and a passphrase to them
//! and classifies what went wrong so callers can decide how to recover.

use crate::crypto::{self, CryptoError};
use crate::entry::OtpEntry;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("backup is encrypted and no passphrase was given")]
    PassphraseRequired,
    #[error("invalid passphrase")]
    InvalidPassphrase,
    #[error("backup file is malformed: {0}")]
    Malformed(String),
    #[error("cannot read backup file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CatalogError {
    /// Whether asking for a (different) passphrase could fix this.
    pub fn wants_passphrase(&self) -> bool {
        matches!(
            self,
            CatalogError::PassphraseRequired | CatalogError::InvalidPassphrase
        )
    }
}

impl From<CryptoError> for CatalogError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidPassphrase => CatalogError::InvalidPassphrase,
            CryptoError::Malformed(msg) => CatalogError::Malformed(msg),
        }
    }
}

/// Source of OTP entries.
pub trait ServiceCatalog {
    fn load(&self, path: &Path, passphrase: Option<&str>) -> Result<Vec<OtpEntry>, CatalogError>;
}

/// Reads 2FAS `.2fas` / JSON exports.
#[derive(Debug, Default, Clone, Copy)]
pub struct TwoFasCatalog;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackupFile {
    services: Option<Vec<OtpEntry>>,
    #[serde(default)]
    services_encrypted: Option<String>,
}

impl ServiceCatalog for TwoFasCatalog {
    fn load(&self, path: &Path, passphrase: Option<&str>) -> Result<Vec<OtpEntry>, CatalogError> {
        let data = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let entries = parse_backup(&data, passphrase)?;
        info!("loaded {} services from {}", entries.len(), path.display());
        Ok(entries)
    }
}

pub fn parse_backup(data: &str, passphrase: Option<&str>) -> Result<Vec<OtpEntry>, CatalogError> {
    let file: BackupFile =
        serde_json::from_str(data).map_err(|e| CatalogError::Malformed(e.to_string()))?;

    let encrypted = file.services_encrypted.filter(|s| !s.is_empty());
    let mut entries = match (file.services, encrypted) {
        (Some(services), _) if !services.is_empty() => services,
        (_, Some(encrypted)) => {
            let passphrase = passphrase
                .filter(|p| !p.is_empty())
                .ok_or(CatalogError::PassphraseRequired)?;
            debug!("decrypting servicesEncrypted");
            let plain = crypto::decrypt_services(&encrypted, passphrase)?;
            serde_json::from_slice::<Vec<OtpEntry>>(&plain)
                .map_err(|e| CatalogError::Malformed(format!("decrypted services: {e}")))?
        }
        (Some(empty), None) => empty,
        (None, None) => {
            return Err(CatalogError::Malformed(
                "no services or servicesEncrypted, not a 2FAS backup".to_string(),
            ));
        }
    };

    // Stable: entries without a position keep their file order after positioned ones.
    entries.sort_by_key(|e| e.order.map_or(i64::MAX, |o| o.position));
    Ok(entries)
}
