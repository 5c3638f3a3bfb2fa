//! Proxy normalization and cookie-jar resolution.
//!
//! Both are optional: a missing proxy or cookie jar only means requests go
//! out directly and anonymously.

use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Adds `http://` when the value carries no scheme. Empty values mean "no
/// proxy".
pub fn normalize_proxy(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains("://") {
        Some(trimmed.to_owned())
    } else {
        Some(format!("http://{trimmed}"))
    }
}

/// A cookie jar usable by the download tool.
#[derive(Debug)]
pub enum CredentialHandle {
    /// A cookie file that already existed on disk.
    File(PathBuf),
    /// A cookie file decoded from the environment; removed on drop.
    Decoded(NamedTempFile),
}

impl CredentialHandle {
    pub fn path(&self) -> &Path {
        match self {
            CredentialHandle::File(path) => path.as_path(),
            CredentialHandle::Decoded(file) => file.path(),
        }
    }
}

/// Resolves the cookie jar for one request.
///
/// `local_file` wins when it exists. Otherwise `encoded` (a base64 cookie
/// bundle) is decoded into a fresh temporary file. Any failure leaves the
/// request without credentials.
pub fn resolve_credentials(local_file: &Path, encoded: Option<&str>) -> Option<CredentialHandle> {
    if local_file.is_file() {
        info!(path = %local_file.display(), "using local cookie file");
        return Some(CredentialHandle::File(local_file.to_path_buf()));
    }

    let encoded = encoded.map(str::trim).filter(|value| !value.is_empty())?;
    match decode_to_tempfile(encoded) {
        Ok(file) => {
            info!("using cookies decoded from the environment");
            Some(CredentialHandle::Decoded(file))
        }
        Err(err) => {
            warn!(error = %err, "ignoring unusable cookie bundle");
            None
        }
    }
}

fn decode_to_tempfile(encoded: &str) -> anyhow::Result<NamedTempFile> {
    let compact: String = encoded.split_whitespace().collect();
    let bytes = STANDARD.decode(compact.as_bytes())?;
    let mut file = tempfile::Builder::new()
        .prefix("captions-cookies-")
        .suffix(".txt")
        .tempfile()?;
    file.write_all(&bytes)?;
    file.flush()?;
    Ok(file)
}
