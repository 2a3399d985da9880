//! Node identity on disk.
//!
//! The secret key lives in a single file as 64 hex characters. It is created
//! on first start with owner-only permissions and never rewritten afterwards.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

use tether_core::SecretKey;

pub fn load_or_create(path: &Path) -> Result<SecretKey> {
    if path.exists() {
        let text = Zeroizing::new(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read secret key {}", path.display()))?,
        );
        return SecretKey::from_hex(text.trim())
            .with_context(|| format!("secret key {} is not a valid key", path.display()));
    }

    let secret = SecretKey::generate();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut file = open_private(path)
        .with_context(|| format!("failed to create secret key {}", path.display()))?;
    file.write_all(secret.to_hex().as_bytes())?;
    file.write_all(b"\n")?;
    tracing::info!(path = %path.display(), "generated new secret key");
    Ok(secret)
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create_new(true).open(path)
}
