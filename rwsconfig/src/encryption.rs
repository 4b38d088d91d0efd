//! Secrets at rest in `config.yaml`
//!
//! A client secret or an entry code can be stored as `encrypted:<base64>`
//! instead of plain text. The base64 payload is a 12 byte AES-GCM nonce
//! followed by the ciphertext. The AES-256 key is a SHA-256 of the machine
//! identifier, so such a value only decrypts on the machine that wrote it.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

const MARKER: &str = "encrypted:";
const NONCE_LEN: usize = 12;
const KEY_DOMAIN: &[u8] = b"rwsconfig/secret-key/1";
const NONCE_DOMAIN: &[u8] = b"rwsconfig/secret-nonce/1";

struct SecretKey([u8; 32]);

impl SecretKey {
    fn for_this_machine() -> Result<Self> {
        let id = machine_id().context("machine identifier unavailable")?;
        let digest = Sha256::new()
            .chain_update(id.trim())
            .chain_update(KEY_DOMAIN)
            .finalize();

        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Ok(Self(key))
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.0).map_err(|e| anyhow!("invalid AES key: {}", e))
    }

    /// The nonce hashes the plaintext, so a secret always encrypts the same way
    fn seal(&self, secret: &str) -> Result<String> {
        let digest = Sha256::new()
            .chain_update(secret)
            .chain_update(NONCE_DOMAIN)
            .finalize();
        let nonce = &digest[..NONCE_LEN];

        let sealed = self
            .cipher()?
            .encrypt(Nonce::from_slice(nonce), secret.as_bytes())
            .map_err(|e| anyhow!("cannot encrypt secret: {}", e))?;

        Ok(format!("{}{}", MARKER, STANDARD.encode([nonce, &sealed[..]].concat())))
    }

    fn open(&self, stored: &str) -> Result<String> {
        let Some(encoded) = stored.strip_prefix(MARKER) else {
            bail!("value does not start with {:?}", MARKER);
        };
        let bytes = STANDARD
            .decode(encoded)
            .context("encrypted value is not base64")?;
        if bytes.len() <= NONCE_LEN {
            bail!("encrypted value is truncated");
        }

        let (nonce, sealed) = bytes.split_at(NONCE_LEN);
        let plain = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| anyhow!("cannot decrypt secret, written on another machine?"))?;
        String::from_utf8(plain).context("decrypted secret is not UTF-8")
    }
}

#[cfg(target_os = "linux")]
fn machine_id() -> Result<String> {
    ["/etc/machine-id", "/var/lib/dbus/machine-id"]
        .iter()
        .find_map(|file| std::fs::read_to_string(file).ok())
        .ok_or_else(|| anyhow!("no machine-id file"))
}

#[cfg(target_os = "macos")]
fn machine_id() -> Result<String> {
    let output = std::process::Command::new("ioreg")
        .args(["-d2", "-c", "IOPlatformExpertDevice"])
        .output()?;
    // "IOPlatformUUID" = "XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX"
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .find(|line| line.contains("IOPlatformUUID"))
        .and_then(|line| line.split('"').nth(3))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("IOPlatformUUID missing from ioreg output"))
}

#[cfg(target_os = "windows")]
fn machine_id() -> Result<String> {
    let output = std::process::Command::new("wmic")
        .args(["csproduct", "get", "UUID"])
        .output()?;
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .nth(1)
        .map(|line| line.trim().to_string())
        .ok_or_else(|| anyhow!("UUID missing from wmic output"))
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn machine_id() -> Result<String> {
    Err(anyhow!("no machine identifier on this platform"))
}

/// Encrypts `secret` for storage in the configuration of this machine
///
/// ```rust,ignore
/// config.set_value(&["relatics", "client_secret"], encrypt_secret("s3cr3t")?.into())?;
/// ```
pub fn encrypt_secret(secret: &str) -> Result<String> {
    SecretKey::for_this_machine()?.seal(secret)
}

/// Reverses [`encrypt_secret`]
pub fn decrypt_secret(stored: &str) -> Result<String> {
    SecretKey::for_this_machine()?.open(stored)
}

pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(MARKER)
}

/// Plain text of a stored secret, decrypting only `encrypted:` values
pub fn get_secret(value: &str) -> Result<String> {
    if is_encrypted(value) {
        decrypt_secret(value)
    } else {
        Ok(value.to_string())
    }
}
