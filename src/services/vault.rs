//! Encrypted secret vault.
//!
//! The vault is a single JSON document next to the stack file. The key/value
//! payload is sealed with ChaCha20-Poly1305 under a key derived from the
//! passphrase with Argon2id; salt, nonce and KDF parameters ride along in
//! the clear. A failed AEAD open means a wrong passphrase or a tampered
//! file and surfaces as `VaultError::Auth` before any service is touched.
//!
//! Decrypted material lives only in the returned `SecretStore` for the
//! duration of one run and is never written back in plaintext.

use crate::domain::errors::VaultError;
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const VAULT_FILE: &str = "vault.json";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Serialize, Deserialize)]
struct VaultDocument {
    version: u32,
    kdf: KdfParams,
    salt: String,
    nonce: String,
    ciphertext: String,
}

#[derive(Serialize, Deserialize, Clone, Copy)]
struct KdfParams {
    m_cost: u32,
    t_cost: u32,
    p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 19456,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

/// Decrypted key/value mapping, valid for one unlocked session. Read-only,
/// so concurrent config resolution shares it without re-decrypting.
#[derive(Default)]
pub struct SecretStore {
    entries: BTreeMap<String, String>,
}

impl SecretStore {
    pub fn resolve(&self, key: &str) -> Result<&str, VaultError> {
        self.entries
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| VaultError::MissingSecret(key.to_string()))
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// No Debug derive on SecretStore: values must never leak through formatting.
impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretStore({} entries)", self.entries.len())
    }
}

pub fn vault_path(stack_dir: &Path) -> PathBuf {
    stack_dir.join(VAULT_FILE)
}

/// Unlock the vault for one run. A missing vault file yields an empty store
/// so stacks without secrets need no passphrase; an existing vault with no
/// passphrase supplied is a hard error.
pub fn unlock(stack_dir: &Path, passphrase: Option<&str>) -> Result<SecretStore, VaultError> {
    let path = vault_path(stack_dir);
    if !path.exists() {
        return Ok(SecretStore::default());
    }
    let passphrase = passphrase.ok_or(VaultError::NoPassphrase)?;
    let raw = std::fs::read_to_string(&path)?;
    let doc: VaultDocument =
        serde_json::from_str(&raw).map_err(|e| VaultError::Invalid(e.to_string()))?;

    let salt = decode_hex(&doc.salt)?;
    let nonce = decode_hex(&doc.nonce)?;
    if nonce.len() != NONCE_LEN {
        return Err(VaultError::Invalid("bad nonce length".to_string()));
    }
    let ciphertext = decode_hex(&doc.ciphertext)?;

    let key = derive_key(passphrase, &salt, doc.kdf)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|_| VaultError::Auth)?;

    let entries: BTreeMap<String, String> =
        serde_json::from_slice(&plaintext).map_err(|e| VaultError::Invalid(e.to_string()))?;
    Ok(SecretStore { entries })
}

/// Create an empty vault. Refuses to overwrite an existing one.
pub fn init(stack_dir: &Path, passphrase: &str) -> Result<(), VaultError> {
    let path = vault_path(stack_dir);
    if path.exists() {
        return Err(VaultError::Invalid(format!(
            "vault already exists at {}",
            path.display()
        )));
    }
    seal(&path, passphrase, &BTreeMap::new())
}

pub fn set(stack_dir: &Path, passphrase: &str, key: &str, value: &str) -> Result<(), VaultError> {
    let mut store = unlock_required(stack_dir, passphrase)?;
    store.entries.insert(key.to_string(), value.to_string());
    seal(&vault_path(stack_dir), passphrase, &store.entries)
}

pub fn unset(stack_dir: &Path, passphrase: &str, key: &str) -> Result<bool, VaultError> {
    let mut store = unlock_required(stack_dir, passphrase)?;
    let removed = store.entries.remove(key).is_some();
    seal(&vault_path(stack_dir), passphrase, &store.entries)?;
    Ok(removed)
}

fn unlock_required(stack_dir: &Path, passphrase: &str) -> Result<SecretStore, VaultError> {
    let path = vault_path(stack_dir);
    if !path.exists() {
        return Err(VaultError::Invalid(format!(
            "no vault at {} (run `vault init` first)",
            path.display()
        )));
    }
    unlock(stack_dir, Some(passphrase))
}

fn seal(path: &Path, passphrase: &str, entries: &BTreeMap<String, String>) -> Result<(), VaultError> {
    let kdf = KdfParams::default();
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let key = derive_key(passphrase, &salt, kdf)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let plaintext =
        serde_json::to_vec(entries).map_err(|e| VaultError::Invalid(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
        .map_err(|_| VaultError::Invalid("encryption failed".to_string()))?;

    let doc = VaultDocument {
        version: 1,
        kdf,
        salt: hex::encode(salt),
        nonce: hex::encode(nonce),
        ciphertext: hex::encode(ciphertext),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_string_pretty(&doc).map_err(|e| VaultError::Invalid(e.to_string()))?;
    std::fs::write(path, raw)?;
    Ok(())
}

fn derive_key(passphrase: &str, salt: &[u8], kdf: KdfParams) -> Result<[u8; KEY_LEN], VaultError> {
    let params = Params::new(kdf.m_cost, kdf.t_cost, kdf.p_cost, Some(KEY_LEN))
        .map_err(|e| VaultError::Invalid(format!("bad kdf parameters: {e}")))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = [0u8; KEY_LEN];
    argon
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| VaultError::Invalid(format!("key derivation failed: {e}")))?;
    Ok(key)
}

/// Resolve the passphrase from the CLI flag, then the env-provided file path,
/// then the env value. `--passphrase-file -` reads one line from stdin.
pub fn load_passphrase(passphrase_file: Option<&str>) -> Result<Option<String>, VaultError> {
    if let Some(p) = passphrase_file {
        if p == "-" {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            return Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()));
        }
        let raw = std::fs::read_to_string(p)?;
        return Ok(Some(raw.trim_end_matches(['\r', '\n']).to_string()));
    }
    if let Ok(path) = std::env::var("HOMESTACK_PASSPHRASE_FILE") {
        let raw = std::fs::read_to_string(path)?;
        return Ok(Some(raw.trim_end_matches(['\r', '\n']).to_string()));
    }
    if let Ok(value) = std::env::var("HOMESTACK_PASSPHRASE") {
        return Ok(Some(value));
    }
    Ok(None)
}

fn decode_hex(s: &str) -> Result<Vec<u8>, VaultError> {
    hex::decode(s).map_err(|e| VaultError::Invalid(format!("bad hex: {e}")))
}
