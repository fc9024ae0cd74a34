//! Session credential storage using the OS credential store.
//!
//! Android Keystore / iOS Keychain on devices, and the platform keyring
//! (Keychain, DPAPI, Secret Service) on desktop builds used for testing.

use keyring::Entry;
use tracing::warn;

const SERVICE_NAME: &str = "bolibana-stock";

// Credential keys
pub const KEY_ACCESS_TOKEN: &str = "access_token";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub const KEY_USERNAME: &str = "username";

/// All credential keys managed by this module.
pub const SESSION_KEYS: &[&str] = &[KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_USERNAME];

/// Retrieve a single credential. Returns `None` when the entry does not
/// exist or the platform store is unavailable.
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

/// Store a credential.
pub fn set_credential(key: &str, value: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    entry.set_password(value).map_err(|e| e.to_string())?;
    Ok(())
}

/// Delete a credential. Silently succeeds if the entry does not exist.
pub fn delete_credential(key: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

/// Delete every session credential. Failures are logged per key and the
/// remaining keys are still attempted.
pub fn clear_session_credentials() {
    for key in SESSION_KEYS {
        if let Err(e) = delete_credential(key) {
            warn!(key, error = %e, "keyring: failed to delete credential");
        }
    }
}
