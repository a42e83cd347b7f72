//! Vault key commands: keygen, encrypt, decrypt.

use super::CliResult;
use crate::state_dir::StateError;
use cardsync_security::{CredentialVault, VaultKey, VaultResult};

/// Parses the `--key` argument.
pub fn parse_key(hex: Option<&str>) -> VaultResult<Option<VaultKey>> {
    hex.map(|h| VaultKey::from_hex(h.trim())).transpose()
}

/// Runs the keygen command. With a passphrase and salt the key is derived,
/// otherwise it is random.
pub fn keygen(passphrase: Option<&str>, salt: Option<&str>) -> CliResult {
    let key = match (passphrase, salt) {
        (Some(passphrase), Some(salt)) => {
            VaultKey::derive_from_passphrase(passphrase.as_bytes(), salt.as_bytes())?
        }
        (Some(_), None) => return Err("--passphrase needs --salt".into()),
        _ => VaultKey::generate(),
    };
    println!("{}", key.to_hex().as_str());
    Ok(())
}

/// Runs the encrypt command.
pub fn encrypt(key: Option<VaultKey>, plaintext: &str) -> CliResult {
    let vault = CredentialVault::new(key.ok_or(StateError::MissingKey)?);
    println!("{}", vault.encrypt(plaintext)?);
    Ok(())
}

/// Runs the decrypt command.
pub fn decrypt(key: Option<VaultKey>, stored: &str) -> CliResult {
    let vault = CredentialVault::new(key.ok_or(StateError::MissingKey)?);
    println!("{}", vault.decrypt(stored.trim())?.as_str());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_argument() {
        assert!(parse_key(None).unwrap().is_none());
        let hex = VaultKey::generate().to_hex();
        assert!(parse_key(Some(&format!(" {} ", hex.as_str()))).unwrap().is_some());
        assert!(parse_key(Some("abcd")).is_err());
        assert!(parse_key(Some("not hex")).is_err());
    }

    #[test]
    fn commands_need_a_key() {
        assert!(encrypt(None, "pw").is_err());
        assert!(decrypt(None, "00:00:00").is_err());
        assert!(keygen(Some("phrase"), None).is_err());
        assert!(keygen(Some("phrase"), Some("salt")).is_ok());
    }
}
