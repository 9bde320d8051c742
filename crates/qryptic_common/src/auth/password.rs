use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PasswordError {
    #[error("failed to hash password")]
    Hash,
    #[error("password verification failed")]
    Verification,
}

/// Salted adaptive-cost hash in PHC string format.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| PasswordError::Hash)
}

pub fn verify_password(password: &str, hash: &str) -> Result<(), PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|_| PasswordError::Verification)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| PasswordError::Verification)
}

#[cfg(test)]
mod tests {
    use claims::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn hash_and_verify() {
        let hash = assert_ok!(hash_password("correct horse battery staple"));
        assert_ok!(verify_password("correct horse battery staple", &hash));
        assert_err!(verify_password("Tr0ub4dor&3", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let first = assert_ok!(hash_password("hunter2"));
        let second = assert_ok!(hash_password("hunter2"));
        assert_ne!(first, second);
    }

    #[test]
    fn garbage_hash_is_rejected() {
        assert_eq!(
            verify_password("hunter2", "not a phc string"),
            Err(PasswordError::Verification)
        );
    }
}
