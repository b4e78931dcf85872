use crate::error::{AppError, AppResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a gallery password using Argon2id
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Accepts Argon2 hashes and legacy bcrypt (`$2a$`/`$2b$`) hashes.
pub fn verify_password(password: &str, hash: &str) -> bool {
    if hash.starts_with("$argon2") {
        return verify_argon2(password, hash);
    }
    if hash.starts_with("$2") {
        return verify_bcrypt(password, hash);
    }
    false
}

fn verify_argon2(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed_hash) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok(),
        Err(_) => false,
    }
}

fn verify_bcrypt(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Verifies and, for a valid bcrypt hash, returns an Argon2 replacement.
pub fn verify_and_migrate(password: &str, hash: &str) -> (bool, Option<String>) {
    if hash.starts_with("$argon2") {
        return (verify_argon2(password, hash), None);
    }

    if hash.starts_with("$2") && verify_bcrypt(password, hash) {
        return (true, hash_password(password).ok());
    }

    (false, None)
}
