//! Authentication (spec §6).
//!
//! Two credential forms resolve to the same [`Principal`]: a Bearer token
//! (hashed with SHA-256 and looked up by hash) or HTTP Basic credentials
//! checked against a PBKDF2-HMAC-SHA-512 digest. A pre-configured admin
//! token short-circuits both and always resolves to the admin principal.

use openssl::hash::MessageDigest;
use pifs_api_types::{ApiError, Principal};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

const PBKDF2_ITERATIONS: usize = 200_000;
const PBKDF2_SALT_LEN: usize = 20;
const PBKDF2_DIGEST_LEN: usize = 64;

#[derive(sqlx::FromRow)]
struct UserRow {
    username: String,
    password_salt: Vec<u8>,
    password_hash: Vec<u8>,
    allowed_projects: Option<Vec<String>>,
    admin: bool,
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    username: String,
    allowed_projects: Option<Vec<String>>,
    admin: bool,
}

pub struct Authenticator {
    db: PgPool,
    admin_token: String,
}

impl Authenticator {
    pub fn new(db: PgPool, admin_token: String) -> Self {
        Authenticator { db, admin_token }
    }

    pub async fn authenticate_bearer(&self, token: &str) -> Result<Principal, ApiError> {
        if constant_time_eq(token.as_bytes(), self.admin_token.as_bytes()) {
            return Ok(Principal::admin("admin"));
        }

        let hash = hex::encode(Sha256::digest(token.as_bytes()));
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT username, allowed_projects, admin FROM tokens \
             WHERE token_hash = $1 AND (expires_at IS NULL OR expires_at > $2)",
        )
        .bind(&hash)
        .bind(proxmox_time::epoch_i64())
        .fetch_optional(&self.db)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

        row.map(|r| Principal {
            username: r.username,
            allowed_projects: r.allowed_projects,
            admin: r.admin,
        })
        .ok_or(ApiError::Unauthorized)
    }

    pub async fn authenticate_basic(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Principal, ApiError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT username, password_salt, password_hash, allowed_projects, admin \
             FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .ok_or(ApiError::Unauthorized)?;

        let mut computed = vec![0u8; PBKDF2_DIGEST_LEN];
        openssl::pkcs5::pbkdf2_hmac(
            password.as_bytes(),
            &row.password_salt,
            PBKDF2_ITERATIONS,
            MessageDigest::sha512(),
            &mut computed,
        )
        .map_err(|e| ApiError::Internal(e.into()))?;

        if !constant_time_eq(&computed, &row.password_hash) {
            return Err(ApiError::Unauthorized);
        }

        Ok(Principal {
            username: row.username,
            allowed_projects: row.allowed_projects,
            admin: row.admin,
        })
    }

    /// Derives a password digest for storage at user-creation time.
    pub fn hash_password(password: &str) -> (Vec<u8>, Vec<u8>) {
        use rand::RngCore;
        let mut salt = vec![0u8; PBKDF2_SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let mut digest = vec![0u8; PBKDF2_DIGEST_LEN];
        openssl::pkcs5::pbkdf2_hmac(
            password.as_bytes(),
            &salt,
            PBKDF2_ITERATIONS,
            MessageDigest::sha512(),
            &mut digest,
        )
        .expect("pbkdf2 with a fixed, validated digest length never fails");
        (salt, digest)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_rejects_different_lengths() {
        assert!(!constant_time_eq(b"abc", b"ab"));
    }

    #[test]
    fn constant_time_eq_accepts_equal_slices() {
        assert!(constant_time_eq(b"abcdef", b"abcdef"));
    }

    #[test]
    fn hash_password_round_trips_through_pbkdf2() {
        let (salt, hash) = Authenticator::hash_password("correct horse battery staple");
        assert_eq!(salt.len(), PBKDF2_SALT_LEN);
        assert_eq!(hash.len(), PBKDF2_DIGEST_LEN);

        let mut recomputed = vec![0u8; PBKDF2_DIGEST_LEN];
        openssl::pkcs5::pbkdf2_hmac(
            b"correct horse battery staple",
            &salt,
            PBKDF2_ITERATIONS,
            MessageDigest::sha512(),
            &mut recomputed,
        )
        .unwrap();
        assert_eq!(recomputed, hash);
    }
}
