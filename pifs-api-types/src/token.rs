use serde::{Deserialize, Serialize};

pub type TokenId = String;

/// An issued API token (spec §3). Out of scope beyond what's needed to
/// resolve a `Principal`: validation hashes the presented token with
/// SHA-256 and looks up the row by `token_hash`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Token {
    pub id: TokenId,
    pub username: String,
    /// Empty means "all of the user's projects".
    pub projects: Vec<String>,
    pub token_hash: String,
    pub expires_at: Option<i64>,
    pub admin: bool,
    pub session: bool,
}

impl Token {
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(exp) if now >= exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Token {
        Token {
            id: "tok1".into(),
            username: "alice".into(),
            projects: vec![],
            token_hash: "deadbeef".into(),
            expires_at: Some(1000),
            admin: false,
            session: false,
        }
    }

    #[test]
    fn expired_once_past_deadline() {
        let t = token();
        assert!(!t.is_expired(999));
        assert!(t.is_expired(1000));
    }

    #[test]
    fn no_expiry_never_expires() {
        let mut t = token();
        t.expires_at = None;
        assert!(!t.is_expired(i64::MAX));
    }
}
