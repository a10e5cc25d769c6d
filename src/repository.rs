//! User persistence.
//!
//! Handlers depend on the [`UserRepository`] trait only. The bundled
//! [`MemoryUserRepository`] keeps accounts in a [`DashMap`] for the lifetime of
//! the process and is seeded from configuration at startup.

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Claims, UserProfile};

/// A stored account.
#[derive(Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub role: String,
    salt: [u8; 16],
    password_digest: [u8; 32],
}

impl UserRecord {
    /// Create a record with a freshly salted password digest.
    pub fn new(id: &str, email: &str, role: &str, password: &str) -> Self {
        let salt = *Uuid::new_v4().as_bytes();
        Self {
            id: id.to_string(),
            email: email.to_ascii_lowercase(),
            role: role.to_string(),
            salt,
            password_digest: digest(&salt, password),
        }
    }

    /// Check `password` against the stored digest in constant time.
    pub fn verify_password(&self, password: &str) -> bool {
        digest(&self.salt, password)
            .as_slice()
            .ct_eq(self.password_digest.as_slice())
            .into()
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
        }
    }

    /// Claims to embed in a token issued for this account.
    pub fn claims(&self) -> Claims {
        Claims {
            subject_id: self.id.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
        }
    }
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

fn digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

/// Lookup interface used by the handlers.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<UserRecord>>;

    /// Emails are matched case-insensitively.
    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserRecord>>;

    async fn count(&self) -> AppResult<usize>;
}

/// Process-local user store.
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    by_id: DashMap<String, UserRecord>,
    id_by_email: DashMap<String, String>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub fn insert(&self, record: UserRecord) {
        self.id_by_email
            .insert(record.email.clone(), record.id.clone());
        self.by_id.insert(record.id.clone(), record);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_user(self, record: UserRecord) -> Self {
        self.insert(record);
        self
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<UserRecord>> {
        Ok(self.by_id.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        let Some(id) = self
            .id_by_email
            .get(&email.to_ascii_lowercase())
            .map(|entry| entry.value().clone())
        else {
            return Ok(None);
        };

        self.find_by_id(&id).await
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.by_id.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn repo() -> MemoryUserRepository {
        MemoryUserRepository::new()
            .with_user(UserRecord::new("u1", "Alice@Example.com", "admin", "correct horse"))
            .with_user(UserRecord::new("u2", "bob@example.com", "staff", "battery staple"))
    }

    #[test]
    fn test_verify_password() {
        let record = UserRecord::new("u1", "a@b.com", "staff", "hunter22");
        assert!(record.verify_password("hunter22"));
        assert!(!record.verify_password("hunter23"));
        assert!(!record.verify_password(""));
    }

    #[test]
    fn test_same_password_different_digest() {
        let a = UserRecord::new("u1", "a@b.com", "staff", "hunter22");
        let b = UserRecord::new("u2", "b@b.com", "staff", "hunter22");
        assert_ne!(a.password_digest, b.password_digest);
    }

    #[test]
    fn test_debug_hides_digest() {
        let record = UserRecord::new("u1", "a@b.com", "staff", "hunter22");
        let rendered = format!("{record:?}");
        assert!(!rendered.contains("digest"));
        assert!(!rendered.contains("salt"));
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let repo = repo();
        let found = repo.find_by_id("u2").await.unwrap().unwrap();
        assert_eq!(found.email, "bob@example.com");
        assert!(repo.find_by_id("u3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_email_is_case_insensitive() {
        let repo = repo();
        let found = repo
            .find_by_email("ALICE@example.COM")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "u1");
        assert!(repo.find_by_email("carol@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_count() {
        assert_eq!(repo().count().await.unwrap(), 2);
    }

    #[test]
    fn test_claims_from_record() {
        let record = UserRecord::new("u1", "a@b.com", "staff", "hunter22");
        let claims = record.claims();
        assert_eq!(claims.subject_id, "u1");
        assert_eq!(claims.role, "staff");
    }
}
