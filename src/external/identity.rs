//! Identity resolver (spec §6): `verify(token) -> {user_id, active}` and
//! `load(user_id) -> {active, vip_level}`. Generalizes the teacher's
//! wallet/EIP-712 signature auth (`auth::jwt`) to an opaque-token contract
//! appropriate for a centralized exchange (SPEC_FULL §4.6).

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::models::UserId;

#[derive(Debug, Clone)]
pub struct ResolvedUser {
    pub user_id: UserId,
    pub active: bool,
    pub vip_level: u8,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("token verification failed: {0}")]
    InvalidToken(String),
    #[error("user not found")]
    NotFound,
}

pub trait IdentityResolver: Send + Sync {
    fn verify(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<ResolvedUser, IdentityError>> + Send;
    fn load(
        &self,
        user_id: UserId,
    ) -> impl std::future::Future<Output = Result<ResolvedUser, IdentityError>> + Send;
}

/// JWT-backed resolver, grounded in the teacher's `auth::jwt::{JwtManager,
/// validate_token}`: the token's `sub` claim is the user id, verified
/// against a shared HMAC secret rather than an EIP-712 wallet signature.
pub struct JwtIdentityResolver {
    decoding_key: jsonwebtoken::DecodingKey,
    validation: jsonwebtoken::Validation,
    directory: Arc<DashMap<UserId, ResolvedUser>>,
}

#[derive(serde::Deserialize)]
struct Claims {
    sub: UserId,
    #[allow(dead_code)]
    exp: usize,
}

impl JwtIdentityResolver {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: jsonwebtoken::DecodingKey::from_secret(secret.as_bytes()),
            validation: jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256),
            directory: Arc::new(DashMap::new()),
        }
    }

    /// Registers a user's active/VIP status, mirroring how the teacher's
    /// identity data lives in the `users` table rather than in the token.
    pub fn register(&self, user: ResolvedUser) {
        self.directory.insert(user.user_id, user);
    }
}

impl IdentityResolver for JwtIdentityResolver {
    async fn verify(&self, token: &str) -> Result<ResolvedUser, IdentityError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;
        self.load(data.claims.sub).await
    }

    async fn load(&self, user_id: UserId) -> Result<ResolvedUser, IdentityError> {
        self.directory
            .get(&user_id)
            .map(|entry| entry.clone())
            .ok_or(IdentityError::NotFound)
    }
}

/// In-memory resolver for tests, all users active with VIP level 0 unless
/// registered otherwise.
#[derive(Default, Clone)]
pub struct MockIdentityResolver {
    directory: Arc<DashMap<UserId, ResolvedUser>>,
}

impl MockIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user: ResolvedUser) {
        self.directory.insert(user.user_id, user);
    }
}

impl IdentityResolver for MockIdentityResolver {
    async fn verify(&self, token: &str) -> Result<ResolvedUser, IdentityError> {
        let user_id: UserId = token
            .parse()
            .map_err(|_| IdentityError::InvalidToken("not a uuid".into()))?;
        self.load(user_id).await
    }

    async fn load(&self, user_id: UserId) -> Result<ResolvedUser, IdentityError> {
        Ok(self.directory.get(&user_id).map(|e| e.clone()).unwrap_or(ResolvedUser {
            user_id,
            active: true,
            vip_level: 0,
        }))
    }
}
