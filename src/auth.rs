use crate::{
    error::{AppError, AppResult},
    queries, DbPool,
};
use axum::{
    async_trait,
    extract::{FromRequest, RequestParts, TypedHeader},
    headers::{authorization::Bearer, Authorization},
    http::StatusCode,
};
use diesel_async::AsyncPgConnection;
use jsonwebtoken::{errors::Result as JwtResult, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Audience the hosted auth service stamps on signed-in users' tokens.
pub const AUDIENCE: &str = "authenticated";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: u64,
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Verifies access tokens issued by the hosted auth service. Tokens are
/// never minted here.
pub struct TokenVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> TokenVerifier {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[AUDIENCE]);
        TokenVerifier {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn validate_jwt(&self, token: &str) -> JwtResult<TokenData<Claims>> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
    }

    pub fn authenticate(&self, token: &str) -> AppResult<AuthUser> {
        match self.validate_jwt(token) {
            Ok(data) => Ok(AuthUser {
                id: data.claims.sub,
                email: data.claims.email,
            }),
            Err(e) => {
                tracing::debug!("rejected access token: {e}");
                Err(AppError::from(
                    StatusCode::UNAUTHORIZED,
                    "invalid or expired access token",
                ))
            }
        }
    }
}

pub fn may_modify(user_id: Uuid, owner: Option<Uuid>, is_admin: bool) -> bool {
    is_admin || owner == Some(user_id)
}

pub struct Auth {
    pub user: AuthUser,
    pub token: String,
}

impl Auth {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    pub async fn ensure_admin(&self, conn: &mut AsyncPgConnection) -> AppResult<()> {
        if queries::profiles::is_admin(conn, self.user.id).await? {
            Ok(())
        } else {
            Err(AppError::from(StatusCode::FORBIDDEN, "admins only"))
        }
    }

    pub async fn ensure_owner_or_admin(
        &self,
        conn: &mut AsyncPgConnection,
        owner: Option<Uuid>,
    ) -> AppResult<()> {
        if owner == Some(self.user.id) {
            return Ok(());
        }
        let is_admin = queries::profiles::is_admin(conn, self.user.id).await?;
        if may_modify(self.user.id, owner, is_admin) {
            Ok(())
        } else {
            Err(AppError::from(
                StatusCode::FORBIDDEN,
                "only the creator or an admin can do that",
            ))
        }
    }
}

pub struct ExtractAuth(pub Auth);

#[async_trait]
impl<B: Send> FromRequest<B> for ExtractAuth {
    type Rejection = AppError;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request(req)
                .await
                .map_err(|_| AppError::from(StatusCode::UNAUTHORIZED, "please sign in first"))?;

        let verifier = req
            .extensions()
            .get::<Arc<TokenVerifier>>()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("token verifier extension is missing"))?;

        let user = verifier.authenticate(bearer.token())?;
        Ok(ExtractAuth(Auth {
            user,
            token: bearer.token().to_string(),
        }))
    }
}

/// Gate for moderation routes: a valid token whose profile carries the admin
/// flag.
pub struct AdminOnly(pub Auth);

#[async_trait]
impl<B: Send> FromRequest<B> for AdminOnly {
    type Rejection = AppError;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let ExtractAuth(auth) = ExtractAuth::from_request(req).await?;

        let pool = req
            .extensions()
            .get::<DbPool>()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("database pool extension is missing"))?;
        let conn = &mut pool.get().await?;
        auth.ensure_admin(conn).await?;
        Ok(AdminOnly(auth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};

    const SECRET: &str = "super-secret-jwt-token-with-at-least-32-characters";

    fn token(sub: Uuid, aud: &str, exp: u64) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            &Claims {
                sub,
                exp,
                aud: Some(aud.to_string()),
                email: Some("student@campus.edu".to_string()),
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_platform_tokens() {
        let id = Uuid::new_v4();
        let verifier = TokenVerifier::new(SECRET);
        let user = verifier
            .authenticate(&token(id, AUDIENCE, jsonwebtoken::get_current_timestamp() + 3600))
            .unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.email.as_deref(), Some("student@campus.edu"));
    }

    #[test]
    fn rejects_expired_or_foreign_tokens() {
        let verifier = TokenVerifier::new(SECRET);
        let now = jsonwebtoken::get_current_timestamp();

        let expired = verifier.authenticate(&token(Uuid::new_v4(), AUDIENCE, now - 3600));
        assert_eq!(expired.unwrap_err().status(), StatusCode::UNAUTHORIZED);

        let anon = verifier.authenticate(&token(Uuid::new_v4(), "anon", now + 3600));
        assert!(anon.is_err());

        let other = TokenVerifier::new("another-secret-another-secret-another");
        assert!(other
            .authenticate(&token(Uuid::new_v4(), AUDIENCE, now + 3600))
            .is_err());
    }

    #[test]
    fn creator_or_admin_may_modify() {
        let me = Uuid::new_v4();
        let someone = Uuid::new_v4();
        assert!(may_modify(me, Some(me), false));
        assert!(!may_modify(me, Some(someone), false));
        assert!(!may_modify(me, None, false));
        assert!(may_modify(me, Some(someone), true));
    }
}
