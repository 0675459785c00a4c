//! # Authentication and Request Context
//!
//! Callers authenticate with `Authorization: Bearer <JWT>`. The token is
//! verified locally; its claims give the user id and organization. The raw
//! token is kept so identity-service lookups can be made on the caller's
//! behalf.
//!
//! Anonymous callers may present `?permission_link=<id>` for read access.
//!
//! Everything is carried in an explicit [`RequestContext`] passed down the
//! call chain. No handler reads ambient per-thread state.
//!
//! ## Status codes
//!
//! A missing token where a user is required, an invalid token, and an
//! expired token are all 403.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use transmission_core::{OrganizationId, PermissionLinkId, UserId};

use crate::error::AppError;
use crate::state::AppState;

/// JWT claims Transmission reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Expiry (unix seconds).
    pub exp: usize,
}

/// Verifies bearer tokens.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl JwtVerifier {
    /// HS256 with a shared secret.
    pub fn hs256(secret: &[u8], audience: Option<&str>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: validation(Algorithm::HS256, audience),
        }
    }

    /// RS256 with a PEM-encoded public key.
    pub fn rs256_pem(pem: &[u8], audience: Option<&str>) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(Self {
            key: DecodingKey::from_rsa_pem(pem)?,
            validation: validation(Algorithm::RS256, audience),
        })
    }

    /// Verify `token` and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "Signature has expired.",
                    ErrorKind::InvalidSignature => "Error decoding signature.",
                    ErrorKind::InvalidAudience => "Invalid audience.",
                    _ => "Invalid token.",
                };
                AppError::Authentication(reason.to_string())
            })
    }
}

fn validation(algorithm: Algorithm, audience: Option<&str>) -> Validation {
    let mut validation = Validation::new(algorithm);
    match audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }
    validation
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub organization_id: Option<OrganizationId>,
    pub username: Option<String>,
}

impl AuthenticatedUser {
    fn from_claims(claims: Claims) -> Result<Self, AppError> {
        let id = UserId::new(claims.sub)
            .map_err(|_| AppError::Authentication("Invalid token.".to_string()))?;
        let organization_id = claims
            .organization_id
            .map(OrganizationId::new)
            .transpose()
            .map_err(|_| AppError::Authentication("Invalid token.".to_string()))?;
        Ok(Self {
            id,
            organization_id,
            username: claims.username,
        })
    }
}

/// Request-scoped caller context.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user: Option<AuthenticatedUser>,
    /// Raw bearer token, forwarded to the identity service.
    pub token: Option<String>,
    pub permission_link: Option<PermissionLinkId>,
}

impl RequestContext {
    /// The authenticated user, or a 403.
    pub fn require_user(&self) -> Result<&AuthenticatedUser, AppError> {
        self.user.as_ref().ok_or_else(|| {
            AppError::Authentication("Authentication credentials were not provided.".to_string())
        })
    }

    /// The user id, if authenticated.
    pub fn user_id(&self) -> Option<&UserId> {
        self.user.as_ref().map(|u| &u.id)
    }
}

fn permission_link_param(parts: &Parts) -> Option<PermissionLinkId> {
    let query = parts.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "permission_link")
        .and_then(|(_, value)| value.parse().ok())
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let permission_link = permission_link_param(parts);

        let bearer =
            match TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await {
                Ok(TypedHeader(Authorization(bearer))) => Some(bearer),
                Err(rejection) if rejection.is_missing() => None,
                Err(_) => {
                    return Err(AppError::Authentication(
                        "Invalid Authorization header.".to_string(),
                    ))
                }
            };

        let Some(bearer) = bearer else {
            return Ok(Self {
                user: None,
                token: None,
                permission_link,
            });
        };

        let claims = state.auth.verify(bearer.token())?;
        let user = AuthenticatedUser::from_claims(claims)?;
        tracing::debug!(user_id = %user.id, "authenticated request");
        Ok(Self {
            user: Some(user),
            token: Some(bearer.token().to_string()),
            permission_link,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &[u8] = b"test-secret";

    fn token(sub: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            organization_id: Some("org-1".to_string()),
            username: Some("user@example.com".to_string()),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    #[test]
    fn verifies_valid_token() {
        let verifier = JwtVerifier::hs256(SECRET, None);
        let claims = verifier.verify(&token("user-1", 3600)).unwrap();
        assert_eq!(claims.sub, "user-1");
        let user = AuthenticatedUser::from_claims(claims).unwrap();
        assert_eq!(user.organization_id.unwrap().as_str(), "org-1");
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = JwtVerifier::hs256(SECRET, None);
        let err = verifier.verify(&token("user-1", -3600)).unwrap_err();
        assert_eq!(err.to_string(), "Signature has expired.");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let verifier = JwtVerifier::hs256(b"other", None);
        assert!(matches!(
            verifier.verify(&token("user-1", 3600)),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let verifier = JwtVerifier::hs256(SECRET, None);
        assert!(verifier.verify("not.a.jwt").is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let verifier = JwtVerifier::hs256(SECRET, None);
        let debug = format!("{verifier:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("test-secret"));
    }

    #[test]
    fn permission_link_from_query() {
        let id = PermissionLinkId::new();
        let (parts, _) = axum::http::Request::builder()
            .uri(format!("/shipments/x?foo=1&permission_link={id}"))
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(permission_link_param(&parts), Some(id));

        let (parts, _) = axum::http::Request::builder()
            .uri("/shipments/x?permission_link=garbage")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(permission_link_param(&parts), None);
    }

    #[test]
    fn anonymous_context_requires_user() {
        let ctx = RequestContext::default();
        assert!(matches!(
            ctx.require_user(),
            Err(AppError::Authentication(_))
        ));
    }
}
