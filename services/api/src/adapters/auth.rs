//! services/api/src/adapters/auth.rs
//!
//! Bearer-token verification adapter. The identity provider signs HS256
//! JWTs whose subject is its stable user id; this adapter validates the
//! signature and expiry and extracts the profile claims the repository
//! needs for find-or-create.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use medintake_core::ports::{AuthClaims, PortError, PortResult, TokenVerifier};
use serde::Deserialize;
use tracing::debug;

/// The claim set the identity provider embeds in its tokens.
#[derive(Debug, Deserialize)]
struct ProviderClaims {
    sub: String,
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
    #[allow(dead_code)]
    exp: u64,
}

/// Verifies HS256 bearer tokens with a shared secret.
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> PortResult<AuthClaims> {
        let data = decode::<ProviderClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!("Bearer token rejected: {}", e);
                PortError::Unauthorized
            })?;

        let claims = data.claims;
        if claims.sub.is_empty() {
            return Err(PortError::Unauthorized);
        }

        Ok(AuthClaims {
            subject: claims.sub,
            email: claims.email,
            display_name: claims.name,
            avatar_url: claims.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        email: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<&'a str>,
        exp: u64,
    }

    fn sign(claims: &TestClaims<'_>, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> u64 {
        (chrono::Utc::now().timestamp() + 3600) as u64
    }

    #[tokio::test]
    async fn accepts_a_well_formed_token() {
        let verifier = JwtVerifier::new("test-secret");
        let token = sign(
            &TestClaims {
                sub: "provider-uid-1",
                email: "pat@example.com",
                name: Some("Pat"),
                exp: far_future(),
            },
            "test-secret",
        );

        let claims = verifier.verify(&token).await.unwrap();
        assert_eq!(claims.subject, "provider-uid-1");
        assert_eq!(claims.email, "pat@example.com");
        assert_eq!(claims.display_name.as_deref(), Some("Pat"));
        assert!(claims.avatar_url.is_none());
    }

    #[tokio::test]
    async fn rejects_a_token_signed_with_the_wrong_secret() {
        let verifier = JwtVerifier::new("right-secret");
        let token = sign(
            &TestClaims {
                sub: "provider-uid-1",
                email: "pat@example.com",
                name: None,
                exp: far_future(),
            },
            "wrong-secret",
        );

        assert!(matches!(
            verifier.verify(&token).await,
            Err(PortError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn rejects_an_expired_token() {
        let verifier = JwtVerifier::new("test-secret");
        let token = sign(
            &TestClaims {
                sub: "provider-uid-1",
                email: "pat@example.com",
                name: None,
                exp: 1_000,
            },
            "test-secret",
        );

        assert!(matches!(
            verifier.verify(&token).await,
            Err(PortError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let verifier = JwtVerifier::new("test-secret");
        assert!(matches!(
            verifier.verify("not.a.jwt").await,
            Err(PortError::Unauthorized)
        ));
    }
}
