use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::state::AppState;

/// What a token may be used for. Each kind is only accepted where it is expected.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
    Reset,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
    /// Account token version at signing time.
    pub ver: i32,
}

/// Signing material plus per-kind lifetimes.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    reset_ttl: Duration,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        let minutes = |m: i64| Duration::minutes(m.max(1));
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: minutes(cfg.ttl_minutes),
            refresh_ttl: minutes(cfg.refresh_ttl_minutes),
            reset_ttl: minutes(cfg.reset_ttl_minutes),
        }
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
            TokenKind::Reset => self.reset_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn sign(&self, user_id: Uuid, version: i32, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp(),
            exp: (now + self.ttl(kind)).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            ver: version,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(%user_id, ?kind, "jwt signed");
        Ok(token)
    }

    /// Checks signature, expiry, issuer, audience and that the token is of `kind`.
    pub fn verify(&self, token: &str, kind: TokenKind) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;
        if claims.kind != kind {
            anyhow::bail!("expected a {kind:?} token, got {:?}", claims.kind);
        }
        Ok(claims)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::new(&state.config.jwt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "unit-secret".into(),
            issuer: "nutriscan".into(),
            audience: "nutriscan-app".into(),
            ttl_minutes: 15,
            refresh_ttl_minutes: 60 * 24,
            reset_ttl_minutes: 30,
        }
    }

    #[test]
    fn access_token_carries_subject_and_lifetime() {
        let keys = JwtKeys::new(&config());
        let user = Uuid::new_v4();
        let token = keys.sign(user, 0, TokenKind::Access).unwrap();

        let claims = keys.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.ver, 0);
        assert_eq!(claims.iss, "nutriscan");
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn version_travels_in_the_token() {
        let keys = JwtKeys::new(&config());
        let token = keys.sign(Uuid::new_v4(), 7, TokenKind::Reset).unwrap();
        assert_eq!(keys.verify(&token, TokenKind::Reset).unwrap().ver, 7);
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let keys = JwtKeys::new(&config());
        let user = Uuid::new_v4();
        let refresh = keys.sign(user, 0, TokenKind::Refresh).unwrap();
        let reset = keys.sign(user, 0, TokenKind::Reset).unwrap();

        assert!(keys.verify(&refresh, TokenKind::Access).is_err());
        assert!(keys.verify(&reset, TokenKind::Refresh).is_err());
        assert_eq!(keys.verify(&reset, TokenKind::Reset).unwrap().sub, user);
        let err = keys.verify(&refresh, TokenKind::Reset).unwrap_err();
        assert!(err.to_string().contains("Refresh"));
    }

    #[test]
    fn foreign_issuer_audience_or_secret_is_rejected() {
        let token = JwtKeys::new(&config()).sign(Uuid::new_v4(), 0, TokenKind::Access).unwrap();

        let other_aud = JwtKeys::new(&JwtConfig { audience: "other".into(), ..config() });
        assert!(other_aud.verify(&token, TokenKind::Access).is_err());
        let other_iss = JwtKeys::new(&JwtConfig { issuer: "other".into(), ..config() });
        assert!(other_iss.verify(&token, TokenKind::Access).is_err());
        let other_secret = JwtKeys::new(&JwtConfig { secret: "nope".into(), ..config() });
        assert!(other_secret.verify(&token, TokenKind::Access).is_err());
    }

    #[tokio::test]
    async fn keys_come_from_app_config() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let token = keys.sign(Uuid::nil(), 0, TokenKind::Access).unwrap();
        assert_eq!(keys.verify(&token, TokenKind::Access).unwrap().aud, "test-aud");
    }
}
