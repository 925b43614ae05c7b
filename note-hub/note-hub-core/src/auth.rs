use crate::model::Identity;
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Minimum spacing between signing-key fetches.
pub const JWKS_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Deserialize, Clone, Debug)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            uid: claims.sub,
            display_name: claims.name.filter(|s| !s.is_empty()),
            email: claims.email.filter(|s| !s.is_empty()),
        }
    }
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<Claims>;
}

/// Shared-secret tokens, for local deployments and tests.
pub struct Hs256Verifier {
    key: DecodingKey,
}

impl Hs256Verifier {
    pub fn new(secret: String) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl TokenVerifier for Hs256Verifier {
    async fn verify(&self, token: &str) -> Option<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.key, &validation)
            .ok()
            .map(|d| d.claims)
    }
}

/// Firebase ID tokens, checked against Google's published signing keys.
///
/// Tokens signed by a cached key never wait on the network. An unknown `kid`
/// refetches the key set, one fetch at a time and at most once per
/// [`JWKS_REFETCH_INTERVAL`].
pub struct FirebaseVerifier {
    project_id: String,
    jwks_url: String,
    client: reqwest::Client,
    cache: Mutex<KeyCache>,
    fetch_gate: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct KeyCache {
    jwks: Option<Arc<Jwks>>,
    fetched_at: Option<Instant>,
}

#[derive(Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

impl Jwks {
    fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

#[derive(Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

impl FirebaseVerifier {
    pub fn new(project_id: String) -> Self {
        Self::with_jwks_url(project_id, FIREBASE_JWKS_URL.to_string())
    }

    pub fn with_jwks_url(project_id: String, jwks_url: String) -> Self {
        Self {
            project_id,
            jwks_url,
            client: reqwest::Client::new(),
            cache: Mutex::new(KeyCache::default()),
            fetch_gate: tokio::sync::Mutex::new(()),
        }
    }

    async fn fetch_keys(&self) -> reqwest::Result<Jwks> {
        self.client
            .get(&self.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    fn cached(&self, kid: &str) -> Option<Arc<Jwks>> {
        self.cache
            .lock()
            .jwks
            .clone()
            .filter(|jwks| jwks.find(kid).is_some())
    }

    async fn refresh(&self, kid: &str) -> Option<Arc<Jwks>> {
        let _gate = self.fetch_gate.lock().await;
        // a fetch that finished while we queued may already carry the key
        if let Some(jwks) = self.cached(kid) {
            return Some(jwks);
        }
        let due = self
            .cache
            .lock()
            .fetched_at
            .map_or(true, |at| at.elapsed() >= JWKS_REFETCH_INTERVAL);
        if !due {
            debug!(kid, "unknown signing key, refetch throttled");
            return None;
        }
        self.cache.lock().fetched_at = Some(Instant::now());
        match self.fetch_keys().await {
            Ok(jwks) => {
                let jwks = Arc::new(jwks);
                self.cache.lock().jwks = Some(jwks.clone());
                jwks.find(kid).is_some().then_some(jwks)
            }
            Err(err) => {
                warn!(error = %err, "failed to fetch signing keys");
                None
            }
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);
        validation
    }
}

#[async_trait]
impl TokenVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Option<Claims> {
        let header = decode_header(token).ok()?;
        let kid = header.kid?;
        let jwks = match self.cached(&kid) {
            Some(jwks) => jwks,
            None => self.refresh(&kid).await?,
        };
        let jwk = jwks.find(&kid)?;
        let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e).ok()?;
        decode::<Claims>(token, &key, &self.validation())
            .ok()
            .map(|d| d.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn token(secret: &str, claims: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn hs256_accepts_valid_token() {
        let verifier = Hs256Verifier::new("s3cret".into());
        let t = token(
            "s3cret",
            json!({"sub": "alice", "name": "Alice", "email": "a@example.com", "exp": far_future()}),
        );
        let identity: Identity = verifier.verify(&t).await.unwrap().into();
        assert_eq!(identity.uid, "alice");
        assert_eq!(identity.display_name.as_deref(), Some("Alice"));
        assert_eq!(identity.email.as_deref(), Some("a@example.com"));
    }

    #[tokio::test]
    async fn hs256_rejects_wrong_secret_and_expired() {
        let verifier = Hs256Verifier::new("s3cret".into());
        let forged = token("other", json!({"sub": "alice", "exp": far_future()}));
        assert!(verifier.verify(&forged).await.is_none());

        let expired = token("s3cret", json!({"sub": "alice", "exp": 1_000}));
        assert!(verifier.verify(&expired).await.is_none());

        assert!(verifier.verify("not a jwt").await.is_none());
    }

    #[test]
    fn blank_display_metadata_is_dropped() {
        let identity: Identity = Claims {
            sub: "u".into(),
            name: Some(String::new()),
            email: None,
        }
        .into();
        assert!(identity.display_name.is_none());
    }
}
