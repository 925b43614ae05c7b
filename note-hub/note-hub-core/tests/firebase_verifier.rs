//! Firebase token verification against a local key server.

use axum::{http::StatusCode, routing::get, Json, Router};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use note_hub_core::auth::{FirebaseVerifier, TokenVerifier};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const PROJECT: &str = "note-hub-test";
const SIGNING_KEY: &str = include_str!("fixtures/jwks_signing_key.pem");
const MODULUS: &str = "z2TfhmmIqPybHKF2ej2Tv-JBr4BXx1P9orfjIxYwyfLcw8Nil-wWrMlv7SiIIzjNt3HHKRm8d714RE8xWDVj1hi40HZOsS9CcPtDpZgI8w-MD7xElKcAgVKzhmOHLBX2S4_6Bcf_LnmZv98SInYqdjyJ17SV-Wn9ucRS8aoYV5BI8b9Lq0D2wnd0dGEXiAbaMo9Ern6bMskiVa3S_M41EWovNdSCDDilPR83AM6Evz0qH1ZYWhKaadD92l3P_KuZWlq-7Hm2ZT0nXfTfaWaIACo8w435a8IwjrUgMqGsjWBhdXFkdoVZLhPAUs12C5E72pNU2__gfNQqEfZHFPiw1w";
const EXPONENT: &str = "AQAB";

/// Serve `body` at `/keys` and count the requests that reach it.
async fn key_server(status: StatusCode, body: Value) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/keys",
        get(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let body = body.clone();
            async move { (status, Json(body)) }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/keys"), hits)
}

fn key_set(kid: &str) -> Value {
    json!({
        "keys": [{ "kid": kid, "kty": "RSA", "alg": "RS256", "use": "sig", "n": MODULUS, "e": EXPONENT }]
    })
}

fn id_token(kid: &str, audience: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let header = Header {
        kid: Some(kid.to_string()),
        ..Header::new(Algorithm::RS256)
    };
    let claims = json!({
        "sub": "alice",
        "name": "Alice",
        "email": "alice@example.com",
        "aud": audience,
        "iss": format!("https://securetoken.google.com/{PROJECT}"),
        "iat": now,
        "exp": now + 3600,
    });
    let key = EncodingKey::from_rsa_pem(SIGNING_KEY.as_bytes()).unwrap();
    encode(&header, &claims, &key).unwrap()
}

#[tokio::test]
async fn accepts_token_signed_by_published_key() {
    let (url, hits) = key_server(StatusCode::OK, key_set("k1")).await;
    let verifier = FirebaseVerifier::with_jwks_url(PROJECT.into(), url);

    let claims = verifier.verify(&id_token("k1", PROJECT)).await.unwrap();
    assert_eq!(claims.sub, "alice");
    assert_eq!(claims.email.as_deref(), Some("alice@example.com"));

    assert!(verifier.verify(&id_token("k1", PROJECT)).await.is_some());
    assert_eq!(hits.load(Ordering::SeqCst), 1, "cached keys are reused");
}

#[tokio::test]
async fn rejects_wrong_audience() {
    let (url, _) = key_server(StatusCode::OK, key_set("k1")).await;
    let verifier = FirebaseVerifier::with_jwks_url(PROJECT.into(), url);
    assert!(verifier.verify(&id_token("k1", "someone-else")).await.is_none());
}

#[tokio::test]
async fn unknown_kids_do_not_hammer_the_key_server() {
    let (url, hits) = key_server(StatusCode::OK, key_set("k1")).await;
    let verifier = Arc::new(FirebaseVerifier::with_jwks_url(PROJECT.into(), url));
    assert!(verifier.verify(&id_token("k1", PROJECT)).await.is_some());

    let forged: Vec<_> = (0..20)
        .map(|i| {
            let verifier = verifier.clone();
            let token = id_token(&format!("forged-{i}"), PROJECT);
            tokio::spawn(async move { verifier.verify(&token).await })
        })
        .collect();
    for result in futures::future::join_all(forged).await {
        assert!(result.unwrap().is_none());
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    assert!(verifier.verify(&id_token("k1", PROJECT)).await.is_some());
}

#[tokio::test]
async fn failed_fetch_is_not_retried_immediately() {
    let (url, hits) = key_server(StatusCode::INTERNAL_SERVER_ERROR, json!({})).await;
    let verifier = FirebaseVerifier::with_jwks_url(PROJECT.into(), url);

    assert!(verifier.verify(&id_token("k1", PROJECT)).await.is_none());
    assert!(verifier.verify(&id_token("k1", PROJECT)).await.is_none());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
