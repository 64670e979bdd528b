//! Shared helpers for forumlink integration tests

#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use forumlink::{ForumClient, ForumConfig};
use forumlink_core::retry::{RetryOverrides, RetryPolicies};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use serde_json::Value;
use wiremock::MockServer;

/// Client pointed at `server`, with fast retries so failure paths stay quick.
pub fn client_for(server: &MockServer) -> ForumClient {
    let config = ForumConfig::builder(server.uri())
        .user_api_client_id("bridge")
        .application_name("Wallet Link")
        .scopes(["read", "session_info"])
        .retry(RetryPolicies {
            default: RetryOverrides::new()
                .max_retries(1)
                .base_delay_ms(1.0)
                .max_delay_ms(5.0),
            ..RetryPolicies::default()
        })
        .build()
        .expect("valid config");
    ForumClient::new(config).expect("client")
}

/// What the forum does after approval: encrypt the envelope with the public
/// key from the authorization URL and base64 it.
pub fn forum_reply(public_key_pem: &str, envelope: &Value) -> String {
    let public = RsaPublicKey::from_public_key_pem(public_key_pem).expect("public key");
    let plaintext = serde_json::to_vec(envelope).expect("json");
    let ciphertext = public
        .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, &plaintext)
        .expect("encrypt");
    STANDARD.encode(ciphertext)
}

/// Install a tracing subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
