use super::*;
use jsonwebtoken::{decode, DecodingKey, Validation};

#[test]
fn token_claims_contain_room_identity_and_grants() {
    let cfg = LiveKitConfig {
        api_key: "devkey".into(),
        api_secret: "devsecret".into(),
        ttl_seconds: 60,
    };
    let token = mint_token(&cfg, "guest-7", "Guest", "room-42").expect("token");

    let decoded = decode::<serde_json::Value>(
        &token,
        &DecodingKey::from_secret(cfg.api_secret.as_bytes()),
        &Validation::default(),
    )
    .expect("decode");

    assert_eq!(decoded.claims["iss"], "devkey");
    assert_eq!(decoded.claims["sub"], "guest-7");
    assert_eq!(decoded.claims["name"], "Guest");
    assert_eq!(decoded.claims["video"]["room"], "room-42");
    assert_eq!(decoded.claims["video"]["roomJoin"], true);
    assert_eq!(decoded.claims["video"]["canPublishData"], true);
}

#[test]
fn token_expiry_follows_configured_ttl() {
    let cfg = LiveKitConfig {
        api_key: "k".into(),
        api_secret: "s".into(),
        ttl_seconds: 120,
    };
    let token = mint_token(&cfg, "a", "a", "r").expect("token");
    let decoded = decode::<serde_json::Value>(
        &token,
        &DecodingKey::from_secret(b"s"),
        &Validation::default(),
    )
    .expect("decode");

    let iat = decoded.claims["iat"].as_i64().expect("iat");
    let exp = decoded.claims["exp"].as_i64().expect("exp");
    assert_eq!(exp - iat, 120);
}
