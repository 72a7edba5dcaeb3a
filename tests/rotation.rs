use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use token_auth::auth::{hash_token, ClientContext, RotationEngine, Signer};
use token_auth::configuration::JwtSettings;
use token_auth::domain::{RefreshToken, TokenState, User};
use token_auth::error::{AppError, AuthError};
use token_auth::identity::{InMemoryIdentityStore, LockoutPolicy};
use token_auth::store::{InMemoryRefreshTokenStore, RefreshTokenStore};
use uuid::Uuid;

const PASSWORD: &str = "SecurePass123";

struct TestEngine {
    engine: RotationEngine,
    store: Arc<InMemoryRefreshTokenStore>,
    identity: Arc<InMemoryIdentityStore>,
    user: User,
}

fn jwt_settings(access_token_expiry_minutes: i64) -> JwtSettings {
    JwtSettings {
        secret: "rotation-test-secret-at-least-32-characters".to_string(),
        issuer: "token-auth-test".to_string(),
        audience: "token-auth-test-clients".to_string(),
        access_token_expiry_minutes,
        refresh_token_expiry_days: 7,
    }
}

fn context(client_id: &str) -> ClientContext {
    ClientContext {
        client_id: client_id.to_string(),
        ip_address: "203.0.113.10".to_string(),
        user_agent: Some("rotation-tests/1.0".to_string()),
    }
}

/// Engine whose access tokens are already expired when issued, like those a
/// client presents on refresh.
async fn spawn_engine() -> TestEngine {
    let store = Arc::new(InMemoryRefreshTokenStore::new());
    let identity = Arc::new(InMemoryIdentityStore::new(LockoutPolicy::default()));
    let user = User {
        id: Uuid::new_v4(),
        username: "jdoe".to_string(),
        email: "jdoe@example.com".to_string(),
        full_name: "John Doe".to_string(),
        is_active: true,
    };
    identity
        .add_user(user.clone(), PASSWORD, &["User"])
        .await
        .expect("Failed to add user");

    let signer = Signer::new(&jwt_settings(-1)).expect("Failed to build signer");
    let engine = RotationEngine::new(signer, store.clone(), identity.clone(), Duration::days(7));

    TestEngine {
        engine,
        store,
        identity,
        user,
    }
}

fn rejection(result: Result<impl std::fmt::Debug, AppError>) -> AuthError {
    match result {
        Err(AppError::Auth(reason)) => reason,
        other => panic!("Expected a rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn issue_pair_persists_active_token() {
    let app = spawn_engine().await;

    let pair = app
        .engine
        .issue_pair(&app.user, vec!["User".to_string()], &context("web-client"))
        .await
        .unwrap();

    let stored = app
        .store
        .find_by_token(&hash_token(&pair.refresh_token))
        .await
        .expect("Token not persisted");
    assert_eq!(stored.state_at(Utc::now()), TokenState::Active);
    assert_eq!(stored.user_id, app.user.id);
    assert_eq!(stored.client_id, "web-client");
    assert_eq!(stored.created_by_ip.as_deref(), Some("203.0.113.10"));
    assert_ne!(stored.token, pair.refresh_token, "plaintext must not be stored");

    let ttl = stored.expires_at - stored.created_at;
    assert_eq!(ttl, Duration::days(7));
}

#[tokio::test]
async fn issue_pair_rejects_deactivated_user() {
    let app = spawn_engine().await;
    let mut user = app.user.clone();
    user.is_active = false;

    let result = app
        .engine
        .issue_pair(&user, vec![], &context("web-client"))
        .await;

    assert_eq!(rejection(result), AuthError::AccountDeactivated);
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn rotate_issues_linked_successor() {
    let app = spawn_engine().await;
    let pair = app
        .engine
        .issue_pair(&app.user, vec!["User".to_string()], &context("web-client"))
        .await
        .unwrap();

    let rotated = app
        .engine
        .rotate(
            &pair.access_token.token,
            &pair.refresh_token,
            "web-client",
            "198.51.100.7",
        )
        .await
        .unwrap();

    assert_ne!(rotated.refresh_token, pair.refresh_token);
    assert_ne!(rotated.access_token.token, pair.access_token.token);

    let old = app
        .store
        .find_by_token(&hash_token(&pair.refresh_token))
        .await
        .unwrap();
    assert_eq!(old.state_at(Utc::now()), TokenState::RevokedReplaced);
    assert_eq!(old.revoked_by_ip.as_deref(), Some("198.51.100.7"));
    assert_eq!(
        old.replaced_by_token,
        Some(hash_token(&rotated.refresh_token))
    );

    let new = app
        .store
        .find_by_token(&hash_token(&rotated.refresh_token))
        .await
        .unwrap();
    assert!(new.is_active_at(Utc::now()));
    assert_eq!(new.user_agent, old.user_agent);
    assert_eq!(new.created_by_ip.as_deref(), Some("198.51.100.7"));
}

#[tokio::test]
async fn rotated_token_cannot_be_reused() {
    let app = spawn_engine().await;
    let pair = app
        .engine
        .issue_pair(&app.user, vec![], &context("web-client"))
        .await
        .unwrap();

    app.engine
        .rotate(&pair.access_token.token, &pair.refresh_token, "web-client", "10.0.0.1")
        .await
        .unwrap();

    for _ in 0..3 {
        let replay = app
            .engine
            .rotate(&pair.access_token.token, &pair.refresh_token, "web-client", "10.0.0.1")
            .await;
        assert_eq!(rejection(replay), AuthError::RefreshTokenRevoked);
    }
}

#[tokio::test]
async fn chain_of_rotations_keeps_single_active_token() {
    let app = spawn_engine().await;
    let mut pair = app
        .engine
        .issue_pair(&app.user, vec![], &context("ios-client"))
        .await
        .unwrap();
    let mut history = vec![pair.refresh_token.clone()];

    for _ in 0..5 {
        pair = app
            .engine
            .rotate(&pair.access_token.token, &pair.refresh_token, "ios-client", "10.0.0.1")
            .await
            .unwrap();
        history.push(pair.refresh_token.clone());
    }

    let now = Utc::now();
    for (i, value) in history.iter().enumerate() {
        let record = app.store.find_by_token(&hash_token(value)).await.unwrap();
        if i + 1 == history.len() {
            assert!(record.is_active_at(now));
        } else {
            assert_eq!(record.replaced_by_token, Some(hash_token(&history[i + 1])));
            assert!(!record.is_active_at(now));
        }
    }
}

#[tokio::test]
async fn expired_refresh_token_is_rejected_at_boundary() {
    let app = spawn_engine().await;
    let pair = app
        .engine
        .issue_pair(&app.user, vec![], &context("web-client"))
        .await
        .unwrap();

    // A never-revoked record whose expiry is exactly its creation time.
    let value = "expired-refresh-token-value";
    let now = Utc::now();
    let expired = RefreshToken::new(
        app.user.id,
        hash_token(value),
        "web-client",
        None,
        None,
        Duration::zero(),
        now,
    );
    app.store.insert(&expired).await.unwrap();

    let result = app
        .engine
        .rotate(&pair.access_token.token, value, "web-client", "10.0.0.1")
        .await;

    assert_eq!(rejection(result), AuthError::RefreshTokenExpired);
    let record = app.store.find_by_token(&hash_token(value)).await.unwrap();
    assert!(record.revoked_at.is_none());
}

#[tokio::test]
async fn revoked_check_precedes_expiry_check() {
    let app = spawn_engine().await;
    let pair = app
        .engine
        .issue_pair(&app.user, vec![], &context("web-client"))
        .await
        .unwrap();

    let value = "revoked-and-expired";
    let mut record = RefreshToken::new(
        app.user.id,
        hash_token(value),
        "web-client",
        None,
        None,
        Duration::zero(),
        Utc::now() - Duration::days(1),
    );
    record.revoked_at = Some(Utc::now() - Duration::hours(1));
    app.store.insert(&record).await.unwrap();

    let result = app
        .engine
        .rotate(&pair.access_token.token, value, "web-client", "10.0.0.1")
        .await;

    assert_eq!(rejection(result), AuthError::RefreshTokenRevoked);
}

#[tokio::test]
async fn refresh_token_is_bound_to_user_and_client() {
    let app = spawn_engine().await;
    let pair = app
        .engine
        .issue_pair(&app.user, vec![], &context("web-client"))
        .await
        .unwrap();

    let wrong_client = app
        .engine
        .rotate(&pair.access_token.token, &pair.refresh_token, "android-client", "10.0.0.1")
        .await;
    assert_eq!(rejection(wrong_client), AuthError::InvalidRefreshToken);

    // Another user's access token cannot redeem this refresh token either.
    let other = User {
        id: Uuid::new_v4(),
        username: "asmith".to_string(),
        email: "asmith@example.com".to_string(),
        full_name: "Alice Smith".to_string(),
        is_active: true,
    };
    app.identity.add_user(other.clone(), PASSWORD, &[]).await.unwrap();
    let other_pair = app
        .engine
        .issue_pair(&other, vec![], &context("web-client"))
        .await
        .unwrap();

    let wrong_user = app
        .engine
        .rotate(&other_pair.access_token.token, &pair.refresh_token, "web-client", "10.0.0.1")
        .await;
    assert_eq!(rejection(wrong_user), AuthError::InvalidRefreshToken);

    let unknown = app
        .engine
        .rotate(&pair.access_token.token, "not-a-real-token", "web-client", "10.0.0.1")
        .await;
    assert_eq!(rejection(unknown), AuthError::InvalidRefreshToken);

    // The original token is still redeemable by its owner.
    assert!(app
        .engine
        .rotate(&pair.access_token.token, &pair.refresh_token, "web-client", "10.0.0.1")
        .await
        .is_ok());
}

#[tokio::test]
async fn rotate_rejects_forged_or_foreign_access_token() {
    let app = spawn_engine().await;
    let pair = app
        .engine
        .issue_pair(&app.user, vec![], &context("web-client"))
        .await
        .unwrap();

    let mut forged = pair.access_token.token.clone();
    forged.push('x');
    let result = app
        .engine
        .rotate(&forged, &pair.refresh_token, "web-client", "10.0.0.1")
        .await;
    assert_eq!(rejection(result), AuthError::InvalidAccessToken);

    let mut settings = jwt_settings(15);
    settings.secret = "a-completely-different-secret-of-32-chars".to_string();
    let foreign = Signer::new(&settings)
        .unwrap()
        .sign_access_token(&app.user, &[])
        .unwrap();
    let result = app
        .engine
        .rotate(&foreign.token, &pair.refresh_token, "web-client", "10.0.0.1")
        .await;
    assert_eq!(rejection(result), AuthError::InvalidAccessToken);
}

#[tokio::test]
async fn rotate_rejects_deactivated_user() {
    let app = spawn_engine().await;
    let pair = app
        .engine
        .issue_pair(&app.user, vec![], &context("web-client"))
        .await
        .unwrap();

    app.identity.set_active(app.user.id, false).await;

    let result = app
        .engine
        .rotate(&pair.access_token.token, &pair.refresh_token, "web-client", "10.0.0.1")
        .await;
    assert_eq!(rejection(result), AuthError::UserNotFound);
}

#[tokio::test]
async fn manually_revoked_token_is_rejected() {
    let app = spawn_engine().await;
    let pair = app
        .engine
        .issue_pair(&app.user, vec![], &context("web-client"))
        .await
        .unwrap();

    app.engine
        .revoke(app.user.id, &pair.refresh_token, "web-client", "10.0.0.1")
        .await
        .unwrap();

    let record = app
        .store
        .find_by_token(&hash_token(&pair.refresh_token))
        .await
        .unwrap();
    assert_eq!(record.state_at(Utc::now()), TokenState::RevokedManually);

    let again = app
        .engine
        .revoke(app.user.id, &pair.refresh_token, "web-client", "10.0.0.1")
        .await;
    assert_eq!(rejection(again), AuthError::RefreshTokenRevoked);

    let result = app
        .engine
        .rotate(&pair.access_token.token, &pair.refresh_token, "web-client", "10.0.0.1")
        .await;
    assert_eq!(rejection(result), AuthError::RefreshTokenRevoked);
}

#[tokio::test]
async fn revoke_all_invalidates_every_client() {
    let app = spawn_engine().await;
    let web = app
        .engine
        .issue_pair(&app.user, vec![], &context("web-client"))
        .await
        .unwrap();
    let ios = app
        .engine
        .issue_pair(&app.user, vec![], &context("ios-client"))
        .await
        .unwrap();

    let count = app.engine.revoke_all(app.user.id, "10.0.0.1").await.unwrap();
    assert_eq!(count, 2);

    for (pair, client) in [(&web, "web-client"), (&ios, "ios-client")] {
        let result = app
            .engine
            .rotate(&pair.access_token.token, &pair.refresh_token, client, "10.0.0.1")
            .await;
        assert_eq!(rejection(result), AuthError::RefreshTokenRevoked);
    }
}

#[tokio::test]
async fn issued_refresh_tokens_never_collide() {
    let app = spawn_engine().await;
    let n = 10_000;
    let mut seen = HashSet::with_capacity(n);

    for _ in 0..n {
        let pair = app
            .engine
            .issue_pair(&app.user, vec![], &context("web-client"))
            .await
            .unwrap();
        seen.insert(pair.refresh_token);
    }

    assert_eq!(seen.len(), n);
    assert_eq!(app.store.len().await, n);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_replay_has_exactly_one_winner() {
    for _ in 0..20 {
        let app = Arc::new(spawn_engine().await);
        let pair = app
            .engine
            .issue_pair(&app.user, vec![], &context("web-client"))
            .await
            .unwrap();

        let attempts: Vec<_> = (0..2)
            .map(|i| {
                let app = app.clone();
                let access = pair.access_token.token.clone();
                let refresh = pair.refresh_token.clone();
                tokio::spawn(async move {
                    app.engine
                        .rotate(&access, &refresh, "web-client", &format!("10.0.0.{}", i))
                        .await
                })
            })
            .collect();

        let mut winners = Vec::new();
        for attempt in attempts {
            match attempt.await.expect("task panicked") {
                Ok(new_pair) => winners.push(new_pair),
                Err(AppError::Auth(AuthError::RefreshTokenRevoked))
                | Err(AppError::Auth(AuthError::InvalidRefreshToken)) => {}
                Err(e) => panic!("Unexpected error: {}", e),
            }
        }
        assert_eq!(winners.len(), 1, "exactly one rotation must succeed");

        let old = app
            .store
            .find_by_token(&hash_token(&pair.refresh_token))
            .await
            .unwrap();
        assert_eq!(
            old.replaced_by_token,
            Some(hash_token(&winners[0].refresh_token))
        );
        // 1 original + 1 successor: the loser wrote nothing
        assert_eq!(app.store.len().await, 2);
    }
}
