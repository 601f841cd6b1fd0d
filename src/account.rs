// src/account.rs
// 注册（含匿名数据迁移）、登录、登出和密码重置

use chrono::{DateTime, Utc};

use crate::auth::{generate_token, hash_password, reset_token_ttl, session_ttl, verify_password};
use crate::error::AppResult;
use crate::mailer::Mailer;
use crate::models::User;
use crate::session::resolve_anonymous;
use crate::store::Store;
use crate::AppError;

#[derive(Debug)]
pub struct NewAccount<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug)]
pub struct SignupOutcome {
    pub user: User,
    pub session_token: String,
    pub migrated_lists: u64,
    /// Whether an anonymous session was found and consumed.
    pub consumed_anonymous: bool,
}

/// Creates the account, then hands every list of the caller's anonymous
/// session to it and opens an authenticated session.
pub async fn signup(
    store: &dyn Store,
    account: NewAccount<'_>,
    anonymous_token: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<SignupOutcome> {
    if store.find_user_by_username(account.username).await?.is_some() {
        return Err(AppError::Conflict("Username is already taken".into()));
    }
    if store.find_user_by_email(account.email).await?.is_some() {
        return Err(AppError::Conflict("Email is already registered".into()));
    }

    let password_hash = hash_password(account.password)?;
    let user = store
        .insert_user(account.username, account.email, &password_hash)
        .await?;

    let mut migrated_lists = 0;
    let anonymous = resolve_anonymous(store, anonymous_token, now).await?;
    let consumed_anonymous = anonymous.is_some();
    if let Some(anonymous) = anonymous {
        migrated_lists = store.claim_anonymous_session(anonymous.id, user.id).await?;
        tracing::info!(
            "migrated {} list(s) from anonymous session {} to user {}",
            migrated_lists,
            anonymous.id,
            user.id
        );
    }

    let session_token = generate_token();
    store
        .insert_session(user.id, &session_token, now + session_ttl())
        .await?;

    tracing::info!("user {} signed up", user.id);
    Ok(SignupOutcome {
        user,
        session_token,
        migrated_lists,
        consumed_anonymous,
    })
}

/// `login` is matched against the username first, then the email.
pub async fn signin(
    store: &dyn Store,
    login: &str,
    password: &str,
    now: DateTime<Utc>,
) -> AppResult<(User, String)> {
    let user = match store.find_user_by_username(login).await? {
        Some(user) => Some(user),
        None => store.find_user_by_email(login).await?,
    };

    let user = match user {
        Some(user) if verify_password(password, &user.password_hash) => user,
        _ => {
            tracing::warn!("failed signin attempt for {:?}", login);
            return Err(AppError::Auth("Invalid username or password".into()));
        }
    };

    let token = generate_token();
    store.insert_session(user.id, &token, now + session_ttl()).await?;
    Ok((user, token))
}

pub async fn signout(store: &dyn Store, session_token: &str) -> AppResult<()> {
    store.delete_session(session_token).await
}

/// Stores a one-hour reset token and mails the link. Unknown emails are
/// accepted silently.
pub async fn request_password_reset(
    store: &dyn Store,
    mailer: &dyn Mailer,
    email: &str,
    app_url: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let Some(user) = store.find_user_by_email(email).await? else {
        tracing::debug!("password reset requested for unknown email");
        return Ok(());
    };

    let token = generate_token();
    store
        .insert_reset_token(user.id, &token, now + reset_token_ttl())
        .await?;

    let base = app_url.trim_end_matches('/');
    let link = format!("{}/reset-password?token={}", base, token);
    mailer.send_password_reset(&user.email, &link).await
}

/// Consumes the token, sets the new password and signs the user out everywhere.
pub async fn reset_password(
    store: &dyn Store,
    token: &str,
    new_password: &str,
    now: DateTime<Utc>,
) -> AppResult<User> {
    let invalid = || AppError::BadRequest("Reset link is invalid or has expired".into());

    let reset = store.find_reset_token(token).await?.ok_or_else(invalid)?;
    if reset.expires_at <= now {
        store.delete_reset_token(reset.id).await?;
        return Err(invalid());
    }
    let user = store.find_user(reset.user_id).await?.ok_or_else(invalid)?;

    let password_hash = hash_password(new_password)?;
    store.set_password_hash(user.id, &password_hash).await?;
    store.delete_reset_token(reset.id).await?;
    let revoked = store.delete_user_sessions(user.id).await?;

    tracing::info!("password reset for user {}, {} session(s) revoked", user.id, revoked);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewList, Owner};
    use crate::session::{resolve, Credentials, CurrentSession};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingMailer {
        links: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Mailer for CapturingMailer {
        async fn send_password_reset(&self, _to: &str, link: &str) -> AppResult<()> {
            self.links.lock().unwrap().push(link.to_owned());
            Ok(())
        }
    }

    fn ada() -> NewAccount<'static> {
        NewAccount {
            username: "ada",
            email: "ada@example.com",
            password: "hunter22hunter",
        }
    }

    async fn anon_list(store: &MemoryStore, anonymous_session_id: uuid::Uuid, slug: &str) {
        store
            .insert_list(NewList {
                owner: Owner::AnonymousSession(anonymous_session_id),
                name: slug.into(),
                slug: slug.into(),
                description: None,
                is_public: false,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn signup_migrates_only_the_callers_anonymous_lists() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let tomorrow = now + Duration::days(1);
        let mine = store.insert_anonymous_session("mine", tomorrow).await.unwrap();
        let theirs = store.insert_anonymous_session("theirs", tomorrow).await.unwrap();
        for slug in ["a", "b", "c"] {
            anon_list(&store, mine.id, slug).await;
        }
        for slug in ["x", "y"] {
            anon_list(&store, theirs.id, slug).await;
        }

        let outcome = signup(&store, ada(), Some("mine"), now).await.unwrap();
        assert_eq!(outcome.migrated_lists, 3);
        assert!(outcome.consumed_anonymous);

        let owned = store.lists_for_owner(Owner::User(outcome.user.id)).await.unwrap();
        assert_eq!(owned.len(), 3);
        assert!(owned.iter().all(|l| l.owner.anonymous_session_id().is_none()));

        let untouched = store.lists_for_owner(Owner::AnonymousSession(theirs.id)).await.unwrap();
        assert_eq!(untouched.len(), 2);

        assert!(store.find_anonymous_session("mine").await.unwrap().is_none());
        assert!(store.find_anonymous_session("theirs").await.unwrap().is_some());

        let credentials = Credentials {
            session: Some(&outcome.session_token),
            anonymous: None,
        };
        let resolved = resolve(&store, credentials, now).await.unwrap();
        assert_eq!(resolved.user_id(), Some(outcome.user.id));
    }

    #[tokio::test]
    async fn signup_without_anonymous_session_migrates_nothing() {
        let store = MemoryStore::new();
        let outcome = signup(&store, ada(), None, Utc::now()).await.unwrap();
        assert_eq!(outcome.migrated_lists, 0);
        assert!(!outcome.consumed_anonymous);

        let expired_store = MemoryStore::new();
        let now = Utc::now();
        let stale = expired_store
            .insert_anonymous_session("stale", now - Duration::minutes(1))
            .await
            .unwrap();
        anon_list(&expired_store, stale.id, "old").await;
        let outcome = signup(&expired_store, ada(), Some("stale"), now).await.unwrap();
        assert_eq!(outcome.migrated_lists, 0);
        assert!(!outcome.consumed_anonymous);
    }

    #[tokio::test]
    async fn duplicate_username_or_email_conflicts() {
        let store = MemoryStore::new();
        signup(&store, ada(), None, Utc::now()).await.unwrap();

        let same_name = NewAccount { email: "other@example.com", ..ada() };
        let result = signup(&store, same_name, None, Utc::now()).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let same_email = NewAccount { username: "lovelace", email: "ADA@example.com", ..ada() };
        let result = signup(&store, same_email, None, Utc::now()).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn signin_accepts_username_or_email() {
        let store = MemoryStore::new();
        signup(&store, ada(), None, Utc::now()).await.unwrap();

        assert!(signin(&store, "ada", "hunter22hunter", Utc::now()).await.is_ok());
        assert!(signin(&store, "ada@example.com", "hunter22hunter", Utc::now()).await.is_ok());
        assert!(matches!(
            signin(&store, "ada", "wrong-password", Utc::now()).await,
            Err(AppError::Auth(_))
        ));
        assert!(matches!(
            signin(&store, "nobody", "hunter22hunter", Utc::now()).await,
            Err(AppError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn password_reset_revokes_every_session() {
        let store = MemoryStore::new();
        let mailer = CapturingMailer::default();
        let now = Utc::now();
        let outcome = signup(&store, ada(), None, now).await.unwrap();
        let (_, second) = signin(&store, "ada", "hunter22hunter", now).await.unwrap();

        request_password_reset(&store, &mailer, "ada@example.com", "http://app.test/", now)
            .await
            .unwrap();
        let link = mailer.links.lock().unwrap().pop().unwrap();
        assert!(link.starts_with("http://app.test/reset-password?token="));
        let token = link.rsplit('=').next().unwrap().to_owned();

        reset_password(&store, &token, "brand-new-secret", now).await.unwrap();

        for old in [outcome.session_token.as_str(), second.as_str()] {
            let credentials = Credentials { session: Some(old), anonymous: None };
            let resolved = resolve(&store, credentials, now).await.unwrap();
            assert_eq!(resolved, CurrentSession::None);
        }
        assert!(signin(&store, "ada", "brand-new-secret", now).await.is_ok());

        // 令牌只能使用一次
        assert!(matches!(
            reset_password(&store, &token, "another-secret", now).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected_and_dropped() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let outcome = signup(&store, ada(), None, now).await.unwrap();
        store
            .insert_reset_token(outcome.user.id, "late", now - Duration::minutes(5))
            .await
            .unwrap();

        assert!(matches!(
            reset_password(&store, "late", "brand-new-secret", now).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(store.find_reset_token("late").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_for_unknown_email_sends_nothing() {
        let store = MemoryStore::new();
        let mailer = CapturingMailer::default();
        let now = Utc::now();
        request_password_reset(&store, &mailer, "ghost@example.com", "http://app.test", now)
            .await
            .unwrap();
        assert!(mailer.links.lock().unwrap().is_empty());
    }
}
