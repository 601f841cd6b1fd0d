// src/session.rs
// 当前请求是谁：先看登录会话，再看匿名会话。
// 未知或过期的令牌等同于没有令牌，继续往下解析，不报错

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::{cookie_value, ANONYMOUS_COOKIE, SESSION_COOKIE};
use crate::error::AppResult;
use crate::models::{AnonymousSession, List, Owner};
use crate::store::Store;
use crate::{AppError, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentSession {
    Authenticated { user_id: Uuid, session_id: Uuid },
    Anonymous { anonymous_session_id: Uuid },
    None,
}

/// Raw credentials as the client presented them.
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials<'a> {
    pub session: Option<&'a str>,
    pub anonymous: Option<&'a str>,
}

impl<'a> Credentials<'a> {
    pub fn from_jar(jar: &'a CookieJar) -> Self {
        Credentials {
            session: cookie_value(jar, SESSION_COOKIE),
            anonymous: cookie_value(jar, ANONYMOUS_COOKIE),
        }
    }
}

pub async fn resolve(
    store: &dyn Store,
    credentials: Credentials<'_>,
    now: DateTime<Utc>,
) -> AppResult<CurrentSession> {
    if let Some(token) = credentials.session {
        match store.find_session(token).await? {
            Some(session) if session.expires_at > now => {
                if store.find_user(session.user_id).await?.is_some() {
                    return Ok(CurrentSession::Authenticated {
                        user_id: session.user_id,
                        session_id: session.id,
                    });
                }
                tracing::debug!("session {} points at a missing user", session.id);
            }
            Some(session) => tracing::debug!("session {} has expired", session.id),
            None => tracing::debug!("unknown session token"),
        }
    }

    if let Some(anonymous) = resolve_anonymous(store, credentials.anonymous, now).await? {
        return Ok(CurrentSession::Anonymous {
            anonymous_session_id: anonymous.id,
        });
    }

    Ok(CurrentSession::None)
}

/// The live anonymous session behind a token, if there is one.
pub async fn resolve_anonymous(
    store: &dyn Store,
    token: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<Option<AnonymousSession>> {
    let Some(token) = token else {
        return Ok(None);
    };
    match store.find_anonymous_session(token).await? {
        Some(session) if session.expires_at > now => Ok(Some(session)),
        Some(session) => {
            tracing::debug!("anonymous session {} has expired", session.id);
            Ok(None)
        }
        None => Ok(None),
    }
}

impl CurrentSession {
    /// The owner value lists created by this session would carry.
    pub fn owner(&self) -> Option<Owner> {
        match *self {
            CurrentSession::Authenticated { user_id, .. } => Some(Owner::User(user_id)),
            CurrentSession::Anonymous { anonymous_session_id } => {
                Some(Owner::AnonymousSession(anonymous_session_id))
            }
            CurrentSession::None => None,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match *self {
            CurrentSession::Authenticated { user_id, .. } => Some(user_id),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, CurrentSession::Authenticated { .. })
    }

    pub fn owns(&self, owner: &Owner) -> bool {
        match (self, owner) {
            (CurrentSession::Authenticated { user_id, .. }, Owner::User(owner_id)) => {
                user_id == owner_id
            }
            (
                CurrentSession::Anonymous { anonymous_session_id },
                Owner::AnonymousSession(owner_id),
            ) => anonymous_session_id == owner_id,
            _ => false,
        }
    }

    pub fn can_read(&self, list: &List) -> bool {
        list.is_public || self.owns(&list.owner)
    }

    pub fn ensure_can_read(&self, list: &List) -> AppResult<()> {
        if self.can_read(list) {
            Ok(())
        } else {
            Err(AppError::Forbidden("This list is private".into()))
        }
    }

    /// Visibility never grants write access.
    pub fn ensure_can_write(&self, list: &List) -> AppResult<()> {
        if self.owns(&list.owner) {
            Ok(())
        } else {
            Err(AppError::Forbidden("You do not own this list".into()))
        }
    }
}

// 提取器：Handler 里直接写 (session: CurrentSession) 即可
#[async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        resolve(state.store.as_ref(), Credentials::from_jar(&jar), Utc::now()).await
    }
}
