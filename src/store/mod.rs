// src/store/mod.rs
use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    AnonymousSession, Category, CategoryChanges, Item, ItemChanges, List, ListChanges, NewCategory,
    NewItem, NewList, Owner, PasswordResetToken, Session, User,
};
use crate::AppError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Rows removed by one housekeeping pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub sessions: u64,
    pub anonymous_sessions: u64,
    pub reset_tokens: u64,
}

// 处理器只依赖这个 trait：生产环境用 PgStore，测试和无数据库运行用 MemoryStore
#[async_trait]
pub trait Store: Send + Sync {
    // 用户
    async fn insert_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> AppResult<User>;
    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> AppResult<()>;

    // 登录会话
    async fn insert_session(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Session>;
    async fn find_session(&self, token: &str) -> AppResult<Option<Session>>;
    async fn delete_session(&self, token: &str) -> AppResult<()>;
    async fn delete_user_sessions(&self, user_id: Uuid) -> AppResult<u64>;

    // 匿名会话
    async fn insert_anonymous_session(
        &self,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<AnonymousSession>;
    async fn find_anonymous_session(&self, token: &str) -> AppResult<Option<AnonymousSession>>;
    /// Moves every list of an anonymous session to a user and deletes the
    /// session, as one atomic step. Returns how many lists moved.
    ///
    /// A list created concurrently with the same anonymous session either
    /// moves with the rest or fails to insert; it is never cascaded away.
    async fn claim_anonymous_session(
        &self,
        anonymous_session_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<u64>;

    // 重置密码
    async fn insert_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<PasswordResetToken>;
    async fn find_reset_token(&self, token: &str) -> AppResult<Option<PasswordResetToken>>;
    async fn delete_reset_token(&self, id: Uuid) -> AppResult<()>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<PurgeReport>;

    // 清单
    async fn lists_for_owner(&self, owner: Owner) -> AppResult<Vec<List>>;
    async fn list_slugs(&self, owner: Owner) -> AppResult<Vec<String>>;
    async fn find_list(&self, id: Uuid) -> AppResult<Option<List>>;
    async fn find_list_by_slug(&self, owner: Owner, slug: &str) -> AppResult<Option<List>>;
    async fn insert_list(&self, new: NewList) -> AppResult<List>;
    async fn update_list(&self, id: Uuid, changes: ListChanges) -> AppResult<List>;
    async fn delete_list(&self, id: Uuid) -> AppResult<bool>;

    // 分类
    async fn categories_for_list(&self, list_id: Uuid) -> AppResult<Vec<Category>>;
    async fn find_category(&self, id: Uuid) -> AppResult<Option<Category>>;
    async fn insert_category(&self, new: NewCategory) -> AppResult<Category>;
    async fn update_category(&self, id: Uuid, changes: CategoryChanges) -> AppResult<Category>;
    async fn delete_category(&self, id: Uuid) -> AppResult<bool>;
    /// Rewrites positions to `0..n` in the given order. The ids are checked
    /// against the list's current categories in the same step, see
    /// [`check_full_ordering`].
    async fn reorder_categories(&self, list_id: Uuid, ordered_ids: &[Uuid]) -> AppResult<()>;

    // 装备
    async fn items_for_list(&self, list_id: Uuid) -> AppResult<Vec<Item>>;
    async fn items_for_category(&self, category_id: Uuid) -> AppResult<Vec<Item>>;
    async fn find_item(&self, id: Uuid) -> AppResult<Option<Item>>;
    async fn insert_item(&self, new: NewItem) -> AppResult<Item>;
    async fn update_item(&self, id: Uuid, changes: ItemChanges) -> AppResult<Item>;
    async fn delete_item(&self, id: Uuid) -> AppResult<bool>;
    async fn reorder_items(&self, category_id: Uuid, ordered_ids: &[Uuid]) -> AppResult<()>;
}

/// A reorder request must name every child of the scope exactly once.
pub fn check_full_ordering(current: &[Uuid], requested: &[Uuid]) -> AppResult<()> {
    let wanted: HashSet<&Uuid> = requested.iter().collect();
    if wanted.len() != requested.len() {
        return Err(AppError::BadRequest("ordering contains duplicate ids".into()));
    }
    let existing: HashSet<&Uuid> = current.iter().collect();
    if wanted != existing {
        return Err(AppError::BadRequest(
            "ordering must list every entry of the scope exactly once".into(),
        ));
    }
    Ok(())
}
