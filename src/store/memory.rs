// src/store/memory.rs
// 进程内存储：约束和级联删除与 Postgres 表结构保持一致

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{check_full_ordering, PurgeReport, Store};
use crate::error::AppResult;
use crate::models::{
    AnonymousSession, Category, CategoryChanges, Item, ItemChanges, List, ListChanges, NewCategory,
    NewItem, NewList, Owner, PasswordResetToken, Session, User,
};
use crate::AppError;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, Session>,
    anonymous_sessions: HashMap<Uuid, AnonymousSession>,
    reset_tokens: HashMap<Uuid, PasswordResetToken>,
    lists: HashMap<Uuid, List>,
    categories: HashMap<Uuid, Category>,
    items: HashMap<Uuid, Item>,
}

impl Tables {
    fn slug_taken(&self, owner: Owner, slug: &str, except: Option<Uuid>) -> bool {
        self.lists
            .values()
            .any(|l| l.owner == owner && l.slug == slug && Some(l.id) != except)
    }

    fn remove_category_cascade(&mut self, id: Uuid) -> bool {
        self.items.retain(|_, item| item.category_id != id);
        self.categories.remove(&id).is_some()
    }

    fn remove_list_cascade(&mut self, id: Uuid) -> bool {
        let category_ids: Vec<Uuid> = self
            .categories
            .values()
            .filter(|c| c.list_id == id)
            .map(|c| c.id)
            .collect();
        for category_id in category_ids {
            self.remove_category_cascade(category_id);
        }
        self.lists.remove(&id).is_some()
    }

    fn remove_owner_lists(&mut self, owner: Owner) {
        let ids: Vec<Uuid> = self
            .lists
            .values()
            .filter(|l| l.owner == owner)
            .map(|l| l.id)
            .collect();
        for id in ids {
            self.remove_list_cascade(id);
        }
    }

    fn sorted_categories(&self, list_id: Uuid) -> Vec<Category> {
        let mut categories: Vec<Category> = self
            .categories
            .values()
            .filter(|c| c.list_id == list_id)
            .cloned()
            .collect();
        categories.sort_by(|a, b| (a.position, a.created_at).cmp(&(b.position, b.created_at)));
        categories
    }

    fn sorted_items(&self, category_id: Uuid) -> Vec<Item> {
        let mut items: Vec<Item> = self
            .items
            .values()
            .filter(|i| i.category_id == category_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| (a.position, a.created_at).cmp(&(b.position, b.created_at)));
        items
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> AppResult<User> {
        let mut t = self.tables.lock().await;
        if t.users.values().any(|u| u.username == username) {
            return Err(AppError::Conflict("Username is already taken".into()));
        }
        if t.users.values().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(AppError::Conflict("Email is already registered".into()));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_owned(),
            email: email.to_owned(),
            password_hash: password_hash.to_owned(),
            created_at: now,
            updated_at: now,
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> AppResult<()> {
        let mut t = self.tables.lock().await;
        let user = t
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        user.password_hash = password_hash.to_owned();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_session(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Session> {
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&user_id) {
            return Err(AppError::Internal(format!("session for missing user {}", user_id)));
        }
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            token: token.to_owned(),
            expires_at,
            created_at: Utc::now(),
        };
        t.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_session(&self, token: &str) -> AppResult<Option<Session>> {
        let t = self.tables.lock().await;
        Ok(t.sessions.values().find(|s| s.token == token).cloned())
    }

    async fn delete_session(&self, token: &str) -> AppResult<()> {
        self.tables.lock().await.sessions.retain(|_, s| s.token != token);
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> AppResult<u64> {
        let mut t = self.tables.lock().await;
        let before = t.sessions.len();
        t.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - t.sessions.len()) as u64)
    }

    async fn insert_anonymous_session(
        &self,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<AnonymousSession> {
        let session = AnonymousSession {
            id: Uuid::new_v4(),
            token: token.to_owned(),
            expires_at,
            created_at: Utc::now(),
        };
        self.tables
            .lock()
            .await
            .anonymous_sessions
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_anonymous_session(&self, token: &str) -> AppResult<Option<AnonymousSession>> {
        let t = self.tables.lock().await;
        Ok(t.anonymous_sessions.values().find(|s| s.token == token).cloned())
    }

    async fn claim_anonymous_session(
        &self,
        anonymous_session_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<u64> {
        let mut t = self.tables.lock().await;
        if !t.anonymous_sessions.contains_key(&anonymous_session_id) {
            return Ok(0);
        }
        let from = Owner::AnonymousSession(anonymous_session_id);
        let to = Owner::User(user_id);

        // 先整体检查 slug 冲突，保证要么全部迁移要么一个都不迁移
        let clash = t
            .lists
            .values()
            .filter(|l| l.owner == from)
            .any(|l| t.slug_taken(to, &l.slug, None));
        if clash {
            return Err(AppError::Conflict("A list with this slug already exists".into()));
        }

        let now = Utc::now();
        let mut moved = 0;
        for list in t.lists.values_mut().filter(|l| l.owner == from) {
            list.owner = to;
            list.updated_at = now;
            moved += 1;
        }
        t.anonymous_sessions.remove(&anonymous_session_id);
        Ok(moved)
    }

    async fn insert_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<PasswordResetToken> {
        let reset = PasswordResetToken {
            id: Uuid::new_v4(),
            user_id,
            token: token.to_owned(),
            expires_at,
            created_at: Utc::now(),
        };
        self.tables.lock().await.reset_tokens.insert(reset.id, reset.clone());
        Ok(reset)
    }

    async fn find_reset_token(&self, token: &str) -> AppResult<Option<PasswordResetToken>> {
        let t = self.tables.lock().await;
        Ok(t.reset_tokens.values().find(|r| r.token == token).cloned())
    }

    async fn delete_reset_token(&self, id: Uuid) -> AppResult<()> {
        self.tables.lock().await.reset_tokens.remove(&id);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<PurgeReport> {
        let mut t = self.tables.lock().await;
        let mut report = PurgeReport::default();

        let before = t.sessions.len();
        t.sessions.retain(|_, s| s.expires_at >= now);
        report.sessions = (before - t.sessions.len()) as u64;

        let expired: Vec<Uuid> = t
            .anonymous_sessions
            .values()
            .filter(|s| s.expires_at < now)
            .map(|s| s.id)
            .collect();
        for id in &expired {
            t.remove_owner_lists(Owner::AnonymousSession(*id));
            t.anonymous_sessions.remove(id);
        }
        report.anonymous_sessions = expired.len() as u64;

        let before = t.reset_tokens.len();
        t.reset_tokens.retain(|_, r| r.expires_at >= now);
        report.reset_tokens = (before - t.reset_tokens.len()) as u64;

        Ok(report)
    }

    async fn lists_for_owner(&self, owner: Owner) -> AppResult<Vec<List>> {
        let t = self.tables.lock().await;
        let mut lists: Vec<List> = t.lists.values().filter(|l| l.owner == owner).cloned().collect();
        lists.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(lists)
    }

    async fn list_slugs(&self, owner: Owner) -> AppResult<Vec<String>> {
        let t = self.tables.lock().await;
        Ok(t.lists
            .values()
            .filter(|l| l.owner == owner)
            .map(|l| l.slug.clone())
            .collect())
    }

    async fn find_list(&self, id: Uuid) -> AppResult<Option<List>> {
        Ok(self.tables.lock().await.lists.get(&id).cloned())
    }

    async fn find_list_by_slug(&self, owner: Owner, slug: &str) -> AppResult<Option<List>> {
        let t = self.tables.lock().await;
        Ok(t.lists
            .values()
            .find(|l| l.owner == owner && l.slug == slug)
            .cloned())
    }

    async fn insert_list(&self, new: NewList) -> AppResult<List> {
        let mut t = self.tables.lock().await;
        let owner_exists = match new.owner {
            Owner::User(id) => t.users.contains_key(&id),
            Owner::AnonymousSession(id) => t.anonymous_sessions.contains_key(&id),
        };
        if !owner_exists {
            return Err(AppError::Internal(format!("list for missing owner {:?}", new.owner)));
        }
        if t.slug_taken(new.owner, &new.slug, None) {
            return Err(AppError::Conflict("A list with this slug already exists".into()));
        }
        let now = Utc::now();
        let list = List {
            id: Uuid::new_v4(),
            owner: new.owner,
            name: new.name,
            slug: new.slug,
            description: new.description,
            is_public: new.is_public,
            created_at: now,
            updated_at: now,
        };
        t.lists.insert(list.id, list.clone());
        Ok(list)
    }

    async fn update_list(&self, id: Uuid, changes: ListChanges) -> AppResult<List> {
        let mut t = self.tables.lock().await;
        let owner = t
            .lists
            .get(&id)
            .map(|l| l.owner)
            .ok_or_else(|| AppError::NotFound("List not found".into()))?;
        if let Some(slug) = &changes.slug {
            if t.slug_taken(owner, slug, Some(id)) {
                return Err(AppError::Conflict("A list with this slug already exists".into()));
            }
        }
        let list = t
            .lists
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("List not found".into()))?;
        if let Some(name) = changes.name {
            list.name = name;
        }
        if let Some(slug) = changes.slug {
            list.slug = slug;
        }
        if let Some(description) = changes.description {
            list.description = Some(description);
        }
        if let Some(is_public) = changes.is_public {
            list.is_public = is_public;
        }
        list.updated_at = Utc::now();
        Ok(list.clone())
    }

    async fn delete_list(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.tables.lock().await.remove_list_cascade(id))
    }

    async fn categories_for_list(&self, list_id: Uuid) -> AppResult<Vec<Category>> {
        Ok(self.tables.lock().await.sorted_categories(list_id))
    }

    async fn find_category(&self, id: Uuid) -> AppResult<Option<Category>> {
        Ok(self.tables.lock().await.categories.get(&id).cloned())
    }

    async fn insert_category(&self, new: NewCategory) -> AppResult<Category> {
        let mut t = self.tables.lock().await;
        if !t.lists.contains_key(&new.list_id) {
            return Err(AppError::NotFound("List not found".into()));
        }
        let position = t
            .categories
            .values()
            .filter(|c| c.list_id == new.list_id)
            .map(|c| c.position)
            .max()
            .map_or(0, |p| p + 1);
        let now = Utc::now();
        let category = Category {
            id: Uuid::new_v4(),
            list_id: new.list_id,
            name: new.name,
            description: new.description,
            position,
            created_at: now,
            updated_at: now,
        };
        t.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(&self, id: Uuid, changes: CategoryChanges) -> AppResult<Category> {
        let mut t = self.tables.lock().await;
        let category = t
            .categories
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Category not found".into()))?;
        if let Some(name) = changes.name {
            category.name = name;
        }
        if let Some(description) = changes.description {
            category.description = Some(description);
        }
        category.updated_at = Utc::now();
        Ok(category.clone())
    }

    async fn delete_category(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.tables.lock().await.remove_category_cascade(id))
    }

    async fn reorder_categories(&self, list_id: Uuid, ordered_ids: &[Uuid]) -> AppResult<()> {
        let mut t = self.tables.lock().await;
        let current: Vec<Uuid> = t.sorted_categories(list_id).iter().map(|c| c.id).collect();
        check_full_ordering(&current, ordered_ids)?;
        let now = Utc::now();
        for (position, id) in ordered_ids.iter().enumerate() {
            if let Some(category) = t.categories.get_mut(id).filter(|c| c.list_id == list_id) {
                category.position = position as i32;
                category.updated_at = now;
            }
        }
        Ok(())
    }

    async fn items_for_list(&self, list_id: Uuid) -> AppResult<Vec<Item>> {
        let t = self.tables.lock().await;
        let mut items = Vec::new();
        for category in t.sorted_categories(list_id) {
            items.extend(t.sorted_items(category.id));
        }
        Ok(items)
    }

    async fn items_for_category(&self, category_id: Uuid) -> AppResult<Vec<Item>> {
        Ok(self.tables.lock().await.sorted_items(category_id))
    }

    async fn find_item(&self, id: Uuid) -> AppResult<Option<Item>> {
        Ok(self.tables.lock().await.items.get(&id).cloned())
    }

    async fn insert_item(&self, new: NewItem) -> AppResult<Item> {
        let mut t = self.tables.lock().await;
        if !t.categories.contains_key(&new.category_id) {
            return Err(AppError::NotFound("Category not found".into()));
        }
        let position = t
            .items
            .values()
            .filter(|i| i.category_id == new.category_id)
            .map(|i| i.position)
            .max()
            .map_or(0, |p| p + 1);
        let now = Utc::now();
        let item = Item {
            id: Uuid::new_v4(),
            category_id: new.category_id,
            name: new.name,
            description: new.description,
            url: new.url,
            weight_amount: new.weight_amount,
            weight_unit: new.weight_unit,
            label: new.label,
            quantity: new.quantity,
            position,
            created_at: now,
            updated_at: now,
        };
        t.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update_item(&self, id: Uuid, changes: ItemChanges) -> AppResult<Item> {
        let mut t = self.tables.lock().await;
        let item = t
            .items
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Item not found".into()))?;
        if let Some(name) = changes.name {
            item.name = name;
        }
        if let Some(description) = changes.description {
            item.description = Some(description);
        }
        if let Some(url) = changes.url {
            item.url = Some(url);
        }
        if let Some(amount) = changes.weight_amount {
            item.weight_amount = amount;
        }
        if let Some(unit) = changes.weight_unit {
            item.weight_unit = unit;
        }
        if let Some(label) = changes.label {
            item.label = label;
        }
        if let Some(quantity) = changes.quantity {
            item.quantity = quantity;
        }
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn delete_item(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.tables.lock().await.items.remove(&id).is_some())
    }

    async fn reorder_items(&self, category_id: Uuid, ordered_ids: &[Uuid]) -> AppResult<()> {
        let mut t = self.tables.lock().await;
        let current: Vec<Uuid> = t.sorted_items(category_id).iter().map(|i| i.id).collect();
        check_full_ordering(&current, ordered_ids)?;
        let now = Utc::now();
        for (position, id) in ordered_ids.iter().enumerate() {
            if let Some(item) = t.items.get_mut(id).filter(|i| i.category_id == category_id) {
                item.position = position as i32;
                item.updated_at = now;
            }
        }
        Ok(())
    }
}
