// src/store/postgres.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{check_full_ordering, PurgeReport, Store};
use crate::error::AppResult;
use crate::models::{
    AnonymousSession, Category, CategoryChanges, Item, ItemChanges, ItemLabel, List, ListChanges,
    NewCategory, NewItem, NewList, Owner, PasswordResetToken, Session, User,
};
use crate::weight::WeightUnit;
use crate::AppError;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

// 数据库里所有者是两个可空列，读出来后转换成 Owner
#[derive(FromRow)]
struct ListRow {
    id: Uuid,
    user_id: Option<Uuid>,
    anonymous_session_id: Option<Uuid>,
    name: String,
    slug: String,
    description: Option<String>,
    is_public: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ListRow> for List {
    type Error = AppError;

    fn try_from(row: ListRow) -> Result<Self, Self::Error> {
        Ok(List {
            id: row.id,
            owner: Owner::from_columns(row.user_id, row.anonymous_session_id)?,
            name: row.name,
            slug: row.slug,
            description: row.description,
            is_public: row.is_public,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// 单位和标签以 TEXT 存储
#[derive(FromRow)]
struct ItemRow {
    id: Uuid,
    category_id: Uuid,
    name: String,
    description: Option<String>,
    url: Option<String>,
    weight_amount: f64,
    weight_unit: String,
    label: String,
    quantity: i32,
    position: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: row.id,
            category_id: row.category_id,
            name: row.name,
            description: row.description,
            url: row.url,
            weight_amount: row.weight_amount,
            weight_unit: WeightUnit::parse_or_grams(&row.weight_unit),
            label: ItemLabel::parse_or_none(&row.label),
            quantity: row.quantity,
            position: row.position,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn owner_column(owner: Owner) -> (&'static str, Uuid) {
    match owner {
        Owner::User(id) => ("user_id", id),
        Owner::AnonymousSession(id) => ("anonymous_session_id", id),
    }
}

fn into_lists(rows: Vec<ListRow>) -> AppResult<Vec<List>> {
    rows.into_iter().map(List::try_from).collect()
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (id, username, email, password_hash)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".into()));
        }
        Ok(())
    }

    async fn insert_session(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Session> {
        let session = sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, user_id, token, expires_at)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    async fn find_session(&self, token: &str) -> AppResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn delete_session(&self, token: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_anonymous_session(
        &self,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<AnonymousSession> {
        let session = sqlx::query_as::<_, AnonymousSession>(
            "INSERT INTO anonymous_sessions (id, token, expires_at)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(token)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    async fn find_anonymous_session(&self, token: &str) -> AppResult<Option<AnonymousSession>> {
        let session = sqlx::query_as::<_, AnonymousSession>(
            "SELECT * FROM anonymous_sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn claim_anonymous_session(
        &self,
        anonymous_session_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<u64> {
        let mut tx = self.pool.begin().await?;
        // 先锁住匿名会话行：并发插入清单的外键检查会等待本事务提交，
        // 提交后会话已不存在，插入失败而不是被级联删除
        let locked = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM anonymous_sessions WHERE id = $1 FOR UPDATE",
        )
        .bind(anonymous_session_id)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            tx.rollback().await?;
            return Ok(0);
        }

        let moved = sqlx::query(
            "UPDATE lists SET
                user_id = $1,
                anonymous_session_id = NULL,
                updated_at = NOW()
             WHERE anonymous_session_id = $2",
        )
        .bind(user_id)
        .bind(anonymous_session_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM anonymous_sessions WHERE id = $1")
            .bind(anonymous_session_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(moved)
    }

    async fn insert_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<PasswordResetToken> {
        let reset = sqlx::query_as::<_, PasswordResetToken>(
            "INSERT INTO password_reset_tokens (id, user_id, token, expires_at)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(reset)
    }

    async fn find_reset_token(&self, token: &str) -> AppResult<Option<PasswordResetToken>> {
        let reset = sqlx::query_as::<_, PasswordResetToken>(
            "SELECT * FROM password_reset_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reset)
    }

    async fn delete_reset_token(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM password_reset_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<PurgeReport> {
        let mut tx = self.pool.begin().await?;
        let sessions = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        // 过期匿名会话名下的清单随外键级联删除
        let anonymous_sessions = sqlx::query("DELETE FROM anonymous_sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let reset_tokens = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        Ok(PurgeReport { sessions, anonymous_sessions, reset_tokens })
    }

    async fn lists_for_owner(&self, owner: Owner) -> AppResult<Vec<List>> {
        let (column, id) = owner_column(owner);
        let sql = format!("SELECT * FROM lists WHERE {} = $1 ORDER BY created_at DESC", column);
        let rows = sqlx::query_as::<_, ListRow>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        into_lists(rows)
    }

    async fn list_slugs(&self, owner: Owner) -> AppResult<Vec<String>> {
        let (column, id) = owner_column(owner);
        let sql = format!("SELECT slug FROM lists WHERE {} = $1", column);
        let slugs = sqlx::query_scalar::<_, String>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(slugs)
    }

    async fn find_list(&self, id: Uuid) -> AppResult<Option<List>> {
        sqlx::query_as::<_, ListRow>("SELECT * FROM lists WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(List::try_from)
            .transpose()
    }

    async fn find_list_by_slug(&self, owner: Owner, slug: &str) -> AppResult<Option<List>> {
        let (column, id) = owner_column(owner);
        let sql = format!("SELECT * FROM lists WHERE {} = $1 AND slug = $2", column);
        sqlx::query_as::<_, ListRow>(&sql)
            .bind(id)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .map(List::try_from)
            .transpose()
    }

    async fn insert_list(&self, new: NewList) -> AppResult<List> {
        let row = sqlx::query_as::<_, ListRow>(
            "INSERT INTO lists
                (id, user_id, anonymous_session_id, name, slug, description, is_public)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.owner.user_id())
        .bind(new.owner.anonymous_session_id())
        .bind(new.name)
        .bind(new.slug)
        .bind(new.description)
        .bind(new.is_public)
        .fetch_one(&self.pool)
        .await?;
        List::try_from(row)
    }

    async fn update_list(&self, id: Uuid, changes: ListChanges) -> AppResult<List> {
        let row = sqlx::query_as::<_, ListRow>(
            "UPDATE lists SET
                name = COALESCE($1, name),
                slug = COALESCE($2, slug),
                description = COALESCE($3, description),
                is_public = COALESCE($4, is_public),
                updated_at = NOW()
             WHERE id = $5
             RETURNING *",
        )
        .bind(changes.name)
        .bind(changes.slug)
        .bind(changes.description)
        .bind(changes.is_public)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("List not found".into()))?;
        List::try_from(row)
    }

    async fn delete_list(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM lists WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn categories_for_list(&self, list_id: Uuid) -> AppResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE list_id = $1 ORDER BY position, created_at",
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    async fn find_category(&self, id: Uuid) -> AppResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(category)
    }

    async fn insert_category(&self, new: NewCategory) -> AppResult<Category> {
        // 追加到末尾：position = 当前最大值 + 1
        let category = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, list_id, name, description, position)
             VALUES ($1, $2, $3, $4,
                (SELECT COALESCE(MAX(position), -1) + 1 FROM categories WHERE list_id = $2))
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.list_id)
        .bind(new.name)
        .bind(new.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(category)
    }

    async fn update_category(&self, id: Uuid, changes: CategoryChanges) -> AppResult<Category> {
        sqlx::query_as::<_, Category>(
            "UPDATE categories SET
                name = COALESCE($1, name),
                description = COALESCE($2, description),
                updated_at = NOW()
             WHERE id = $3
             RETURNING *",
        )
        .bind(changes.name)
        .bind(changes.description)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".into()))
    }

    async fn delete_category(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reorder_categories(&self, list_id: Uuid, ordered_ids: &[Uuid]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM categories WHERE list_id = $1 FOR UPDATE",
        )
        .bind(list_id)
        .fetch_all(&mut *tx)
        .await?;
        check_full_ordering(&current, ordered_ids)?;

        for (position, id) in ordered_ids.iter().enumerate() {
            sqlx::query(
                "UPDATE categories SET position = $1, updated_at = NOW()
                 WHERE id = $2 AND list_id = $3",
            )
            .bind(position as i32)
            .bind(id)
            .bind(list_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn items_for_list(&self, list_id: Uuid) -> AppResult<Vec<Item>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            "SELECT i.* FROM items i
             JOIN categories c ON c.id = i.category_id
             WHERE c.list_id = $1
             ORDER BY c.position, i.position, i.created_at",
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn items_for_category(&self, category_id: Uuid) -> AppResult<Vec<Item>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            "SELECT * FROM items WHERE category_id = $1 ORDER BY position, created_at",
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn find_item(&self, id: Uuid) -> AppResult<Option<Item>> {
        let row = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Item::from))
    }

    async fn insert_item(&self, new: NewItem) -> AppResult<Item> {
        let row = sqlx::query_as::<_, ItemRow>(
            "INSERT INTO items
                (id, category_id, name, description, url,
                 weight_amount, weight_unit, label, quantity, position)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9,
                (SELECT COALESCE(MAX(position), -1) + 1 FROM items WHERE category_id = $2))
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.category_id)
        .bind(new.name)
        .bind(new.description)
        .bind(new.url)
        .bind(new.weight_amount)
        .bind(new.weight_unit.as_str())
        .bind(new.label.as_str())
        .bind(new.quantity)
        .fetch_one(&self.pool)
        .await?;
        Ok(Item::from(row))
    }

    async fn update_item(&self, id: Uuid, changes: ItemChanges) -> AppResult<Item> {
        let row = sqlx::query_as::<_, ItemRow>(
            "UPDATE items SET
                name = COALESCE($1, name),
                description = COALESCE($2, description),
                url = COALESCE($3, url),
                weight_amount = COALESCE($4, weight_amount),
                weight_unit = COALESCE($5, weight_unit),
                label = COALESCE($6, label),
                quantity = COALESCE($7, quantity),
                updated_at = NOW()
             WHERE id = $8
             RETURNING *",
        )
        .bind(changes.name)
        .bind(changes.description)
        .bind(changes.url)
        .bind(changes.weight_amount)
        .bind(changes.weight_unit.map(WeightUnit::as_str))
        .bind(changes.label.map(ItemLabel::as_str))
        .bind(changes.quantity)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found".into()))?;
        Ok(Item::from(row))
    }

    async fn delete_item(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reorder_items(&self, category_id: Uuid, ordered_ids: &[Uuid]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM items WHERE category_id = $1 FOR UPDATE",
        )
        .bind(category_id)
        .fetch_all(&mut *tx)
        .await?;
        check_full_ordering(&current, ordered_ids)?;

        for (position, id) in ordered_ids.iter().enumerate() {
            sqlx::query(
                "UPDATE items SET position = $1, updated_at = NOW()
                 WHERE id = $2 AND category_id = $3",
            )
            .bind(position as i32)
            .bind(id)
            .bind(category_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
