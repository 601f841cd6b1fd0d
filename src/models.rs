// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::weight::{ListSummary, WeightUnit};
use crate::AppError;

// --- 1. 所有权 ---

/// Who owns a list. Exactly one of the two, never both, never neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    User(Uuid),
    AnonymousSession(Uuid),
}

impl Owner {
    /// Builds an owner from the two nullable columns a row carries.
    pub fn from_columns(
        user_id: Option<Uuid>,
        anonymous_session_id: Option<Uuid>,
    ) -> Result<Self, AppError> {
        match (user_id, anonymous_session_id) {
            (Some(id), None) => Ok(Owner::User(id)),
            (None, Some(id)) => Ok(Owner::AnonymousSession(id)),
            (u, a) => Err(AppError::Internal(format!(
                "list owner columns are not exclusive: user_id={:?} anonymous_session_id={:?}",
                u, a
            ))),
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Owner::User(id) => Some(*id),
            Owner::AnonymousSession(_) => None,
        }
    }

    pub fn anonymous_session_id(&self) -> Option<Uuid> {
        match self {
            Owner::AnonymousSession(id) => Some(*id),
            Owner::User(_) => None,
        }
    }
}

// --- 2. 用户与会话 ---
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AnonymousSession {
    pub id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// --- 3. 清单 / 分类 / 装备 ---
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub id: Uuid,
    #[serde(skip)]
    pub owner: Owner,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub list_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemLabel {
    #[default]
    None,
    Worn,
    Consumable,
}

impl ItemLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemLabel::None => "none",
            ItemLabel::Worn => "worn",
            ItemLabel::Consumable => "consumable",
        }
    }

    pub fn parse_or_none(s: &str) -> Self {
        match s {
            "worn" => ItemLabel::Worn,
            "consumable" => ItemLabel::Consumable,
            _ => ItemLabel::None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub weight_amount: f64,
    pub weight_unit: WeightUnit,
    pub label: ItemLabel,
    pub quantity: i32,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// 存储层的写入参数
#[derive(Debug, Clone)]
pub struct NewList {
    pub owner: Owner,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_public: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ListChanges {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub list_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub weight_amount: f64,
    pub weight_unit: WeightUnit,
    pub label: ItemLabel,
    pub quantity: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ItemChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub weight_amount: Option<f64>,
    pub weight_unit: Option<WeightUnit>,
    pub label: Option<ItemLabel>,
    pub quantity: Option<i32>,
}

// --- 4. 请求体 ---
#[derive(Debug, Deserialize, Validate)]
pub struct SignupSchema {
    #[validate(length(min = 3, max = 32, message = "username must be 3-32 characters"))]
    pub username: String,
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "password must be 8-128 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SigninSchema {
    #[validate(length(min = 1, max = 255))]
    pub login: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordSchema {
    #[validate(email(message = "invalid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordSchema {
    #[validate(length(min = 1, max = 255))]
    pub token: String,
    #[validate(length(min = 8, max = 128, message = "password must be 8-128 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateListSchema {
    #[validate(length(min = 1, max = 100, message = "list name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateListSchema {
    #[validate(length(min = 1, max = 100, message = "list name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategorySchema {
    #[validate(length(min = 1, max = 100, message = "category name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCategorySchema {
    #[validate(length(min = 1, max = 100, message = "category name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemSchema {
    #[validate(length(min = 1, max = 200, message = "item name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(url(message = "invalid url"))]
    pub url: Option<String>,
    #[validate(range(min = 0.0, max = 1_000_000.0))]
    #[serde(default)]
    pub weight_amount: f64,
    #[serde(default)]
    pub weight_unit: WeightUnit,
    #[serde(default)]
    pub label: ItemLabel,
    #[validate(range(min = 1, max = 10_000))]
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemSchema {
    #[validate(length(min = 1, max = 200, message = "item name must be 1-200 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(url(message = "invalid url"))]
    pub url: Option<String>,
    #[validate(range(min = 0.0, max = 1_000_000.0))]
    pub weight_amount: Option<f64>,
    pub weight_unit: Option<WeightUnit>,
    pub label: Option<ItemLabel>,
    #[validate(range(min = 1, max = 10_000))]
    pub quantity: Option<i32>,
}

/// The complete new order of a parent scope. Empty is valid for an empty scope.
#[derive(Debug, Deserialize, Validate)]
pub struct ReorderSchema {
    #[validate(length(max = 1000))]
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct WeightQuery {
    pub unit: Option<WeightUnit>,
}

// --- 5. 响应体 ---
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub user: User,
    pub migrated_lists: u64,
}

#[derive(Debug, Serialize)]
pub struct SigninResponse {
    pub user: User,
}

#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SessionResponse {
    Authenticated { user: User },
    Anonymous,
    None,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDetail {
    pub category: Category,
    pub items: Vec<Item>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDetail {
    pub list: List,
    pub is_owner: bool,
    pub categories: Vec<CategoryDetail>,
    pub summary: ListSummary,
}
