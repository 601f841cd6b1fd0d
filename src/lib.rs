// src/lib.rs
use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::cors::CorsLayer;

pub mod account;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod session;
pub mod slug;
pub mod store;
pub mod validation;
pub mod weight;

pub use config::Config;
pub use error::{AppError, AppResult};

use handlers::*;
use mailer::Mailer;
use store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>, config: Config) -> Self {
        AppState {
            store,
            mailer,
            config: Arc::new(config),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    // 凭证放在 Cookie 里，跨域时必须指定具体来源并允许携带凭证
    let cors = match HeaderValue::from_str(&state.config.app_url) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true),
        Err(_) => CorsLayer::new(),
    }
    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
    .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        // 认证
        .route("/api/auth/signup", post(signup_handler))
        .route("/api/auth/signin", post(signin_handler))
        .route("/api/auth/signout", post(signout_handler))
        .route("/api/auth/session", get(session_handler))
        .route("/api/auth/forgot-password", post(forgot_password_handler))
        .route("/api/auth/reset-password", post(reset_password_handler))
        // 清单
        .route("/api/lists", get(get_lists_handler).post(create_list_handler))
        .route("/api/lists/:id", get(get_list_handler))
        .route("/api/lists/:id", patch(update_list_handler))
        .route("/api/lists/:id", delete(delete_list_handler))
        .route("/api/users/:username/lists/:slug", get(get_public_list_handler))
        // 分类
        .route("/api/lists/:id/categories", post(create_category_handler))
        .route("/api/lists/:id/categories/order", put(reorder_categories_handler))
        .route("/api/categories/:id", patch(update_category_handler))
        .route("/api/categories/:id", delete(delete_category_handler))
        // 装备
        .route("/api/categories/:id/items", post(create_item_handler))
        .route("/api/categories/:id/items/order", put(reorder_items_handler))
        .route("/api/items/:id", patch(update_item_handler))
        .route("/api/items/:id", delete(delete_item_handler))
        .with_state(state)
        .layer(cors)
}
