// src/handlers.rs
use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::account::{self, NewAccount};
use crate::auth::{
    cookie_value, credential_cookie, generate_token, remove_credential, session_ttl,
    ANONYMOUS_COOKIE, SESSION_COOKIE,
};
use crate::models::{
    Category, CategoryChanges, CategoryDetail, CreateCategorySchema, CreateItemSchema,
    CreateListSchema, ForgotPasswordSchema, Item, ItemChanges, List, ListChanges, ListDetail,
    NewCategory, NewItem, NewList, Owner, ReorderSchema, ResetPasswordSchema, SessionResponse,
    SigninResponse, SigninSchema, SignupResponse, SignupSchema, UpdateCategorySchema,
    UpdateItemSchema, UpdateListSchema, WeightQuery,
};
use crate::session::CurrentSession;
use crate::slug::unique_slug;
use crate::store::Store;
use crate::validation::ValidatedJson;
use crate::weight::{summarize_list, WeightUnit};
use crate::{AppError, AppState};

pub async fn health_handler() -> &'static str {
    "ok"
}

// --- 1. 账户 ---

pub async fn signup_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(body): ValidatedJson<SignupSchema>,
) -> Result<(StatusCode, CookieJar, Json<SignupResponse>), AppError> {
    let outcome = account::signup(
        state.store.as_ref(),
        NewAccount {
            username: &body.username,
            email: &body.email,
            password: &body.password,
        },
        cookie_value(&jar, ANONYMOUS_COOKIE),
        Utc::now(),
    )
    .await?;

    // 匿名凭证无论是否还有效都清掉，换成正式登录凭证
    let jar = remove_credential(jar, ANONYMOUS_COOKIE).add(credential_cookie(
        SESSION_COOKIE,
        outcome.session_token,
        state.config.secure_cookies,
    ));

    Ok((
        StatusCode::CREATED,
        jar,
        Json(SignupResponse {
            user: outcome.user,
            migrated_lists: outcome.migrated_lists,
        }),
    ))
}

pub async fn signin_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(body): ValidatedJson<SigninSchema>,
) -> Result<(CookieJar, Json<SigninResponse>), AppError> {
    let (user, token) =
        account::signin(state.store.as_ref(), &body.login, &body.password, Utc::now()).await?;

    let jar = jar.add(credential_cookie(SESSION_COOKIE, token, state.config.secure_cookies));
    Ok((jar, Json(SigninResponse { user })))
}

pub async fn signout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    session: CurrentSession,
) -> Result<(CookieJar, StatusCode), AppError> {
    if !session.is_authenticated() {
        return Err(AppError::Auth("Not signed in".into()));
    }
    if let Some(token) = cookie_value(&jar, SESSION_COOKIE) {
        account::signout(state.store.as_ref(), token).await?;
    }
    Ok((remove_credential(jar, SESSION_COOKIE), StatusCode::NO_CONTENT))
}

pub async fn session_handler(
    State(state): State<AppState>,
    session: CurrentSession,
) -> Result<Json<SessionResponse>, AppError> {
    let response = match session {
        CurrentSession::Authenticated { user_id, .. } => {
            let user = state
                .store
                .find_user(user_id)
                .await?
                .ok_or_else(|| AppError::Auth("Session user no longer exists".into()))?;
            SessionResponse::Authenticated { user }
        }
        CurrentSession::Anonymous { .. } => SessionResponse::Anonymous,
        CurrentSession::None => SessionResponse::None,
    };
    Ok(Json(response))
}

pub async fn forgot_password_handler(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<ForgotPasswordSchema>,
) -> Result<Json<serde_json::Value>, AppError> {
    account::request_password_reset(
        state.store.as_ref(),
        state.mailer.as_ref(),
        &body.email,
        &state.config.app_url,
        Utc::now(),
    )
    .await?;

    Ok(Json(json!({
        "message": "If that email is registered, a reset link is on its way"
    })))
}

pub async fn reset_password_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(body): ValidatedJson<ResetPasswordSchema>,
) -> Result<(CookieJar, Json<serde_json::Value>), AppError> {
    account::reset_password(state.store.as_ref(), &body.token, &body.password, Utc::now()).await?;

    Ok((
        remove_credential(jar, SESSION_COOKIE),
        Json(json!({"message": "Password updated, please sign in again"})),
    ))
}

// --- 2. 清单 ---

pub async fn get_lists_handler(
    session: CurrentSession,
    State(state): State<AppState>,
) -> Result<Json<Vec<List>>, AppError> {
    let lists = match session.owner() {
        Some(owner) => state.store.lists_for_owner(owner).await?,
        None => Vec::new(),
    };
    Ok(Json(lists))
}

pub async fn create_list_handler(
    session: CurrentSession,
    jar: CookieJar,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateListSchema>,
) -> Result<(StatusCode, CookieJar, Json<List>), AppError> {
    let is_public = body.is_public.unwrap_or(false);
    if is_public && !session.is_authenticated() {
        return Err(AppError::Forbidden("Sign up to publish a list".into()));
    }

    // 第一次创建清单的访客：此时才建立匿名会话
    let (owner, jar) = match session.owner() {
        Some(owner) => (owner, jar),
        None => {
            let token = generate_token();
            let anonymous = state
                .store
                .insert_anonymous_session(&token, Utc::now() + session_ttl())
                .await?;
            tracing::debug!("created anonymous session {}", anonymous.id);
            let cookie = credential_cookie(ANONYMOUS_COOKIE, token, state.config.secure_cookies);
            let jar = jar.add(cookie);
            (Owner::AnonymousSession(anonymous.id), jar)
        }
    };

    let taken = state.store.list_slugs(owner).await?;
    let list = state
        .store
        .insert_list(NewList {
            owner,
            slug: unique_slug(&body.name, &taken),
            name: body.name,
            description: body.description,
            is_public,
        })
        .await?;

    Ok((StatusCode::CREATED, jar, Json(list)))
}

pub async fn get_list_handler(
    Path(id): Path<Uuid>,
    Query(query): Query<WeightQuery>,
    session: CurrentSession,
    State(state): State<AppState>,
) -> Result<Json<ListDetail>, AppError> {
    let list = find_list(state.store.as_ref(), id).await?;
    session.ensure_can_read(&list)?;

    let unit = query.unit.unwrap_or_default();
    let detail = list_detail(state.store.as_ref(), list, &session, unit).await?;
    Ok(Json(detail))
}

/// Share link. Anything the caller may not read is reported as missing.
pub async fn get_public_list_handler(
    Path((username, slug)): Path<(String, String)>,
    Query(query): Query<WeightQuery>,
    session: CurrentSession,
    State(state): State<AppState>,
) -> Result<Json<ListDetail>, AppError> {
    let not_found = || AppError::NotFound("List not found".into());

    let user = state
        .store
        .find_user_by_username(&username)
        .await?
        .ok_or_else(not_found)?;
    let list = state
        .store
        .find_list_by_slug(Owner::User(user.id), &slug)
        .await?
        .ok_or_else(not_found)?;
    if !session.can_read(&list) {
        return Err(not_found());
    }

    let unit = query.unit.unwrap_or_default();
    let detail = list_detail(state.store.as_ref(), list, &session, unit).await?;
    Ok(Json(detail))
}

pub async fn update_list_handler(
    Path(id): Path<Uuid>,
    session: CurrentSession,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<UpdateListSchema>,
) -> Result<Json<List>, AppError> {
    let list = find_list(state.store.as_ref(), id).await?;
    session.ensure_can_write(&list)?;
    if body.is_public == Some(true) && !session.is_authenticated() {
        return Err(AppError::Forbidden("Sign up to publish a list".into()));
    }

    let slug = match &body.name {
        Some(name) if *name != list.name => {
            let taken: Vec<String> = state
                .store
                .list_slugs(list.owner)
                .await?
                .into_iter()
                .filter(|s| *s != list.slug)
                .collect();
            Some(unique_slug(name, &taken))
        }
        _ => None,
    };

    let list = state
        .store
        .update_list(
            id,
            ListChanges {
                name: body.name,
                slug,
                description: body.description,
                is_public: body.is_public,
            },
        )
        .await?;
    Ok(Json(list))
}

pub async fn delete_list_handler(
    Path(id): Path<Uuid>,
    session: CurrentSession,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let list = find_list(state.store.as_ref(), id).await?;
    session.ensure_can_write(&list)?;

    if !state.store.delete_list(id).await? {
        return Err(AppError::NotFound("List not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- 3. 分类 ---

pub async fn create_category_handler(
    Path(list_id): Path<Uuid>,
    session: CurrentSession,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateCategorySchema>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let list = find_list(state.store.as_ref(), list_id).await?;
    session.ensure_can_write(&list)?;

    let category = state
        .store
        .insert_category(NewCategory {
            list_id,
            name: body.name,
            description: body.description,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category_handler(
    Path(id): Path<Uuid>,
    session: CurrentSession,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<UpdateCategorySchema>,
) -> Result<Json<Category>, AppError> {
    writable_category(state.store.as_ref(), &session, id).await?;

    let category = state
        .store
        .update_category(
            id,
            CategoryChanges {
                name: body.name,
                description: body.description,
            },
        )
        .await?;
    Ok(Json(category))
}

pub async fn delete_category_handler(
    Path(id): Path<Uuid>,
    session: CurrentSession,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    writable_category(state.store.as_ref(), &session, id).await?;

    if !state.store.delete_category(id).await? {
        return Err(AppError::NotFound("Category not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reorder_categories_handler(
    Path(list_id): Path<Uuid>,
    session: CurrentSession,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<ReorderSchema>,
) -> Result<Json<Vec<Category>>, AppError> {
    let list = find_list(state.store.as_ref(), list_id).await?;
    session.ensure_can_write(&list)?;

    state.store.reorder_categories(list_id, &body.ids).await?;
    Ok(Json(state.store.categories_for_list(list_id).await?))
}

// --- 4. 装备 ---

pub async fn create_item_handler(
    Path(category_id): Path<Uuid>,
    session: CurrentSession,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateItemSchema>,
) -> Result<(StatusCode, Json<Item>), AppError> {
    writable_category(state.store.as_ref(), &session, category_id).await?;

    let item = state
        .store
        .insert_item(NewItem {
            category_id,
            name: body.name,
            description: body.description,
            url: body.url,
            weight_amount: body.weight_amount,
            weight_unit: body.weight_unit,
            label: body.label,
            quantity: body.quantity,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_item_handler(
    Path(id): Path<Uuid>,
    session: CurrentSession,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<UpdateItemSchema>,
) -> Result<Json<Item>, AppError> {
    writable_item(state.store.as_ref(), &session, id).await?;

    let item = state
        .store
        .update_item(
            id,
            ItemChanges {
                name: body.name,
                description: body.description,
                url: body.url,
                weight_amount: body.weight_amount,
                weight_unit: body.weight_unit,
                label: body.label,
                quantity: body.quantity,
            },
        )
        .await?;
    Ok(Json(item))
}

pub async fn delete_item_handler(
    Path(id): Path<Uuid>,
    session: CurrentSession,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    writable_item(state.store.as_ref(), &session, id).await?;

    if !state.store.delete_item(id).await? {
        return Err(AppError::NotFound("Item not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reorder_items_handler(
    Path(category_id): Path<Uuid>,
    session: CurrentSession,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<ReorderSchema>,
) -> Result<Json<Vec<Item>>, AppError> {
    writable_category(state.store.as_ref(), &session, category_id).await?;

    state.store.reorder_items(category_id, &body.ids).await?;
    Ok(Json(state.store.items_for_category(category_id).await?))
}

// --- 5. 公共辅助 ---

async fn find_list(store: &dyn Store, id: Uuid) -> Result<List, AppError> {
    store
        .find_list(id)
        .await?
        .ok_or_else(|| AppError::NotFound("List not found".into()))
}

/// Category plus the ownership check against the list it belongs to.
async fn writable_category(
    store: &dyn Store,
    session: &CurrentSession,
    id: Uuid,
) -> Result<Category, AppError> {
    let category = store
        .find_category(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".into()))?;
    let list = find_list(store, category.list_id).await?;
    session.ensure_can_write(&list)?;
    Ok(category)
}

async fn writable_item(
    store: &dyn Store,
    session: &CurrentSession,
    id: Uuid,
) -> Result<Item, AppError> {
    let item = store
        .find_item(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found".into()))?;
    writable_category(store, session, item.category_id).await?;
    Ok(item)
}

async fn list_detail(
    store: &dyn Store,
    list: List,
    session: &CurrentSession,
    unit: WeightUnit,
) -> Result<ListDetail, AppError> {
    let categories = store.categories_for_list(list.id).await?;
    let mut by_category: HashMap<Uuid, Vec<Item>> = HashMap::new();
    for item in store.items_for_list(list.id).await? {
        by_category.entry(item.category_id).or_default().push(item);
    }

    let tree: Vec<(Category, Vec<Item>)> = categories
        .into_iter()
        .map(|c| {
            let items = by_category.remove(&c.id).unwrap_or_default();
            (c, items)
        })
        .collect();
    let summary = summarize_list(&tree, unit);

    // 每个分类的重量汇总只在 summary.categories 中出现一次
    let categories = tree
        .into_iter()
        .map(|(category, items)| CategoryDetail { category, items })
        .collect();

    Ok(ListDetail {
        is_owner: session.owns(&list.owner),
        list,
        categories,
        summary,
    })
}
