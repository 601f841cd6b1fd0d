// src/validation.rs
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::AppError;

/// JSON body that has already passed its `validator` rules.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: Validate + DeserializeOwned + 'static,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        // 1. 语法错误、缺字段、枚举值非法 (比如未知的重量单位) 都在这里变成 400
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

        // 2. 长度、范围、URL 等规则
        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateListSchema;
    use axum::{body::Body, http::header::CONTENT_TYPE};

    fn json_request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn accepts_valid_body() {
        let ValidatedJson(body) =
            ValidatedJson::<CreateListSchema>::from_request(json_request(r#"{"name":"PCT"}"#), &())
                .await
                .unwrap_or_else(|e| panic!("rejected: {e}"));
        assert_eq!(body.name, "PCT");
    }

    #[tokio::test]
    async fn rejects_rule_violations_and_bad_json() {
        let request = json_request(r#"{"name":""}"#);
        let empty_name = ValidatedJson::<CreateListSchema>::from_request(request, &()).await;
        assert!(matches!(empty_name, Err(AppError::ValidationError(_))));

        let broken =
            ValidatedJson::<CreateListSchema>::from_request(json_request(r#"{"name":"#), &()).await;
        assert!(matches!(broken, Err(AppError::BadRequest(_))));
    }
}
