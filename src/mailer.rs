// src/mailer.rs
use async_trait::async_trait;

use crate::error::AppResult;

/// Outgoing transactional mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, to: &str, link: &str) -> AppResult<()>;
}

/// Writes the message to the log instead of delivering it.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, to: &str, link: &str) -> AppResult<()> {
        // 链接里带着一次性令牌，只在 debug 级别输出
        tracing::info!(to, "password reset requested");
        tracing::debug!(to, link, "password reset link");
        Ok(())
    }
}
