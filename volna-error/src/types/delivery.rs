use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки доставки сообщения подписчику, соединению или финализатору.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Очередь подписчика не освободилась за отведённое время, сообщение
    /// отброшено
    #[error("inbox of '{subscriber_id}' is full, message dropped after {timeout_ms}ms")]
    PublishTimeout {
        subscriber_id: String,
        timeout_ms: u64,
    },

    /// Получатель очереди закрыт
    #[error("inbox of '{subscriber_id}' is closed")]
    InboxClosed { subscriber_id: String },

    /// Соединение закрыто и больше не принимает сообщения
    #[error("connection '{connection_id}' is closed")]
    ConnectionClosed { connection_id: String },

    /// Внешний резолвер каналов не ответил
    #[error("channel info unavailable for '{identifier}': {reason}")]
    ChannelInfo { identifier: String, reason: String },

    /// Финализатор канала вернул ошибку
    #[error("finalizer for channel '{channel}' failed: {reason}")]
    Finalizer { channel: String, reason: String },
}

impl ErrorExt for DeliveryError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::PublishTimeout { .. } => StatusCode::PublishTimeout,
            Self::InboxClosed { .. } => StatusCode::InboxClosed,
            Self::ConnectionClosed { .. } => StatusCode::ConnectionClosed,
            Self::ChannelInfo { .. } => StatusCode::ChannelInfoUnavailable,
            Self::Finalizer { .. } => StatusCode::FinalizerFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn kind(&self) -> &'static str {
        "delivery"
    }

    fn log_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("kind", self.kind().to_string()),
            ("code", self.status_code().code().to_string()),
        ];

        match self {
            Self::PublishTimeout { subscriber_id, .. } | Self::InboxClosed { subscriber_id } => {
                tags.push(("subscriber_id", subscriber_id.clone()));
            }
            Self::ConnectionClosed { connection_id } => {
                tags.push(("connection_id", connection_id.clone()));
            }
            Self::ChannelInfo { identifier, .. } => {
                tags.push(("identifier", identifier.clone()));
            }
            Self::Finalizer { channel, .. } => {
                tags.push(("channel", channel.clone()));
            }
        }

        tags
    }
}

impl DeliveryError {
    /// Переводит ошибку `send_timeout` очереди в ошибку доставки.
    #[cfg(feature = "tokio")]
    pub fn from_send_timeout<T>(
        subscriber_id: impl Into<String>,
        timeout: std::time::Duration,
        err: tokio::sync::mpsc::error::SendTimeoutError<T>,
    ) -> Self {
        match err {
            tokio::sync::mpsc::error::SendTimeoutError::Timeout(_) => Self::PublishTimeout {
                subscriber_id: subscriber_id.into(),
                timeout_ms: timeout.as_millis() as u64,
            },
            tokio::sync::mpsc::error::SendTimeoutError::Closed(_) => Self::InboxClosed {
                subscriber_id: subscriber_id.into(),
            },
        }
    }
}
