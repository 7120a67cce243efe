use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use volna_error::StackError;

use crate::connection::Connection;

/// Значение соединения с идентификатором его канала.
pub const VALUE_CHANNEL_ID: &str = "channel_id";

/// Значение соединения со списком связанных каналов.
pub const VALUE_RELATED_CHANNELS: &str = "related_channels";

/// Канал соединения и связанные с ним каналы.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel_id: String,
    #[serde(default)]
    pub related: Vec<String>,
}

/// Внешний источник сведений о каналах.
#[async_trait]
pub trait ChannelInfoResolver: Send + Sync {
    /// Канал соединения. `Ok(None)`: соединение ни к какому каналу не
    /// относится.
    async fn connection_channel(
        &self,
        connection: &dyn Connection,
    ) -> Result<Option<ChannelInfo>, StackError>;

    /// Каналы, связанные с идентификатором.
    async fn related_channels(
        &self,
        identifier: &str,
    ) -> Result<Vec<String>, StackError>;
}

/// Резолвер на значениях соединения и статической таблице связей.
///
/// Канал берётся из значения `channel_id` соединения, связанные каналы из
/// `related_channels` или из таблицы.
#[derive(Debug, Default)]
pub struct StaticChannelResolver {
    relations: RwLock<HashMap<String, Vec<String>>>,
}

impl StaticChannelResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Задаёт связанные каналы идентификатора (регистр не важен).
    pub fn relate<I, S>(
        &self,
        identifier: &str,
        related: I,
    ) where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations.write().insert(
            identifier.to_ascii_lowercase(),
            related.into_iter().map(Into::into).collect(),
        );
    }
}

#[async_trait]
impl ChannelInfoResolver for StaticChannelResolver {
    async fn connection_channel(
        &self,
        connection: &dyn Connection,
    ) -> Result<Option<ChannelInfo>, StackError> {
        let Some(channel_id) = connection
            .value(VALUE_CHANNEL_ID)
            .and_then(|v| v.as_str().map(str::to_string))
        else {
            return Ok(None);
        };

        let related = match connection.value(VALUE_RELATED_CHANNELS) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => self
                .relations
                .read()
                .get(&channel_id.to_ascii_lowercase())
                .cloned()
                .unwrap_or_default(),
        };

        Ok(Some(ChannelInfo {
            channel_id,
            related,
        }))
    }

    async fn related_channels(
        &self,
        identifier: &str,
    ) -> Result<Vec<String>, StackError> {
        Ok(self
            .relations
            .read()
            .get(&identifier.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}
