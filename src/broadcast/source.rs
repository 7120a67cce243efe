use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;

use crate::connection::Connection;

/// Зарегистрированное соединение-источник.
#[derive(Clone)]
pub struct Source {
    pub connection: Arc<dyn Connection>,
    pub channel_id: String,
    pub related: Vec<String>,
    /// `None`, пока источник не подписан на шину своего канала.
    pub subscription_id: Option<String>,
}

impl Source {
    pub fn new(
        connection: Arc<dyn Connection>,
        channel_id: impl Into<String>,
        related: Vec<String>,
    ) -> Self {
        Self {
            connection,
            channel_id: channel_id.into(),
            related,
            subscription_id: None,
        }
    }

    pub fn connection_id(&self) -> &str {
        self.connection.id()
    }

    /// Ключ шины канала (без учёта регистра).
    pub fn channel_key(&self) -> String {
        self.channel_id.to_ascii_lowercase()
    }

    /// Источник относится к адресату напрямую или через связанный канал.
    pub fn matches(
        &self,
        destination: &str,
    ) -> bool {
        self.channel_id.eq_ignore_ascii_case(destination)
            || self
                .related
                .iter()
                .any(|r| r.eq_ignore_ascii_case(destination))
    }
}

impl fmt::Debug for Source {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Source")
            .field("connection", &self.connection.id())
            .field("channel_id", &self.channel_id)
            .field("related", &self.related)
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}

/// Таблица источников по id соединения.
#[derive(Debug, Default)]
pub struct SourceTable {
    sources: RwLock<HashMap<String, Source>>,
}

impl SourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Регистрирует источник, заменяя прежний с тем же id.
    pub fn insert(
        &self,
        source: Source,
    ) -> Option<Source> {
        self.sources
            .write()
            .insert(source.connection_id().to_string(), source)
    }

    pub fn remove(
        &self,
        connection_id: &str,
    ) -> Option<Source> {
        self.sources.write().remove(connection_id)
    }

    pub fn get(
        &self,
        connection_id: &str,
    ) -> Option<Source> {
        self.sources.read().get(connection_id).cloned()
    }

    /// Источники, относящиеся к адресату, кроме отправителя.
    pub fn matching(
        &self,
        from_id: &str,
        destination: &str,
    ) -> Vec<Source> {
        self.sources
            .read()
            .values()
            .filter(|s| s.connection_id() != from_id && s.matches(destination))
            .cloned()
            .collect()
    }

    /// Источники канала, кроме отправителя.
    pub fn in_channel(
        &self,
        from_id: &str,
        channel_id: &str,
    ) -> Vec<Source> {
        self.sources
            .read()
            .values()
            .filter(|s| {
                s.connection_id() != from_id && s.channel_id.eq_ignore_ascii_case(channel_id)
            })
            .cloned()
            .collect()
    }

    /// Запоминает подписку источника. Удалённый источник не воскрешается.
    pub fn mark_subscribed(
        &self,
        connection_id: &str,
        subscription_id: String,
    ) -> bool {
        match self.sources.write().get_mut(connection_id) {
            Some(source) => {
                source.subscription_id = Some(subscription_id);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryConnection;

    fn source(
        id: &str,
        channel: &str,
        related: &[&str],
    ) -> Source {
        Source::new(
            Arc::new(MemoryConnection::new(id)),
            channel,
            related.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// Тест проверяет поиск по каналу и связанным каналам без учёта
    /// регистра и с пропуском отправителя.
    #[test]
    fn test_matching_case_insensitive() {
        let table = SourceTable::new();
        table.insert(source("a", "Room-1", &[]));
        table.insert(source("b", "room-1", &["party-9"]));
        table.insert(source("c", "room-2", &["PARTY-9"]));

        let mut ids: Vec<String> = table
            .matching("a", "ROOM-1")
            .iter()
            .map(|s| s.connection_id().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["b"]);

        assert_eq!(table.matching("x", "party-9").len(), 2);
        assert_eq!(table.in_channel("x", "room-1").len(), 2);
    }

    #[test]
    fn test_mark_subscribed_does_not_resurrect() {
        let table = SourceTable::new();
        table.insert(source("a", "room-1", &[]));
        assert!(table.mark_subscribed("a", "a".to_string()));
        assert_eq!(table.get("a").unwrap().subscription_id.as_deref(), Some("a"));

        table.remove("a");
        assert!(!table.mark_subscribed("a", "a".to_string()));
        assert!(table.is_empty());
    }
}
