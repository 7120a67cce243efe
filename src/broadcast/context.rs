use std::collections::HashMap;

use crate::envelope::Envelope;

/// Сообщения для одного канала рассылки.
#[derive(Debug, Clone)]
pub struct ChannelBroadcast {
    /// Адресат: id соединения, канал или связанный идентификатор.
    pub identifier: String,
    pub messages: Vec<Envelope>,
    pub use_finalizer: bool,
}

/// Рассылки, собранные за обработку одного запроса.
///
/// Каналы отдаются в порядке первого добавления.
#[derive(Debug, Clone, Default)]
pub struct BroadcastContext {
    channels: HashMap<String, ChannelBroadcast>,
    order: Vec<String>,
}

impl BroadcastContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавляет сообщение в канал `key`. Адресат берётся из первого
    /// добавления.
    pub fn add(
        &mut self,
        key: impl Into<String>,
        identifier: impl Into<String>,
        message: Envelope,
    ) {
        self.entry(key.into(), identifier.into())
            .messages
            .push(message);
    }

    pub fn add_all(
        &mut self,
        key: impl Into<String>,
        identifier: impl Into<String>,
        messages: impl IntoIterator<Item = Envelope>,
    ) {
        self.entry(key.into(), identifier.into())
            .messages
            .extend(messages);
    }

    /// Включает финализатор для канала. Возвращает `false`, если канала нет.
    pub fn use_finalizer(
        &mut self,
        key: &str,
    ) -> bool {
        match self.channels.get_mut(key) {
            Some(channel) => {
                channel.use_finalizer = true;
                true
            }
            None => false,
        }
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<&ChannelBroadcast> {
        self.channels.get(key)
    }

    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Разбирает контекст на каналы в порядке добавления.
    pub fn into_channels(mut self) -> Vec<(String, ChannelBroadcast)> {
        self.order
            .into_iter()
            .filter_map(|key| self.channels.remove(&key).map(|c| (key, c)))
            .collect()
    }

    fn entry(
        &mut self,
        key: String,
        identifier: String,
    ) -> &mut ChannelBroadcast {
        if !self.channels.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.channels
            .entry(key)
            .or_insert_with(|| ChannelBroadcast {
                identifier,
                messages: Vec::new(),
                use_finalizer: false,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет порядок каналов и накопление сообщений под одним
    /// ключом.
    #[test]
    fn test_insertion_order_and_append() {
        let mut ctx = BroadcastContext::new();
        ctx.add("b", "room-b", Envelope::new("t", "x", 1u8));
        ctx.add("a", "room-a", Envelope::new("t", "x", 2u8));
        ctx.add("b", "ignored", Envelope::new("t", "x", 3u8));

        assert_eq!(ctx.keys(), ["b".to_string(), "a".to_string()]);
        assert_eq!(ctx.get("b").unwrap().identifier, "room-b");
        assert_eq!(ctx.get("b").unwrap().messages.len(), 2);

        assert!(ctx.use_finalizer("a"));
        assert!(!ctx.use_finalizer("zzz"));

        let channels = ctx.into_channels();
        assert_eq!(channels[0].0, "b");
        assert!(channels[1].1.use_finalizer);
    }
}
