use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant},
};
use tracing::{debug, info};

use super::{Bus, Subscriber};

/// Настройки пула шин.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BusPoolConfig {
    /// Период удаления шин без подписчиков, в секундах.
    pub sweep_interval_secs: u64,
}

/// Пул шин по идентификатору канала.
///
/// Одна блокировка защищает поиск, создание и очистку. Блокировку шины
/// пул не берёт никогда: sweep читает атомарный счётчик подписчиков.
pub struct BusPool {
    buses: RwLock<HashMap<String, Arc<Bus>>>,
    config: BusPoolConfig,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl BusPoolConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl BusPool {
    pub fn new(config: BusPoolConfig) -> Self {
        Self {
            buses: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &BusPoolConfig {
        &self.config
    }

    /// Возвращает шину канала, создавая её при первом обращении.
    pub fn get(
        &self,
        key: &str,
    ) -> Arc<Bus> {
        if let Some(bus) = self.buses.read().get(key) {
            return Arc::clone(bus);
        }

        let mut buses = self.buses.write();
        let bus = buses.entry(key.to_string()).or_insert_with(|| {
            debug!(bus = %key, "Bus created");
            Arc::new(Bus::new(key))
        });
        Arc::clone(bus)
    }

    /// Шина канала без создания.
    pub fn lookup(
        &self,
        key: &str,
    ) -> Option<Arc<Bus>> {
        self.buses.read().get(key).cloned()
    }

    /// Получает шину и подписывает на неё получателя.
    ///
    /// Если sweep успел удалить шину между поиском и подпиской, подписка
    /// переносится на новую шину этого канала.
    pub fn get_and_subscribe(
        &self,
        key: &str,
        subscriber: Arc<dyn Subscriber>,
    ) -> (Arc<Bus>, String) {
        loop {
            let bus = self.get(key);
            let id = bus.subscribe(Arc::clone(&subscriber));

            let still_pooled = self
                .buses
                .read()
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, &bus));
            if still_pooled {
                return (bus, id);
            }

            bus.unsubscribe(&id);
            debug!(bus = %key, "Bus swept during subscribe, retrying");
        }
    }

    /// Отписывает получателя от шины канала, если она существует.
    pub fn unsubscribe(
        &self,
        key: &str,
        subscriber_id: &str,
    ) -> bool {
        self.lookup(key)
            .is_some_and(|bus| bus.unsubscribe(subscriber_id))
    }

    /// Удаляет шины без подписчиков. Возвращает количество удалённых.
    pub fn sweep(&self) -> usize {
        let mut buses = self.buses.write();
        let before = buses.len();
        buses.retain(|_, bus| bus.count_subscriptions() > 0);
        before - buses.len()
    }

    pub fn len(&self) -> usize {
        self.buses.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.read().is_empty()
    }

    /// Запускает фоновую очистку пула.
    ///
    /// Задача завершается сама, когда пул освобождён; `JoinHandle` можно
    /// использовать для досрочной отмены.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let period = self.config.sweep_interval();
        let pool: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);

            loop {
                ticker.tick().await;

                let Some(pool) = pool.upgrade() else {
                    break;
                };
                let removed = pool.sweep();
                if removed > 0 {
                    debug!("Swept {} idle buses", removed);
                }
            }
            info!("Bus pool sweeper stopped");
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for BusPoolConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 120,
        }
    }
}

impl Default for BusPool {
    fn default() -> Self {
        Self::new(BusPoolConfig::default())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use volna_error::StackError;

    use super::*;
    use crate::envelope::Envelope;

    struct Noop(&'static str);

    #[async_trait]
    impl Subscriber for Noop {
        fn id(&self) -> &str {
            self.0
        }

        async fn publish(
            &self,
            _envelope: Envelope,
        ) -> Result<(), StackError> {
            Ok(())
        }
    }

    /// Тест проверяет, что `get` возвращает одну и ту же шину для ключа.
    #[test]
    fn test_get_returns_same_bus() {
        let pool = BusPool::default();
        let a = pool.get("room-1");
        let b = pool.get("room-1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    /// Тест проверяет, что sweep удаляет только пустые шины, а `get` после
    /// этого возвращает новую шину.
    #[test]
    fn test_sweep_removes_empty_buses() {
        let pool = BusPool::default();
        let empty = pool.get("empty");
        let (busy, _) = pool.get_and_subscribe("busy", Arc::new(Noop("a")));

        assert_eq!(pool.sweep(), 1);
        assert!(pool.lookup("empty").is_none());
        assert!(Arc::ptr_eq(&pool.get("busy"), &busy));

        let fresh = pool.get("empty");
        assert!(!Arc::ptr_eq(&fresh, &empty));
    }

    #[test]
    fn test_unsubscribe_through_pool() {
        let pool = BusPool::default();
        pool.get_and_subscribe("k", Arc::new(Noop("a")));
        assert!(pool.unsubscribe("k", "a"));
        assert!(!pool.unsubscribe("missing", "a"));
        assert_eq!(pool.sweep(), 1);
        assert!(pool.is_empty());
    }

    /// Тест проверяет фоновую очистку с виртуальным временем: шина без
    /// подписчиков живёт до первого тика.
    #[tokio::test]
    async fn test_sweeper_runs_on_interval() {
        tokio::time::pause();

        let pool = Arc::new(BusPool::new(BusPoolConfig {
            sweep_interval_secs: 5,
        }));
        pool.get("idle");
        pool.get_and_subscribe("live", Arc::new(Noop("a")));

        let handle = pool.spawn_sweeper();

        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert!(pool.lookup("idle").is_some());

        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(pool.lookup("idle").is_none());
        assert!(pool.lookup("live").is_some());

        handle.abort();
    }
}
