/// Рассылка по каналам: источники, шины каналов, финализаторы.
pub mod broadcast;
/// Встроенный пак `core` и обработчики эталонного сервера.
pub mod builtin;
/// Шины каналов и их пул.
pub mod bus;
/// Загрузка настроек.
pub mod config;
/// Интерфейс соединения и события его жизненного цикла.
pub mod connection;
/// Конверт сообщения и его wire-формат.
pub mod envelope;
/// Гибкое логирование (форматы, фильтры, файловый вывод).
pub mod logging;
/// Эталонный TCP-хост.
pub mod network;
/// Продюсеры: пул по типам, пересылка по правилам, эмиттер.
pub mod producer;
/// Реестр типов payload и паки.
pub mod registry;
/// Маршрутизация входящих сообщений.
pub mod router;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

pub use broadcast::{BroadcastContext, Broadcaster, ChannelInfoResolver, StaticChannelResolver};
pub use bus::{Bus, BusPool, BusPoolConfig, Inbox, Subscriber};
pub use config::Settings;
pub use connection::{Connection, ConnectionEvent, MemoryConnection};
pub use envelope::{Envelope, Payload, TypedMessage};
pub use producer::{DefaultEmitter, Forwarder, Producer, ProducersPool, ProducersPoolConfig};
pub use registry::{Pack, PackEntry, TypeRegistry};
pub use router::{ConnectionWatcher, Handler, RequestContext, Router};
pub use volna_error::{StackError, StatusCode, VolnaResult};
