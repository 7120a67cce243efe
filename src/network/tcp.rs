use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::{mpsc, Notify},
    task::JoinHandle,
};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, error, trace, warn};
use volna_error::{DeliveryError, EnvelopeError, StackError};

use crate::{
    bus::{Inbox, Subscriber},
    config::ServerSettings,
    connection::Connection,
    envelope::{self, Envelope},
    registry::TypeRegistry,
};

/// Значение соединения с адресом клиента.
pub const VALUE_PEER_ADDR: &str = "peer_addr";

/// Соединение поверх TCP (или любого дуплексного потока).
///
/// Кадр = одна строка JSON не длиннее `max_frame_bytes`. Первая строка от
/// клиента содержит объект значений соединения, остальные строки являются
/// конвертами.
pub struct TcpConnection {
    id: String,
    values: HashMap<String, Value>,
    listener: Mutex<Option<mpsc::Sender<Envelope>>>,
    listener_ready: Notify,
    outbound: Inbox,
}

/// Запущенное соединение и его фоновые задачи.
pub struct TcpSession {
    pub connection: Arc<TcpConnection>,
    pub reader: JoinHandle<()>,
    pub writer: JoinHandle<()>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl TcpConnection {
    /// Читает handshake и запускает задачи чтения и записи.
    ///
    /// Возвращает ошибку, если поток закрылся до handshake или первая
    /// строка не является JSON-объектом.
    pub async fn accept<S>(
        id: impl Into<String>,
        stream: S,
        peer: Option<SocketAddr>,
        registry: Arc<TypeRegistry>,
        settings: &ServerSettings,
    ) -> Result<TcpSession, StackError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = id.into();
        let (read_half, write_half) = tokio::io::split(stream);
        let mut frames = FramedRead::new(
            read_half,
            LinesCodec::new_with_max_length(settings.max_frame_bytes),
        );

        let mut values = read_handshake(&id, &mut frames).await?;
        if let Some(peer) = peer {
            values.insert(VALUE_PEER_ADDR.to_string(), Value::String(peer.to_string()));
        }

        let (outbound, outbound_rx) = Inbox::channel(
            id.clone(),
            settings.inbox_capacity,
            settings.publish_timeout(),
        );
        let connection = Arc::new(Self {
            id,
            values,
            listener: Mutex::new(None),
            listener_ready: Notify::new(),
            outbound,
        });

        let writer = tokio::spawn(write_loop(
            connection.id.clone(),
            write_half,
            outbound_rx,
        ));
        let reader = tokio::spawn(read_loop(Arc::clone(&connection), frames, registry));

        Ok(TcpSession {
            connection,
            reader,
            writer,
        })
    }

    /// Ждёт, пока роутер передаст очередь входящих.
    async fn wait_listener(&self) -> mpsc::Sender<Envelope> {
        loop {
            let notified = self.listener_ready.notified();
            if let Some(listener) = self.listener.lock().clone() {
                if !listener.is_closed() {
                    return listener;
                }
            }
            notified.await;
        }
    }

    fn clear_closed_listener(&self) {
        let mut listener = self.listener.lock();
        if listener.as_ref().is_some_and(|l| l.is_closed()) {
            *listener = None;
        }
    }
}

async fn read_handshake<R>(
    id: &str,
    frames: &mut FramedRead<R, LinesCodec>,
) -> Result<HashMap<String, Value>, StackError>
where
    R: AsyncRead + Unpin,
{
    let line = match frames.next().await {
        Some(Ok(line)) => line,
        Some(Err(LinesCodecError::Io(e))) => return Err(e.into()),
        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
            return Err(EnvelopeError::Deserialization {
                payload_type: "handshake".to_string(),
                reason: "frame too long".to_string(),
            }
            .into());
        }
        None => {
            return Err(DeliveryError::ConnectionClosed {
                connection_id: id.to_string(),
            }
            .into());
        }
    };

    let object: Map<String, Value> =
        serde_json::from_str(line.trim()).map_err(|e| EnvelopeError::Deserialization {
            payload_type: "handshake".to_string(),
            reason: e.to_string(),
        })?;

    Ok(object.into_iter().collect())
}

async fn read_loop<R>(
    connection: Arc<TcpConnection>,
    mut frames: FramedRead<R, LinesCodec>,
    registry: Arc<TypeRegistry>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let line = match frames.next().await {
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                // кодек сам пропускает остаток кадра до перевода строки
                warn!(
                    connection = %connection.id,
                    limit = frames.decoder().max_length(),
                    "Dropping oversized frame"
                );
                continue;
            }
            Some(Err(LinesCodecError::Io(e))) => {
                warn!(connection = %connection.id, error = %e, "Read failed, closing");
                break;
            }
            None => {
                debug!(connection = %connection.id, "Client closed connection");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        trace!(connection = %connection.id, bytes = line.len(), "Frame received");

        let envelope = match registry.create_from_bytes(line.as_bytes()) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(connection = %connection.id, error = %e, "Dropping undecodable frame");
                continue;
            }
        };

        let mut pending = Some(envelope);
        while let Some(envelope) = pending.take() {
            let listener = connection.wait_listener().await;
            if let Err(mpsc::error::SendError(envelope)) = listener.send(envelope).await {
                connection.clear_closed_listener();
                pending = Some(envelope);
            }
        }
    }
}

async fn write_loop<W>(
    connection_id: String,
    mut writer: W,
    mut outbound: mpsc::Receiver<Envelope>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = outbound.recv().await {
        let mut frame = match envelope::encode(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                error!(
                    connection = %connection_id,
                    message_id = %envelope.id,
                    error = %e,
                    "Failed to encode outbound envelope"
                );
                continue;
            }
        };
        frame.push(b'\n');

        if let Err(e) = writer.write_all(&frame).await {
            debug!(connection = %connection_id, error = %e, "Write failed, stopping writer");
            break;
        }
        if let Err(e) = writer.flush().await {
            debug!(connection = %connection_id, error = %e, "Flush failed, stopping writer");
            break;
        }
    }

    let _ = writer.shutdown().await;
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl Connection for TcpConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn subscribe(
        &self,
        listener: mpsc::Sender<Envelope>,
    ) {
        *self.listener.lock() = Some(listener);
        self.listener_ready.notify_waiters();
    }

    async fn publish(
        &self,
        envelope: Envelope,
    ) -> Result<(), StackError> {
        if self.outbound.is_closed() {
            return Err(DeliveryError::ConnectionClosed {
                connection_id: self.id.clone(),
            }
            .into());
        }
        self.outbound.publish(envelope).await
    }

    fn value(
        &self,
        key: &str,
    ) -> Option<Value> {
        self.values.get(key).cloned()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
