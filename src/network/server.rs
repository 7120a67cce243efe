use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::{broadcast, Notify},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use volna_error::{ResultExt, VolnaResult};

use super::TcpConnection;
use crate::{
    config::ServerSettings,
    connection::{Connection, ConnectionEvent},
    registry::TypeRegistry,
};

/// Запущенный TCP-сервер.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Останавливает приём новых соединений.
    pub fn shutdown(&self) {
        info!("Initiating shutdown for TCP listener");
        self.shutdown.notify_one();
    }

    /// Ждёт завершения цикла приёма.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(error = %e, "Accept loop terminated abnormally");
        }
    }
}

/// Слушает адрес из настроек и публикует события соединений в `events`.
///
/// На каждое принятое соединение: handshake, событие `added`, ожидание
/// конца чтения, событие `removed`.
pub async fn run(
    settings: &ServerSettings,
    registry: Arc<TypeRegistry>,
    events: broadcast::Sender<ConnectionEvent>,
) -> VolnaResult<ServerHandle> {
    let listener = TcpListener::bind(&settings.listen_address)
        .await
        .with_context(|| format!("binding {}", settings.listen_address))?;
    let local_addr = listener.local_addr()?;
    info!(address = %local_addr, "Listening");

    let shutdown = Arc::new(Notify::new());
    let task = tokio::spawn(accept_loop(
        listener,
        settings.clone(),
        registry,
        events,
        Arc::clone(&shutdown),
    ));

    Ok(ServerHandle {
        local_addr,
        shutdown,
        task,
    })
}

async fn accept_loop(
    listener: TcpListener,
    settings: ServerSettings,
    registry: Arc<TypeRegistry>,
    events: broadcast::Sender<ConnectionEvent>,
    shutdown: Arc<Notify>,
) {
    let counter = AtomicU64::new(0);

    loop {
        select! {
            _ = shutdown.notified() => {
                info!("TCP listener stopped");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, addr)) => {
                        let id = format!("conn-{}", counter.fetch_add(1, Ordering::Relaxed) + 1);
                        tokio::spawn(handle_socket(
                            id,
                            socket,
                            addr,
                            settings.clone(),
                            Arc::clone(&registry),
                            events.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                    }
                }
            }
        }
    }
}

async fn handle_socket(
    id: String,
    socket: TcpStream,
    addr: SocketAddr,
    settings: ServerSettings,
    registry: Arc<TypeRegistry>,
    events: broadcast::Sender<ConnectionEvent>,
) {
    if let Err(e) = socket.set_nodelay(true) {
        debug!(connection = %id, error = %e, "Failed to set TCP_NODELAY");
    }

    let session = match TcpConnection::accept(id.clone(), socket, Some(addr), registry, &settings)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            warn!(connection = %id, peer = %addr, error = %e, "Handshake failed, closing");
            return;
        }
    };

    let connection: Arc<dyn Connection> = session.connection;
    info!(connection = %id, peer = %addr, "Connection established");
    if events.send(ConnectionEvent::added(Arc::clone(&connection))).is_err() {
        warn!(connection = %id, "No listeners for connection events");
    }

    if let Err(e) = session.reader.await {
        error!(connection = %id, error = %e, "Reader task failed");
    }

    let _ = events.send(ConnectionEvent::removed(connection));
    session.writer.abort();
    info!(connection = %id, peer = %addr, "Connection closed");
}
