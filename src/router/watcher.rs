use std::{any::Any, sync::Arc};

use dashmap::DashMap;
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
    task::{JoinError, JoinHandle},
};
use tracing::{debug, error, info, warn};
use volna_error::{RoutingError, StackError};

use super::Router;
use crate::{
    connection::{Connection, ConnectionEvent},
    envelope::Envelope,
};

/// Подключает соединения к роутеру.
///
/// На каждое добавленное соединение заводится очередь входящих сообщений и
/// отдельный цикл обработки. Паника при обработке сообщения не
/// останавливает цикл.
pub struct ConnectionWatcher {
    router: Arc<Router>,
    loops: DashMap<String, JoinHandle<()>>,
    inbox_capacity: usize,
}

impl ConnectionWatcher {
    pub fn new(
        router: Arc<Router>,
        inbox_capacity: usize,
    ) -> Self {
        Self {
            router,
            loops: DashMap::new(),
            inbox_capacity: inbox_capacity.max(1),
        }
    }

    pub fn on_event(
        &self,
        event: ConnectionEvent,
    ) {
        if event.added {
            self.attach(event.connection);
        } else {
            self.detach(event.connection.id());
        }
    }

    /// Запускает цикл обработки соединения. Прежний цикл с тем же id
    /// останавливается.
    pub fn attach(
        &self,
        connection: Arc<dyn Connection>,
    ) {
        let (tx, rx) = mpsc::channel(self.inbox_capacity);
        connection.subscribe(tx);

        let id = connection.id().to_string();
        let handle = tokio::spawn(serve_connection(Arc::clone(&self.router), connection, rx));
        if let Some(previous) = self.loops.insert(id.clone(), handle) {
            previous.abort();
        }
        debug!(connection = %id, "Connection attached");
    }

    pub fn detach(
        &self,
        connection_id: &str,
    ) -> bool {
        match self.loops.remove(connection_id) {
            Some((_, handle)) => {
                handle.abort();
                debug!(connection = %connection_id, "Connection detached");
                true
            }
            None => false,
        }
    }

    pub fn active(&self) -> usize {
        self.loops.len()
    }

    /// Слушает события соединений, пока канал событий открыт.
    pub fn watch(
        self: Arc<Self>,
        mut events: broadcast::Receiver<ConnectionEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.on_event(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Router lagged behind connection events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            for entry in self.loops.iter() {
                entry.value().abort();
            }
            self.loops.clear();
            info!("Connection watcher stopped");
        })
    }
}

async fn serve_connection(
    router: Arc<Router>,
    connection: Arc<dyn Connection>,
    mut inbox: mpsc::Receiver<Envelope>,
) {
    while let Some(envelope) = inbox.recv().await {
        let request = envelope.clone();
        let task_router = Arc::clone(&router);
        let task_connection = Arc::clone(&connection);

        let outcome =
            tokio::spawn(async move { task_router.listen(&task_connection, envelope).await }).await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(connection = %connection.id(), error = %e, "Some responses were not delivered");
            }
            Err(join) if join.is_panic() => {
                let err = RoutingError::PanicRecovered {
                    during: format!("handling '{}'", request.payload_type),
                    message: panic_message(join),
                };
                error!(
                    connection = %connection.id(),
                    message_id = %request.id,
                    error = %err,
                    "Handler panicked, message aborted"
                );
                let ack = router
                    .acknowledge_failure(&connection, &request, StackError::new(err))
                    .await;
                if let Err(e) = ack {
                    warn!(connection = %connection.id(), error = %e, "Failure ack not delivered");
                }
            }
            Err(_) => break,
        }
    }
    debug!(connection = %connection.id(), "Connection loop finished");
}

fn panic_message(join: JoinError) -> String {
    let payload: Box<dyn Any + Send> = join.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
