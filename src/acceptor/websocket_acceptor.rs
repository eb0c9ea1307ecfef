use super::*;
use futures::{FutureExt, SinkExt, StreamExt};
use std::{
    net::SocketAddr,
    ops::Deref,
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering::SeqCst},
        Arc, Mutex,
    },
};
use tokio::{runtime::Handle, sync::mpsc};
use warp::{filters::BoxedFilter, Filter};

type GenericFilter = BoxedFilter<(Box<dyn warp::Reply>,)>;

/// PEM files for serving wss://
#[derive(Debug, Clone, PartialEq)]
pub struct TlsMaterial {
    pub key_path: String,
    pub cert_path: String,
}

enum WsServerEvent {
    Connected {
        id: u64,
        remote_address: String,
        outbound: mpsc::Sender<WsOutbound>,
    },
    Message {
        id: u64,
        text: String,
    },
    Closed {
        id: u64,
    },
}

fn deliver(events: &RemoteSender<WsServerEvent>, event: WsServerEvent) -> bool {
    events.send(event).is_ok()
}

async fn receive(
    rx: &mut futures::stream::SplitStream<warp::ws::WebSocket>,
    id: u64,
    events: &RemoteSender<WsServerEvent>,
) {
    while let Some(result) = rx.next().await {
        match result {
            Ok(message) => {
                if message.is_close() {
                    return;
                }
                if message.is_text() || message.is_binary() {
                    let text = String::from_utf8_lossy(message.as_bytes()).into_owned();
                    if !deliver(events, WsServerEvent::Message { id, text }) {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("closing WebSocket due to error receiving message: {}", e);
                return;
            }
        }
    }
}

async fn run_websocket(
    websocket: warp::ws::WebSocket,
    id: u64,
    remote_address: String,
    events: RemoteSender<WsServerEvent>,
) {
    let (outbound, mut outbound_rx) = mpsc::channel(OUTBOUND_BUFFER_SIZE);
    let peer = format!("WebSocket client {} ({})", id, remote_address);
    let connected = WsServerEvent::Connected {
        id,
        remote_address,
        outbound,
    };
    if !deliver(&events, connected) {
        return;
    }
    let (mut tx, mut rx) = websocket.split();
    let send = drain_outbound(
        &mut tx,
        &mut outbound_rx,
        warp::ws::Message::text::<String>,
        &peer,
    );
    tokio::select! {
        _ = send => (),
        _ = receive(&mut rx, id, &events) => (),
    };
    deliver(&events, WsServerEvent::Closed { id });
    match tx.reunite(rx) {
        Ok(websocket) => {
            if let Err(e) = websocket.close().await {
                debug!("closing WebSocket: {}", e);
            }
        }
        Err(e) => error!("reuniting WebSocket: {}", e),
    }
}

/// Upgrades any request to a WebSocket and reports everything that happens on it to the loop
fn websocket_filter(events: RemoteSender<WsServerEvent>) -> GenericFilter {
    // Everything captured by the warp filter needs to be clonable and sync
    let events = Arc::new(Mutex::new(events));
    let next_id = Arc::new(AtomicU64::new(1));
    warp::ws()
        .and(warp::addr::remote())
        .map(move |ws: warp::ws::Ws, addr: Option<SocketAddr>| {
            let events = events.lock().ok().map(|events| events.clone());
            let id = next_id.fetch_add(1, SeqCst);
            let remote_address = addr.map(|addr| addr.to_string()).unwrap_or_default();
            Box::new(ws.on_upgrade(move |websocket| async move {
                match events {
                    Some(events) => run_websocket(websocket, id, remote_address, events).await,
                    None => error!("WebSocket event sender is poisoned"),
                }
            })) as Box<dyn warp::Reply>
        })
        .boxed()
}

/// Acceptor for WebSocket clients, served by warp on the tokio runtime
pub struct WebSocketAcceptor {
    acceptor: Acceptor,
    port: u16,
}

impl WebSocketAcceptor {
    /// Binds 0.0.0.0 on the port. Fails if another acceptor in the registry already holds the
    /// port or the socket can't be bound.
    pub fn start(
        port: u16,
        tls: Option<TlsMaterial>,
        registry: &EndpointRegistry,
        event_loop: &EventLoop,
        runtime: &Handle,
        settings: &PipeSettings,
    ) -> Result<Self, Box<dyn Error>> {
        let scheme = if tls.is_some() { "wss" } else { "ws" };
        let endpoint = format!("{}://0.0.0.0:{}", scheme, port);
        let acceptor = Acceptor::new(AcceptorKind::WebSocket, &endpoint, event_loop, settings);
        registry.register_port(port, &acceptor)?;
        let id = acceptor.id();
        let unregister = {
            let registry = registry.clone();
            move || registry.unregister_port(port, id)
        };
        let events = Self::event_handler(&acceptor);
        let filter = websocket_filter(events);
        let socket_addr = SocketAddr::from(([0, 0, 0, 0], port));
        let (shutdown_tx, shutdown_rx) = futures::channel::oneshot::channel::<()>();
        let shutdown = async move {
            shutdown_rx.await.ok();
        };
        // warp needs the runtime's reactor to bind
        let _guard = runtime.enter();
        let server = match tls {
            None => {
                let result = warp::serve(filter).try_bind_with_graceful_shutdown(socket_addr, shutdown);
                match result {
                    Ok((_addr, server)) => server.boxed(),
                    Err(e) => {
                        unregister();
                        return Err(
                            format!("failed to bind WebSocket server to {}: {}", socket_addr, e).into(),
                        );
                    }
                }
            }
            Some(tls) => {
                for path in &[&tls.key_path, &tls.cert_path] {
                    if !Path::new(path).is_file() {
                        unregister();
                        return Err(format!("TLS file {:?} does not exist", path).into());
                    }
                }
                // TlsServer has no try_bind variant, so this panics if the port can't be bound
                let (_addr, server) = warp::serve(filter)
                    .tls()
                    .cert_path(&tls.cert_path)
                    .key_path(&tls.key_path)
                    .bind_with_graceful_shutdown(socket_addr, shutdown);
                server.boxed()
            }
        };
        runtime.spawn(async move {
            server.await;
            trace!("WebSocket server on {} shut down", socket_addr);
        });
        acceptor.on_teardown(move || {
            if shutdown_tx.send(()).is_err() {
                debug!("WebSocket server on {} was already down", socket_addr);
            }
            unregister();
        });
        acceptor.announce_open();
        info!("WebSocket acceptor listening on {}", endpoint);
        Ok(Self { acceptor, port })
    }

    fn event_handler(acceptor: &Acceptor) -> RemoteSender<WsServerEvent> {
        let weak = acceptor.downgrade();
        let mut keys = HashMap::<u64, String>::new();
        acceptor.event_loop().remote(move |event: WsServerEvent| {
            let acceptor = weak.upgrade();
            match event {
                WsServerEvent::Connected {
                    id,
                    remote_address,
                    outbound,
                } => {
                    let acceptor = match acceptor.filter(Acceptor::is_listening) {
                        Some(acceptor) => acceptor,
                        None => {
                            request_close(outbound);
                            return;
                        }
                    };
                    let number = acceptor.next_client_number();
                    let key = number.to_string();
                    let pipe = Pipe::new(
                        TransportKind::WebSocket,
                        PipeSubtype::Server,
                        &format!("ws_server_pipe({})://{}", number, remote_address),
                        acceptor.settings(),
                        WebSocketTransport::new(Some(outbound)),
                    );
                    pipe.set_remote_address(&remote_address);
                    pipe.mark_connected();
                    acceptor.register_client(&key, AcceptorEntry::Single(pipe.clone()));
                    keys.insert(id, key);
                    trace!("{} connected", pipe.describe());
                    acceptor.announce_connection(&pipe);
                }
                WsServerEvent::Message { id, text } => {
                    let key = keys.get(&id).cloned();
                    let pipe = acceptor.zip(key).and_then(|(a, key)| a.server_pipe(&key));
                    if let Some(pipe) = pipe {
                        pipe.receive(Payload::Text(text));
                    }
                }
                WsServerEvent::Closed { id } => {
                    let key = keys.remove(&id);
                    let pipe = acceptor.zip(key).and_then(|(a, key)| a.server_pipe(&key));
                    if let Some(pipe) = pipe {
                        pipe.disconnect();
                    }
                }
            }
        })
    }

    pub fn acceptor(&self) -> &Acceptor {
        &self.acceptor
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Deref for WebSocketAcceptor {
    type Target = Acceptor;

    fn deref(&self) -> &Self::Target {
        &self.acceptor
    }
}
