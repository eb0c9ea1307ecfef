use super::*;
use futures::{SinkExt, StreamExt};
use tokio::{runtime::Handle, sync::mpsc};
use tokio_tungstenite::tungstenite::Message;

/// Max number of in-flight outbound messages per connection
pub(crate) const OUTBOUND_BUFFER_SIZE: usize = 1000;

/// What the event loop hands to the task servicing a socket
#[derive(Debug)]
pub enum WsOutbound {
    Text(String),
    Close,
}

/// Transport of both WebSocket pipe ends. The outbound queue is attached once the socket is
/// up; a tokio task drains it into the socket.
pub struct WebSocketTransport {
    outbound: RefCell<Option<mpsc::Sender<WsOutbound>>>,
}

impl WebSocketTransport {
    pub fn new(outbound: Option<mpsc::Sender<WsOutbound>>) -> Rc<Self> {
        Rc::new(Self {
            outbound: RefCell::new(outbound),
        })
    }

    pub fn attach(&self, outbound: mpsc::Sender<WsOutbound>) {
        *self.outbound.borrow_mut() = Some(outbound);
    }
}

/// Asks the socket task to close. When the queue is full the sender is dropped instead, so
/// the task still stops once it has drained what was queued.
pub(crate) fn request_close(outbound: mpsc::Sender<WsOutbound>) {
    match outbound.try_send(WsOutbound::Close) {
        Ok(()) => (),
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!("WebSocket outbound queue full, closing by dropping the sender");
            drop(outbound);
        }
        Err(mpsc::error::TrySendError::Closed(_)) => trace!("WebSocket task already gone"),
    }
}

impl Transport for WebSocketTransport {
    fn transmit(&self, _: &Pipe, text: String) -> Result<(), Box<dyn Error>> {
        let outbound = self.outbound.borrow();
        let outbound = match &*outbound {
            Some(outbound) => outbound,
            None => return Err("Cannot send messages to disconnected web socket pipe".into()),
        };
        match outbound.try_send(WsOutbound::Text(text)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(PipeError::ChannelFull("WebSocket".to_string()).into())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(PipeError::ChannelClosed("WebSocket".to_string()).into())
            }
        }
    }

    fn teardown(&self, _: &Pipe) {
        if let Some(outbound) = self.outbound.borrow_mut().take() {
            request_close(outbound);
        }
    }
}

/// Forwards queued text into the socket until Close, a send error or the queue ending
pub(crate) async fn drain_outbound<S, M>(
    sink: &mut S,
    outbound_rx: &mut mpsc::Receiver<WsOutbound>,
    to_message: impl Fn(String) -> M,
    peer: &str,
) where
    S: futures::Sink<M> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(outbound) = outbound_rx.recv().await {
        match outbound {
            WsOutbound::Text(text) => {
                if let Err(e) = sink.send(to_message(text)).await {
                    warn!("sending to {}: {}", peer, e);
                    return;
                }
            }
            WsOutbound::Close => return,
        }
    }
}

#[derive(Debug)]
enum WsClientEvent {
    Connected(mpsc::Sender<WsOutbound>),
    Failed(String),
    Message(String),
    Closed,
}

fn deliver(events: &RemoteSender<WsClientEvent>, event: WsClientEvent) -> bool {
    events.send(event).is_ok()
}

async fn run_client_socket(url: String, events: RemoteSender<WsClientEvent>) {
    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            deliver(&events, WsClientEvent::Failed(format!("connecting to {}: {}", url, e)));
            return;
        }
    };
    let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_BUFFER_SIZE);
    if !deliver(&events, WsClientEvent::Connected(outbound_tx)) {
        return;
    }
    let (mut tx, mut rx) = stream.split();
    let send = drain_outbound(&mut tx, &mut outbound_rx, Message::Text, &url);
    let receive = async {
        while let Some(result) = rx.next().await {
            let delivered = match result {
                Ok(Message::Text(text)) => deliver(&events, WsClientEvent::Message(text)),
                Ok(Message::Binary(data)) => deliver(
                    &events,
                    WsClientEvent::Message(String::from_utf8_lossy(&data).into_owned()),
                ),
                Ok(Message::Close(_)) => false,
                Ok(_) => true,
                Err(e) => {
                    debug!("receiving from {}: {}", url, e);
                    false
                }
            };
            if !delivered {
                break;
            }
        }
    };
    tokio::select! {
        _ = send => (),
        _ = receive => (),
    };
    deliver(&events, WsClientEvent::Closed);
    if let Ok(mut stream) = tx.reunite(rx) {
        if let Err(e) = stream.close(None).await {
            trace!("closing WebSocket to {}: {}", url, e);
        }
    }
}

struct ClientContext {
    url: String,
    event_loop: EventLoop,
    runtime: Handle,
    reconnect_after: Duration,
}

fn start_attempt(context: Rc<ClientContext>, pipe: WeakPipe, transport: Weak<WebSocketTransport>) {
    let handler_context = context.clone();
    let attempt_transport = transport.clone();
    let events = context.event_loop.remote(move |event: WsClientEvent| {
        let transport = &attempt_transport;
        let pipe = match pipe.upgrade() {
            Some(pipe) if !pipe.is_disposed() => pipe,
            _ => {
                if let WsClientEvent::Connected(outbound) = event {
                    request_close(outbound);
                }
                return;
            }
        };
        match event {
            WsClientEvent::Connected(outbound) => match transport.upgrade() {
                Some(transport) => {
                    transport.attach(outbound);
                    if pipe.mark_connected() {
                        trace!("{} connected", pipe.describe());
                        pipe.emit_open();
                    }
                }
                None => request_close(outbound),
            },
            WsClientEvent::Failed(reason) => {
                debug!("{}: {}", pipe.describe(), reason);
                pipe.emit_error(&reason);
                let context = handler_context.clone();
                if context.reconnect_after > Duration::from_millis(0) && !pipe.is_disposed() {
                    let pipe = pipe.downgrade();
                    let transport = transport.clone();
                    let delay = context.reconnect_after;
                    context.event_loop.clone().schedule(delay, move || {
                        start_attempt(context, pipe, transport);
                    });
                }
            }
            WsClientEvent::Message(text) => pipe.receive(Payload::Text(text)),
            WsClientEvent::Closed => pipe.disconnect(),
        }
    });
    if transport.strong_count() > 0 {
        context
            .runtime
            .spawn(run_client_socket(context.url.clone(), events));
    } else {
        trace!("not connecting to {}, pipe is gone", context.url);
    }
}

/// Client side of a WebSocket connection
pub struct WebSocketClientPipe;

impl WebSocketClientPipe {
    /// Starts connecting in the background. The pipe emits "open" once connected, or "error"
    /// for each failed attempt; attempts are repeated after settings.ws_reconnect_after until
    /// one succeeds or the pipe is disposed.
    pub fn connect(
        url: &str,
        event_loop: &EventLoop,
        runtime: &Handle,
        settings: &PipeSettings,
    ) -> Result<Pipe, Box<dyn Error>> {
        let host = url
            .strip_prefix("ws://")
            .or_else(|| url.strip_prefix("wss://"));
        if host.map_or(true, str::is_empty) {
            return Err(PipeError::BadUrl(url.to_string()).into());
        }
        let transport = WebSocketTransport::new(None);
        let pipe = Pipe::new(
            TransportKind::WebSocket,
            PipeSubtype::Client,
            &format!("ws_client_pipe-{}", url),
            settings,
            transport.clone(),
        );
        pipe.set_remote_address(url);
        let context = Rc::new(ClientContext {
            url: url.to_string(),
            event_loop: event_loop.clone(),
            runtime: runtime.clone(),
            reconnect_after: settings.ws_reconnect_after,
        });
        start_attempt(context, pipe.downgrade(), Rc::downgrade(&transport));
        Ok(pipe)
    }
}
