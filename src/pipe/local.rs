use super::*;
use super::direct::linked_pair;

/// Connects to the local acceptor registered on the endpoint (the default endpoint if None).
/// Both ends are connected right away; "open" on both and "connection" on the acceptor follow on
/// the next tick.
pub fn connect_local(
    registry: &EndpointRegistry,
    endpoint: Option<&str>,
) -> Result<Pipe, Box<dyn Error>> {
    let endpoint = endpoint
        .filter(|endpoint| !endpoint.is_empty())
        .unwrap_or(DEFAULT_LOCAL_ENDPOINT);
    let acceptor = registry
        .local(endpoint)
        .ok_or_else(|| PipeError::NoSuchServer(endpoint.to_string()))?;
    let port = acceptor.next_client_number();
    let (server, client) = linked_pair(
        TransportKind::Local,
        (
            &format!("local_server_pipe://{}:{}", endpoint, port),
            &format!("local_client_pipe://{}:{}", endpoint, port),
        ),
        (PipeSubtype::Server, PipeSubtype::Client),
        acceptor.settings(),
    );
    server.set_remote_address(&client.url());
    client.set_remote_address(&server.url());
    acceptor.register_client(
        &port.to_string(),
        AcceptorEntry::Pair {
            server: server.clone(),
            client: client.clone(),
        },
    );
    acceptor.announce_connection(&server);
    let deferred_client = client.downgrade();
    acceptor.event_loop().defer(move || {
        if let Some(client) = deferred_client.upgrade() {
            if client.is_connected() {
                client.emit_open();
            }
        }
    });
    Ok(client)
}
