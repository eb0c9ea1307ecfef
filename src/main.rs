#[macro_use]
extern crate log;

use cool_socket::*;
use std::error::Error;

/// Everything the process hosts, disposed together on shutdown
struct Services {
    signaling: Option<(WebSocketAcceptor, SignalingServer, SignalingManager)>,
    echo: Option<(WebSocketAcceptor, RpcServer)>,
}

impl Services {
    fn start(
        conf: &MasterConfig,
        event_loop: &EventLoop,
        runtime: &tokio::runtime::Handle,
    ) -> Result<Self, Box<dyn Error>> {
        let registry = EndpointRegistry::new();
        let signaling = if conf.net.signaling_server {
            let acceptor = WebSocketAcceptor::start(
                conf.net.signaling_port,
                conf.net.tls.clone(),
                &registry,
                event_loop,
                runtime,
                &conf.pipe,
            )?;
            let manager = SignalingManager::new(conf.space_defaults());
            let server = SignalingServer::new(&acceptor, &manager, &conf.discovery);
            info!("signaling server listening at {}", conf.rtc.default_signaling_url);
            Some((acceptor, server, manager))
        } else {
            None
        };
        let echo = if conf.net.echo_server {
            let acceptor = WebSocketAcceptor::start(
                conf.net.ws_port,
                conf.net.tls.clone(),
                &registry,
                event_loop,
                runtime,
                &conf.pipe,
            )?;
            let server = RpcServer::new(&acceptor);
            server.register_rc("echo", echo_handler());
            info!("echo server listening on port {}", conf.net.ws_port);
            Some((acceptor, server))
        } else {
            None
        };
        Ok(Self { signaling, echo })
    }

    fn dispose(self) {
        if let Some((acceptor, server)) = self.echo {
            server.dispose();
            acceptor.dispose();
        }
        if let Some((acceptor, server, manager)) = self.signaling {
            server.dispose();
            acceptor.dispose();
            manager.dispose();
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let conf = build_config(std::env::args().collect())?;
    if conf.happy_exit {
        if let Some(help) = &conf.help {
            println!("{}", help);
        }
        return Ok(());
    }
    trace!("{:#?}", conf);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let event_loop = EventLoop::new();
    let services = Services::start(&conf, &event_loop, runtime.handle())?;
    if services.signaling.is_none() && services.echo.is_none() {
        warn!("neither signaling_server nor echo_server is enabled, nothing to do");
    }

    let stop = event_loop.stop_handle();
    ctrlc::set_handler(move || {
        info!("interrupted, shutting down");
        stop.stop();
    })?;
    event_loop.run();

    services.dispose();
    event_loop.run_ready();
    runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    info!("stopped");
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}
