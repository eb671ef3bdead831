use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use micro_reactor::config::ServerConfig;
use micro_reactor::event::EventQueue;
use micro_reactor::network::{Reactor, Session, SessionHandler};
use micro_reactor::protocol::http::{HttpSessionHandler, Upgrader};
use thiserror::Error;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::controller_manager::ControllerManager;
use crate::router::Router;
use crate::websocket::{WebsocketControllerManager, WebsocketRouter};

#[derive(Debug)]
pub struct ServerBuilder {
    address: Option<io::Result<Vec<SocketAddr>>>,
    router: Option<Router>,
    websocket_router: Option<WebsocketRouter>,
    config: ServerConfig,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { address: None, router: None, websocket_router: None, config: ServerConfig::default() }
    }

    #[must_use]
    pub fn bind<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = Some(address.to_socket_addrs().map(Iterator::collect));
        self
    }

    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    #[must_use]
    pub fn websocket_router(mut self, websocket_router: WebsocketRouter) -> Self {
        self.websocket_router = Some(websocket_router);
        self
    }

    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Creates both reactors and binds the listening socket.
    pub fn build(self) -> Result<Server, ServerBuildError> {
        let router = self.router.ok_or(ServerBuildError::MissingRouter)?;
        let addresses = self.address.ok_or(ServerBuildError::MissingAddress)?.map_err(ServerBuildError::invalid_address)?;
        let websocket_router = self.websocket_router.unwrap_or_else(|| WebsocketRouter::builder().build());
        let config = self.config;

        let mut websocket_reactor = Reactor::with_config(&config).map_err(ServerBuildError::bind)?;
        // upgraded connections are long lived
        websocket_reactor.set_connection_timeout(None);

        let websockets = Arc::new(WebsocketControllerManager::new(websocket_router, websocket_reactor.handoff(), &config));
        let controllers = Arc::new(ControllerManager::new(router, &config));

        let mut last_error = None;
        for address in addresses {
            let callback = Arc::clone(&controllers).into_callback();
            let upgrader: Arc<dyn Upgrader> = Arc::<WebsocketControllerManager>::clone(&websockets);
            let allocator = move |session: Session| -> Box<dyn SessionHandler> {
                Box::new(HttpSessionHandler::new(session, Arc::clone(&callback)).with_upgrader(Arc::clone(&upgrader)))
            };

            match Reactor::bind(address, allocator, &config) {
                Ok(http_reactor) => {
                    return Ok(Server {
                        http_reactor,
                        websocket_reactor,
                        controllers,
                        websockets,
                        config,
                        running: Arc::new(AtomicBool::new(true)),
                    });
                }
                Err(e) => {
                    warn!(%address, cause = %e, "failed to bind");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => ServerBuildError::bind(e),
            None => ServerBuildError::MissingAddress,
        })
    }
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("router must be set")]
    MissingRouter,
    #[error("address must be set")]
    MissingAddress,
    #[error("invalid address: {source}")]
    InvalidAddress {
        #[source]
        source: io::Error,
    },
    #[error("failed to set up the reactors: {source}")]
    Bind {
        #[source]
        source: io::Error,
    },
}

impl ServerBuildError {
    fn invalid_address(source: io::Error) -> Self {
        Self::InvalidAddress { source }
    }

    fn bind(source: io::Error) -> Self {
        Self::Bind { source }
    }
}

/// Stops a dispatching [`Server`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Both loops finish their current pass and return.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Two reactors: HTTP on the dispatching thread, WebSocket on its own thread.
///
/// Upgraded connections move from the first to the second through the
/// WebSocket reactor's hand-off queue.
#[derive(Debug)]
pub struct Server {
    http_reactor: Reactor,
    websocket_reactor: Reactor,
    controllers: Arc<ControllerManager>,
    websockets: Arc<WebsocketControllerManager>,
    config: ServerConfig,
    running: Arc<AtomicBool>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.http_reactor.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { running: Arc::clone(&self.running) }
    }

    /// Installs the global fmt subscriber, then dispatches.
    pub fn start(self) -> io::Result<()> {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            warn!(cause = %e, "keeping the existing subscriber");
        }
        self.dispatch()
    }

    /// Runs both reactors until shut down or until one fails.
    pub fn dispatch(self) -> io::Result<()> {
        let Server { http_reactor, websocket_reactor, controllers, websockets, config, running } = self;
        let idle_sleep = config.get_idle_sleep();
        info!(address = ?http_reactor.local_addr(), "start dispatching");

        let websocket_queue = websockets.queue().clone();
        let websocket_running = Arc::clone(&running);
        let websocket_thread = thread::Builder::new().name("websocket-reactor".into()).spawn(move || {
            let result = run(websocket_reactor, &websocket_queue, &websocket_running, idle_sleep);
            if let Err(e) = &result {
                error!(cause = %e, "websocket reactor failed");
                websocket_running.store(false, Ordering::Release);
            }
            result
        })?;

        let result = run(http_reactor, controllers.queue(), &running, idle_sleep);
        if let Err(e) = &result {
            error!(cause = %e, "http reactor failed");
        }
        running.store(false, Ordering::Release);

        let websocket_result = websocket_thread
            .join()
            .unwrap_or_else(|_panic| Err(io::Error::other("websocket reactor panicked")));
        info!("server stopped");
        result.and(websocket_result)
    }
}

/// One reactor loop: poll I/O, then run queued continuations, back off when idle.
fn run(mut reactor: Reactor, queue: &EventQueue, running: &AtomicBool, idle_sleep: Duration) -> io::Result<()> {
    while running.load(Ordering::Acquire) {
        reactor.loop_once()?;

        let mut polled = false;
        while queue.poll() {
            polled = true;
        }

        if reactor.is_idle() && !polled {
            thread::sleep(idle_sleep);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::sync_controller_fn;
    use crate::router::get;
    use micro_reactor::protocol::http::{HttpRequest, HttpResponse};

    fn router() -> Router {
        Router::builder().route("/", get(sync_controller_fn(|_request: HttpRequest| HttpResponse::new()))).build()
    }

    #[test]
    fn build_requires_router_and_address() {
        let missing_router = Server::builder().bind("127.0.0.1:0").build();
        assert!(matches!(missing_router, Err(ServerBuildError::MissingRouter)));

        let missing_address = Server::builder().router(router()).build();
        assert!(matches!(missing_address, Err(ServerBuildError::MissingAddress)));

        let invalid = Server::builder().router(router()).bind("not an address").build();
        assert!(matches!(invalid, Err(ServerBuildError::InvalidAddress { .. })));
    }

    #[test]
    fn build_binds_ephemeral_port() {
        let server = Server::builder().router(router()).bind("127.0.0.1:0").build().unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let handle = server.shutdown_handle();
        assert!(handle.is_running());
        handle.shutdown();
        assert!(!handle.is_running());
        server.dispatch().unwrap();
    }
}
