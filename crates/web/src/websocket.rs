//! WebSocket routes and the upgrade of HTTP connections.
//!
//! A [`WebsocketController`] creates one [`WebsocketListener`] per accepted
//! upgrade. [`WebsocketControllerManager`] is the [`Upgrader`] of the HTTP
//! session handlers: it answers the handshake and moves the session to the
//! WebSocket reactor.

use std::fmt;

use micro_reactor::buffer::BufferWriter;
use micro_reactor::config::ServerConfig;
use micro_reactor::event::EventQueue;
use micro_reactor::network::{Handoff, Session};
use micro_reactor::protocol::http::{HttpRequest, Upgrader};
use micro_reactor::protocol::websocket::{WebsocketListener, WebsocketSessionHandler, handshake};
use tracing::{error, info, warn};

pub trait WebsocketController: Send + Sync {
    /// Called on the HTTP reactor thread for every upgraded connection.
    ///
    /// `queue` is polled by the WebSocket reactor thread, listeners may use it
    /// to run promise continuations there.
    fn create_listener(&self, request: &HttpRequest, queue: &EventQueue) -> Box<dyn WebsocketListener>;
}

pub struct FnWebsocketController<F>(F);

impl<F> fmt::Debug for FnWebsocketController<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWebsocketController").finish_non_exhaustive()
    }
}

pub fn websocket_fn<F>(f: F) -> FnWebsocketController<F>
where
    F: Fn(&HttpRequest, &EventQueue) -> Box<dyn WebsocketListener> + Send + Sync,
{
    FnWebsocketController(f)
}

impl<F> WebsocketController for FnWebsocketController<F>
where
    F: Fn(&HttpRequest, &EventQueue) -> Box<dyn WebsocketListener> + Send + Sync,
{
    fn create_listener(&self, request: &HttpRequest, queue: &EventQueue) -> Box<dyn WebsocketListener> {
        (self.0)(request, queue)
    }
}

pub struct WebsocketRouter {
    inner_router: matchit::Router<Box<dyn WebsocketController>>,
}

impl WebsocketRouter {
    pub fn builder() -> WebsocketRouterBuilder {
        WebsocketRouterBuilder::default()
    }

    pub fn at(&self, path: &str) -> Option<&dyn WebsocketController> {
        self.inner_router.at(path).ok().map(|matched| matched.value.as_ref())
    }
}

impl fmt::Debug for WebsocketRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebsocketRouter").finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct WebsocketRouterBuilder {
    routes: Vec<(String, Box<dyn WebsocketController>)>,
}

impl WebsocketRouterBuilder {
    #[must_use]
    pub fn route<C: WebsocketController + 'static>(mut self, route: impl Into<String>, controller: C) -> Self {
        self.routes.push((route.into(), Box::new(controller)));
        self
    }

    /// Builds the router, skipping routes `matchit` refuses.
    pub fn build(self) -> WebsocketRouter {
        let mut inner_router = matchit::Router::new();
        for (path, controller) in self.routes {
            if let Err(e) = inner_router.insert(path.as_str(), controller) {
                error!(path = %path, cause = %e, "invalid websocket route");
            }
        }
        WebsocketRouter { inner_router }
    }
}

impl fmt::Debug for WebsocketRouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let paths: Vec<_> = self.routes.iter().map(|(path, _)| path.as_str()).collect();
        f.debug_struct("WebsocketRouterBuilder").field("routes", &paths).finish()
    }
}

/// Accepts upgrade requests for registered paths and hands the connections to
/// the WebSocket reactor.
#[derive(Debug)]
pub struct WebsocketControllerManager {
    router: WebsocketRouter,
    queue: EventQueue,
    handoff: Handoff,
    config: ServerConfig,
}

impl WebsocketControllerManager {
    /// `handoff` is the inbound queue of the reactor serving upgraded sessions.
    pub fn new(router: WebsocketRouter, handoff: Handoff, config: &ServerConfig) -> Self {
        Self { router, queue: EventQueue::new(), handoff, config: config.clone() }
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Runs queued continuations until the queue is empty, returns false when none ran.
    pub fn poll(&self) -> bool {
        self.queue.poll()
    }
}

impl Upgrader for WebsocketControllerManager {
    fn accepts(&self, request: &HttpRequest) -> bool {
        self.router.at(request.path()).is_some() && handshake::is_upgrade_request(request)
    }

    fn upgrade(&self, request: HttpRequest, mut session: Session) {
        let (Some(controller), Some(client_key)) =
            (self.router.at(request.path()), request.header(http::header::SEC_WEBSOCKET_KEY.as_str()))
        else {
            warn!(peer = %session.peer_addr(), path = request.path(), "dropping connection with an incomplete upgrade");
            return;
        };

        let response = handshake::upgrade_response(client_key, &self.config);
        response.serialize_to(&mut BufferWriter::new(session.output_mut()));

        info!(peer = %session.peer_addr(), path = request.path(), "websocket connection upgraded");
        let listener = controller.create_listener(&request, &self.queue);
        let handler = WebsocketSessionHandler::new(session, listener, self.config.get_max_fragment_size());
        self.handoff.push(Box::new(handler));
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use http::{HeaderValue, header};
    use micro_reactor::buffer::BufferReader;
    use micro_reactor::network::SessionHandler;
    use micro_reactor::protocol::http::Method;
    use micro_reactor::protocol::websocket::WebsocketWriter;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    struct Echo;

    impl WebsocketListener for Echo {
        fn on_text(&mut self, writer: &mut WebsocketWriter<'_>, text: &str) {
            writer.send_text(text);
        }

        fn on_binary(&mut self, writer: &mut WebsocketWriter<'_>, data: &[u8]) {
            writer.send_binary(data);
        }
    }

    fn upgrade_request(path: &str) -> HttpRequest {
        let mut request = HttpRequest::new(Method::Get, path);
        let headers = request.headers_mut();
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::SEC_WEBSOCKET_KEY, HeaderValue::from_static("dGhlIHNhbXBsZSBub25jZQ=="));
        request
    }

    fn manager(created: Arc<Mutex<Vec<String>>>) -> (WebsocketControllerManager, Handoff) {
        let router = WebsocketRouter::builder()
            .route(
                "/echo",
                websocket_fn(move |request: &HttpRequest, _queue: &EventQueue| -> Box<dyn WebsocketListener> {
                    created.lock().push(request.path().to_owned());
                    Box::new(Echo)
                }),
            )
            .build();
        let handoff = Handoff::new();
        (WebsocketControllerManager::new(router, handoff.clone(), &ServerConfig::new()), handoff)
    }

    #[test]
    fn accepts_only_registered_upgrades() {
        let (manager, _handoff) = manager(Arc::default());
        assert!(manager.accepts(&upgrade_request("/echo")));
        assert!(!manager.accepts(&upgrade_request("/other")));
        assert!(!manager.accepts(&HttpRequest::new(Method::Get, "/echo")));
    }

    #[test]
    fn upgrade_answers_and_hands_off() {
        let created = Arc::default();
        let (manager, handoff) = manager(Arc::clone(&created));
        let session = Session::detached(SocketAddr::from(([127, 0, 0, 1], 8000)), 64);

        manager.upgrade(upgrade_request("/echo"), session);
        assert_eq!(*created.lock(), vec!["/echo".to_owned()]);

        let mut handlers = handoff.drain();
        assert_eq!(handlers.len(), 1);
        let mut handler = handlers.pop_front().unwrap();
        let output = handler.session_mut().unwrap().output_mut();

        let mut written = vec![0u8; output.len()];
        BufferReader::new(output).get_bytes(&mut written);
        let wire = String::from_utf8(written).unwrap();
        assert!(wire.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(wire.contains("sec-websocket-accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(handler.session().unwrap().is_timeout_suspended());
    }
}
