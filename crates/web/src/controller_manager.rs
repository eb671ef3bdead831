use std::sync::Arc;

use http::{HeaderValue, header};
use micro_reactor::config::{DEFAULT_SERVER_NAME, ServerConfig};
use micro_reactor::event::EventQueue;
use micro_reactor::protocol::http::{HttpRequest, HttpResponse, RequestCallback, Responder};
use tracing::{debug, error};

use crate::router::Router;

/// Routes completed requests to controllers and writes their responses back.
///
/// Controller promises settle on the manager's own queue, so responses are
/// only sent while someone calls [`poll`](ControllerManager::poll).
#[derive(Debug)]
pub struct ControllerManager {
    router: Router,
    queue: EventQueue,
    server_name: HeaderValue,
}

impl ControllerManager {
    pub fn new(router: Router, config: &ServerConfig) -> Self {
        let server_name = HeaderValue::from_str(config.get_server_name())
            .unwrap_or_else(|_invalid| HeaderValue::from_static(DEFAULT_SERVER_NAME));
        Self { router, queue: EventQueue::new(), server_name }
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Runs queued continuations until the queue is empty, returns false when none ran.
    pub fn poll(&self) -> bool {
        self.queue.poll()
    }

    /// The callback handed to every HTTP session handler.
    pub fn into_callback(self: Arc<Self>) -> RequestCallback {
        Arc::new(move |request: HttpRequest, responder: Responder| self.serve_request(request, responder))
    }

    /// Serves one request.
    ///
    /// The first item under the matched path whose filter accepts the request
    /// serves it. A path nobody registered is answered with `404`, a path whose
    /// items all refuse the request with `405`, a failed promise with `500`.
    pub fn serve_request(&self, mut request: HttpRequest, responder: Responder) {
        let route_result = self.router.at(request.path());
        if route_result.is_empty() {
            debug!(path = request.path(), "no controller for path");
            send(&responder, HttpResponse::not_found(request.path()), &self.server_name);
            return;
        }

        for (key, value) in route_result.params() {
            request.params_mut().insert(key.clone(), value.clone());
        }

        let Some(item) = route_result.router_items().iter().find(|item| item.filter().check(&request)) else {
            debug!(method = %request.method(), path = request.path(), "no controller accepts the request");
            send(&responder, HttpResponse::method_not_allowed(request.method(), request.path()), &self.server_name);
            return;
        };

        let path = request.path().to_owned();
        let on_failure = responder.clone();
        let server_name = self.server_name.clone();
        let failure_server_name = self.server_name.clone();

        item.controller()
            .service(request, &self.queue)
            .then(move |response| {
                send(&responder, response, &server_name);
                Ok(())
            })
            .except(move |e| {
                error!(path = %path, cause = %e, "controller failed");
                send(&on_failure, HttpResponse::internal_error(&path, &e), &failure_server_name);
            });
    }
}

fn send(responder: &Responder, mut response: HttpResponse, server_name: &HeaderValue) {
    response.headers_mut().insert(header::SERVER, server_name.clone());
    if !responder.send(&response) {
        debug!(status = %response.status(), "connection is gone, response dropped");
    }
}
