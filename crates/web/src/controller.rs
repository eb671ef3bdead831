//! Request controllers.
//!
//! A [`Controller`] answers a request with a [`Promise`] of the response. It may
//! resolve the promise right away or hand the resolver to another thread, the
//! response is written back once the promise settles on the manager's queue.

use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};

use micro_reactor::event::{EventQueue, Promise, panic_message};
use micro_reactor::protocol::http::{HttpRequest, HttpResponse};

pub trait Controller: Send + Sync {
    fn service(&self, request: HttpRequest, queue: &EventQueue) -> Promise<HttpResponse>;
}

/// A closure holder usable as a [`Controller`].
pub struct FnController<F, Args> {
    f: F,
    _phantom: PhantomData<fn(Args)>,
}

impl<F, Args> FnController<F, Args> {
    fn new(f: F) -> Self {
        Self { f, _phantom: PhantomData }
    }
}

impl<F, Args> fmt::Debug for FnController<F, Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnController").finish_non_exhaustive()
    }
}

/// Wraps `f(request, queue) -> Promise<HttpResponse>` as a controller.
pub fn controller_fn<F>(f: F) -> FnController<F, (HttpRequest, EventQueue)>
where
    F: Fn(HttpRequest, &EventQueue) -> Promise<HttpResponse> + Send + Sync,
{
    FnController::new(f)
}

/// Wraps a synchronous `f(request) -> HttpResponse` as a controller.
///
/// A panic inside `f` fails the returned promise instead of unwinding into
/// the reactor.
pub fn sync_controller_fn<F>(f: F) -> FnController<F, HttpRequest>
where
    F: Fn(HttpRequest) -> HttpResponse + Send + Sync,
{
    FnController::new(f)
}

impl<F> Controller for FnController<F, (HttpRequest, EventQueue)>
where
    F: Fn(HttpRequest, &EventQueue) -> Promise<HttpResponse> + Send + Sync,
{
    fn service(&self, request: HttpRequest, queue: &EventQueue) -> Promise<HttpResponse> {
        (self.f)(request, queue)
    }
}

impl<F> Controller for FnController<F, HttpRequest>
where
    F: Fn(HttpRequest) -> HttpResponse + Send + Sync,
{
    fn service(&self, request: HttpRequest, queue: &EventQueue) -> Promise<HttpResponse> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.f)(request))) {
            Ok(response) => Promise::ready(queue, response),
            Err(payload) => Promise::rejected(queue, format!("controller panicked: {}", panic_message(payload.as_ref()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use micro_reactor::event::PromiseState;
    use micro_reactor::protocol::http::Method;

    use super::*;

    fn assert_is_controller<C: Controller>(_controller: &C) {
        // no op
    }

    #[test]
    fn closures_are_controllers() {
        let deferred = controller_fn(|_request: HttpRequest, queue: &EventQueue| Promise::ready(queue, HttpResponse::new()));
        assert_is_controller(&deferred);

        let immediate = sync_controller_fn(|request: HttpRequest| {
            let mut response = HttpResponse::new();
            response.write_body(request.path());
            response
        });
        assert_is_controller(&immediate);
    }

    #[test]
    fn sync_controller_resolves_on_poll() {
        let queue = EventQueue::new();
        let controller = sync_controller_fn(|request: HttpRequest| {
            let mut response = HttpResponse::new();
            response.write_body(request.path());
            response
        });

        let (tx, rx) = mpsc::channel();
        let promise = controller.service(HttpRequest::new(Method::Get, "/echo"), &queue);
        assert_eq!(promise.state(), PromiseState::Pending);
        promise.then(move |response| Ok(tx.send(response.body().to_vec())?));

        assert!(rx.try_recv().is_err());
        queue.poll();
        assert_eq!(rx.try_recv().unwrap(), b"/echo");
    }

    #[test]
    fn sync_controller_panic_fails_promise() {
        let queue = EventQueue::new();
        let controller = sync_controller_fn(|_request: HttpRequest| -> HttpResponse { panic!("app bug") });

        let (tx, rx) = mpsc::channel();
        controller.service(HttpRequest::new(Method::Get, "/boom"), &queue).except(move |e| tx.send(e.to_string()).unwrap());

        queue.poll();
        assert_eq!(rx.try_recv().unwrap(), "controller panicked: app bug");
    }
}
