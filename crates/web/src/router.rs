//! Path routing for controllers, backed by `matchit`.
//!
//! Routes use `matchit` syntax (`/users/{id}`, `/static/{*path}`). One path may
//! carry several items, they are tried in registration order.

use std::collections::HashMap;
use std::fmt;

use tracing::error;

use crate::controller::Controller;
use crate::filter::{self, AllFilter, Filter};

type InnerRouter<T> = matchit::Router<T>;

pub struct Router {
    inner_router: InnerRouter<Vec<RouterItem>>,
}

pub struct RouterItem {
    filter: Box<dyn Filter>,
    controller: Box<dyn Controller>,
}

/// Items registered for a matched path, with the captured path parameters.
#[derive(Debug)]
pub struct RouteResult<'router> {
    router_items: &'router [RouterItem],
    params: Vec<(String, String)>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn at(&self, path: &str) -> RouteResult<'_> {
        match self.inner_router.at(path) {
            Ok(matched) => RouteResult {
                router_items: matched.value.as_slice(),
                params: matched.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect(),
            },
            Err(_not_found) => RouteResult::empty(),
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

impl RouterItem {
    pub fn filter(&self) -> &dyn Filter {
        self.filter.as_ref()
    }

    pub fn controller(&self) -> &dyn Controller {
        self.controller.as_ref()
    }
}

impl fmt::Debug for RouterItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterItem").finish_non_exhaustive()
    }
}

impl<'router> RouteResult<'router> {
    fn empty() -> Self {
        Self { router_items: &[], params: Vec::new() }
    }

    /// True when no route matched the path at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.router_items.is_empty()
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn router_items(&self) -> &'router [RouterItem] {
        self.router_items
    }
}

#[derive(Debug, Default)]
pub struct RouterBuilder {
    data: HashMap<String, Vec<RouterItemBuilder>>,
}

impl RouterBuilder {
    fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn route(mut self, route: impl Into<String>, item_builder: RouterItemBuilder) -> Self {
        self.data.entry(route.into()).or_default().push(item_builder);
        self
    }

    /// Builds the router, skipping routes `matchit` refuses.
    pub fn build(self) -> Router {
        let mut inner_router = InnerRouter::new();

        for (path, items) in self.data {
            let router_items = items.into_iter().map(RouterItemBuilder::build).collect::<Vec<_>>();
            if let Err(e) = inner_router.insert(path.as_str(), router_items) {
                error!(path = %path, cause = %e, "invalid route");
            }
        }

        Router { inner_router }
    }
}

macro_rules! method_router_filter {
    ($method:ident, $method_name:ident) => {
        pub fn $method<C: Controller + 'static>(controller: C) -> RouterItemBuilder {
            let mut filters = filter::all_filter();
            filters.and(filter::$method_name());
            RouterItemBuilder { filters, controller: Box::new(controller) }
        }
    };
}

method_router_filter!(get, get_method);
method_router_filter!(post, post_method);
method_router_filter!(put, put_method);
method_router_filter!(delete, delete_method);
method_router_filter!(head, head_method);
method_router_filter!(options, options_method);
method_router_filter!(connect, connect_method);
method_router_filter!(patch, patch_method);
method_router_filter!(trace, trace_method);

/// An item serving every method.
pub fn any<C: Controller + 'static>(controller: C) -> RouterItemBuilder {
    RouterItemBuilder { filters: filter::all_filter(), controller: Box::new(controller) }
}

pub struct RouterItemBuilder {
    filters: AllFilter,
    controller: Box<dyn Controller>,
}

impl RouterItemBuilder {
    #[must_use]
    pub fn with<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filters.and(filter);
        self
    }

    fn build(self) -> RouterItem {
        RouterItem { filter: Box::new(self.filters), controller: self.controller }
    }
}

impl fmt::Debug for RouterItemBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterItemBuilder").field("filters", &self.filters).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;
    use http::header::CONTENT_TYPE;
    use micro_reactor::protocol::http::{HttpRequest, HttpResponse, Method};

    use super::*;
    use crate::controller::sync_controller_fn;
    use crate::filter::header;

    fn hello() -> impl Controller {
        sync_controller_fn(|_request: HttpRequest| HttpResponse::new())
    }

    fn router() -> Router {
        Router::builder()
            .route("/", get(hello()))
            .route(
                "/",
                post(hello()).with(header(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"))),
            )
            .route("/", post(hello()))
            .route("/users/{id}", get(hello()))
            .build()
    }

    #[test]
    fn route_get() {
        let router = router();
        let route_result = router.at("/");
        assert!(route_result.params().is_empty());

        let items = route_result.router_items();
        assert_eq!(items.len(), 3);

        let request = HttpRequest::new(Method::Get, "/");
        assert!(items[0].filter().check(&request));
        assert!(!items[1].filter().check(&request));
        assert!(!items[2].filter().check(&request));
    }

    #[test]
    fn route_post() {
        let router = router();
        let items = router.at("/").router_items();

        let mut request = HttpRequest::new(Method::Post, "/");
        assert!(!items[0].filter().check(&request));
        assert!(!items[1].filter().check(&request));
        assert!(items[2].filter().check(&request));

        request.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"));
        assert!(items[1].filter().check(&request));
    }

    #[test]
    fn route_params_and_misses() {
        let router = router();
        let route_result = router.at("/users/42");
        assert_eq!(route_result.router_items().len(), 1);
        assert_eq!(route_result.params(), &[("id".to_owned(), "42".to_owned())]);

        assert!(router.at("/missing").is_empty());
    }
}
