//! Predicates deciding whether a route item serves a request.
//!
//! Several items may share one path, the first whose filter accepts the
//! request serves it.

use http::{HeaderName, HeaderValue};
use micro_reactor::protocol::http::{HttpRequest, Method};

pub trait Filter: Send + Sync {
    fn check(&self, request: &HttpRequest) -> bool;
}

struct FnFilter<F: Fn(&HttpRequest) -> bool>(F);

impl<F: Fn(&HttpRequest) -> bool + Send + Sync> Filter for FnFilter<F> {
    fn check(&self, request: &HttpRequest) -> bool {
        (self.0)(request)
    }
}

pub fn fn_filter<F>(f: F) -> impl Filter
where
    F: Fn(&HttpRequest) -> bool + Send + Sync,
{
    FnFilter(f)
}

pub fn always() -> TrueFilter {
    TrueFilter
}

#[derive(Debug)]
pub struct TrueFilter;

impl Filter for TrueFilter {
    #[inline]
    fn check(&self, _request: &HttpRequest) -> bool {
        true
    }
}

pub fn all_filter() -> AllFilter {
    AllFilter::new()
}

/// Accepts when every inner filter accepts, an empty set accepts everything.
pub struct AllFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl AllFilter {
    fn new() -> Self {
        Self { filters: vec![] }
    }

    pub fn and<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl Filter for AllFilter {
    fn check(&self, request: &HttpRequest) -> bool {
        self.filters.iter().all(|filter| filter.check(request))
    }
}

impl std::fmt::Debug for AllFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllFilter").field("filters", &self.filters.len()).finish()
    }
}

pub fn any_filter() -> AnyFilter {
    AnyFilter::new()
}

/// Accepts when one inner filter accepts, an empty set accepts everything.
pub struct AnyFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl AnyFilter {
    fn new() -> Self {
        Self { filters: vec![] }
    }

    pub fn or<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl Filter for AnyFilter {
    fn check(&self, request: &HttpRequest) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|filter| filter.check(request))
    }
}

impl std::fmt::Debug for AnyFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyFilter").field("filters", &self.filters.len()).finish()
    }
}

#[derive(Debug)]
pub struct MethodFilter(Method);

impl MethodFilter {
    pub fn new(method: Method) -> Self {
        Self(method)
    }
}

impl Filter for MethodFilter {
    fn check(&self, request: &HttpRequest) -> bool {
        self.0 == request.method()
    }
}

macro_rules! method_filter {
    ($method:ident, $variant:ident) => {
        #[inline]
        pub fn $method() -> MethodFilter {
            MethodFilter(Method::$variant)
        }
    };
}

method_filter!(get_method, Get);
method_filter!(post_method, Post);
method_filter!(put_method, Put);
method_filter!(delete_method, Delete);
method_filter!(head_method, Head);
method_filter!(options_method, Options);
method_filter!(connect_method, Connect);
method_filter!(patch_method, Patch);
method_filter!(trace_method, Trace);

/// Accepts requests carrying header `name` with exactly `value`.
#[derive(Debug)]
pub struct HeaderFilter(HeaderName, HeaderValue);

pub fn header(name: HeaderName, value: HeaderValue) -> HeaderFilter {
    HeaderFilter(name, value)
}

impl Filter for HeaderFilter {
    fn check(&self, request: &HttpRequest) -> bool {
        request.headers().get_all(&self.0).iter().any(|value| *value == self.1)
    }
}
