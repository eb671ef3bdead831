//! A single-threaded reactor core for HTTP/1.1 and WebSocket sessions
//!
//! This crate multiplexes many non-blocking TCP connections on one thread per
//! reactor, decodes HTTP/1.1 requests and WebSocket frames out of a chunked byte
//! buffer, and hands completed requests and messages to application code through
//! a small promise and event-queue primitive, so slow work never blocks the I/O
//! loop.
//!
//! # Features
//!
//! - Edge-triggered I/O on top of `mio`, one reactor per thread
//! - Resumable parsers: partial input is reverted and retried on the next read
//! - HTTP/1.1 requests with `Content-Length` bodies and pipelined requests
//! - WebSocket upgrade, fragmentation and message assembly
//! - Moving a live session between reactors (HTTP reactor → WebSocket reactor)
//! - Deferred responses from any thread through the reactor outbox
//! - Idle connection eviction
//!
//! # Example
//!
//! ```no_run
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//!
//! use micro_reactor::config::ServerConfig;
//! use micro_reactor::network::{Reactor, Session, SessionHandler};
//! use micro_reactor::protocol::http::{HttpRequest, HttpResponse, HttpSessionHandler, RequestCallback, Responder};
//! use tracing::Level;
//! use tracing_subscriber::FmtSubscriber;
//!
//! fn main() -> std::io::Result<()> {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//!     let config = ServerConfig::new().chunk_size(4096);
//!
//!     let callback: RequestCallback = Arc::new(|request: HttpRequest, responder: Responder| {
//!         let mut response = HttpResponse::new();
//!         response.write_body(format!("hello from {}\r\n", request.path()));
//!         responder.send(&response);
//!     });
//!
//!     let addr = SocketAddr::from(([127, 0, 0, 1], 8080));
//!     let mut reactor = Reactor::bind(
//!         addr,
//!         move |session: Session| -> Box<dyn SessionHandler> {
//!             Box::new(HttpSessionHandler::new(session, Arc::clone(&callback)))
//!         },
//!         &config,
//!     )?;
//!
//!     loop {
//!         reactor.loop_once()?;
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`buffer`]: chunked byte buffer with checkpointed reader and writer views
//! - [`event`]: [`EventQueue`](event::EventQueue) and [`Promise`](event::Promise)
//! - [`network`]: sessions, session handlers and the [`Reactor`](network::Reactor)
//! - [`protocol`]: HTTP and WebSocket session handlers
//! - [`config`]: [`ServerConfig`](config::ServerConfig)
//!
//! # Core Components
//!
//! ## Reactor
//!
//! A [`Reactor`](network::Reactor) owns every session it polls. Each call to
//! [`loop_once`](network::Reactor::loop_once) adopts handed-off sessions,
//! delivers queued output, runs one non-blocking poll pass and evicts timed out
//! sessions. It never blocks, the caller decides how to idle.
//!
//! ## Session handlers
//!
//! A [`SessionHandler`](network::SessionHandler) consumes its session's input
//! buffer and writes into its output buffer. Returning an error evicts the
//! session, so does a panic: it is caught by the reactor and only ends the
//! session whose handler panicked. Returning [`Handled::Relocated`](network::Handled::Relocated) tells
//! the reactor the session now lives elsewhere.
//!
//! ## Continuations
//!
//! Promises settle through an [`EventQueue`](event::EventQueue). Whoever owns
//! the queue decides on which thread continuations run by calling
//! [`poll`](event::EventQueue::poll). A panic inside a continuation is caught
//! and turns into a failed promise.
//!
//! ## Error Handling
//!
//! - [`protocol::ParseError`]: protocol violations, fatal to the connection
//! - [`network::SessionError`]: everything that ends a session
//! - [`event::BoxError`]: failure reasons carried by promises
//!
//! # Limitations
//!
//! - HTTP/1.1 only, no chunked transfer encoding
//! - No TLS support (use a reverse proxy for HTTPS)
//! - No WebSocket extensions or subprotocols

pub mod buffer;
pub mod config;
pub mod event;
pub mod network;
pub mod protocol;

mod utils;
