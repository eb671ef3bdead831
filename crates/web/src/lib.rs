//! Controller routing and a two reactor server on top of `micro-reactor`.
//!
//! HTTP requests are routed by path (through `matchit`) and by [`filter`]s to
//! [`Controller`]s answering with a promise of the response. Requests asking for
//! a WebSocket upgrade on a registered path are answered with the handshake and
//! their connection moves to a second reactor running on its own thread.
//!
//! # Example
//!
//! ```no_run
//! use micro_reactor::protocol::http::{HttpRequest, HttpResponse};
//! use micro_reactor_web::router::{Router, get};
//! use micro_reactor_web::{Server, sync_controller_fn};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Router::builder()
//!         .route(
//!             "/hello/{name}",
//!             get(sync_controller_fn(|request: HttpRequest| {
//!                 let mut response = HttpResponse::new();
//!                 response.write_body(format!("hello {}\r\n", request.param("name").unwrap_or("world")));
//!                 response
//!             })),
//!         )
//!         .build();
//!
//!     Server::builder().bind("127.0.0.1:8080").router(router).build()?.start()?;
//!     Ok(())
//! }
//! ```

mod controller;
mod controller_manager;
mod server;

pub mod filter;
pub mod router;
pub mod websocket;

pub use controller::{Controller, FnController, controller_fn, sync_controller_fn};
pub use controller_manager::ControllerManager;
pub use router::Router;
pub use server::{Server, ServerBuildError, ServerBuilder, ShutdownHandle};
pub use websocket::{WebsocketController, WebsocketControllerManager, WebsocketRouter, websocket_fn};
