use micro_reactor::event::EventQueue;
use micro_reactor::protocol::http::{HttpRequest, HttpResponse};
use micro_reactor::protocol::websocket::{WebsocketListener, WebsocketWriter};
use micro_reactor_web::router::{Router, get};
use micro_reactor_web::websocket::WebsocketRouter;
use micro_reactor_web::{Server, sync_controller_fn, websocket_fn};
use tracing::info;

/// Echoes every message and counts them.
#[derive(Debug, Default)]
struct Echo {
    messages: usize,
}

impl WebsocketListener for Echo {
    fn on_text(&mut self, writer: &mut WebsocketWriter<'_>, text: &str) {
        self.messages += 1;
        writer.send_text(text);
    }

    fn on_binary(&mut self, writer: &mut WebsocketWriter<'_>, data: &[u8]) {
        self.messages += 1;
        writer.send_binary(data);
    }

    fn on_disconnect(&mut self) {
        info!(messages = self.messages, "echo client left");
    }
}

fn index(_request: HttpRequest) -> HttpResponse {
    let mut response = HttpResponse::new();
    response.write_body("connect a websocket client to ws://127.0.0.1:3001/echo\r\n");
    response
}

fn main() {
    let router = Router::builder().route("/", get(sync_controller_fn(index))).build();
    let websocket_router = WebsocketRouter::builder()
        .route(
            "/echo",
            websocket_fn(|_request: &HttpRequest, _queue: &EventQueue| -> Box<dyn WebsocketListener> {
                Box::new(Echo::default())
            }),
        )
        .build();

    let server = match Server::builder().bind("127.0.0.1:3001").router(router).websocket_router(websocket_router).build() {
        Ok(server) => server,
        Err(e) => {
            eprintln!("failed to build server: {e}");
            return;
        }
    };

    if let Err(e) = server.start() {
        eprintln!("server stopped with error: {e}");
    }
}
