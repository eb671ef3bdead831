use std::thread;
use std::time::Duration;

use micro_reactor::config::ServerConfig;
use micro_reactor::event::{EventQueue, Promise};
use micro_reactor::protocol::http::{HttpRequest, HttpResponse};
use micro_reactor_web::router::{Router, get, post};
use micro_reactor_web::{Server, controller_fn, sync_controller_fn};

fn hello_world(_request: HttpRequest) -> HttpResponse {
    let mut response = HttpResponse::new();
    response.write_body("hello world\r\n");
    response
}

fn echo(request: HttpRequest) -> HttpResponse {
    let mut response = HttpResponse::new();
    response.write_body(request.body());
    response
}

/// Answers from a worker thread, the reactor keeps serving meanwhile.
fn slow(request: HttpRequest, queue: &EventQueue) -> Promise<HttpResponse> {
    Promise::new(queue, move |resolve, _reject| {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            let mut response = HttpResponse::new();
            response.write_body(format!("slow answer for {}\r\n", request.path()));
            resolve.resolve(response);
        });
    })
}

fn main() {
    let router = Router::builder()
        .route("/", get(sync_controller_fn(hello_world)))
        .route("/echo", post(sync_controller_fn(echo)))
        .route("/slow", get(controller_fn(slow)))
        .build();

    let config = ServerConfig::new().connection_timeout(Duration::from_secs(30)).server_name("hello-world");

    let server = match Server::builder().bind("127.0.0.1:3000").router(router).config(config).build() {
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
