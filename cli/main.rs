// cli/main.rs
//
// Small demo binary wiring up an `Application` with an echo route, a static
// file route, and a WebSocket echo route, so the core can be exercised from
// the command line during development.

use std::env;
use std::io::Read;

use httpd_core::router::SegmentPattern;
use httpd_core::{Application, DuplexIo, Method, Params, Request, Response, Route, ServerError};

fn main() {
    env_logger::init();

    let port: u16 = env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let app = Application::builder()
        .route(Route::get("/", Box::new(index)))
        .route(Route::with_matcher(
            Method::Post,
            Box::new(SegmentPattern::parse("/echo")),
            Box::new(echo),
        ))
        .route(Route::static_files("/static/", "./demos/static"))
        .route(Route::websocket("/ws", echo_websocket))
        .build();

    log::info!("serving on 127.0.0.1:{port}");
    if let Err(e) = app.serve(("127.0.0.1", port)) {
        log::error!("server exited: {e}");
    }
}

fn index(
    _req: &Request<'_>,
    _params: &Params<'_>,
    _body: &mut dyn Read,
    response: &mut Response<'_>,
) -> Result<(), ServerError> {
    response.set_body(&b"httpd-core demo: POST /echo, GET /static/*, GET /ws"[..]);
    Ok(())
}

fn echo(
    _req: &Request<'_>,
    _params: &Params<'_>,
    body: &mut dyn Read,
    response: &mut Response<'_>,
) -> Result<(), ServerError> {
    let mut buf = Vec::new();
    body.read_to_end(&mut buf)?;
    response.set_body(buf);
    Ok(())
}

fn echo_websocket(io: &mut dyn DuplexIo) {
    let mut buf = [0u8; 4096];
    loop {
        match io.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                if io.write_all(&buf[..n]).is_err() {
                    return;
                }
            }
        }
    }
}
