use bytes::Bytes;
use http_body_util::Full;
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request, Response};
use hyper_util::rt::TokioIo;
use std::{convert::Infallible, net::SocketAddr};
use tokio::net::TcpListener;
use tracing::{debug, info, info_span, Instrument};

/// Binds the gateway's own health listener.
pub async fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "HTTP health server listening");
    Ok(listener)
}

/// Serves health checks until the listener fails.
pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    loop {
        let (socket, client) = listener.accept().await?;
        tokio::spawn(
            async move {
                let res = http1::Builder::new()
                    .serve_connection(TokioIo::new(socket), service_fn(handle))
                    .await;
                if let Err(error) = res {
                    debug!(%error, "Connection failed");
                }
            }
            .instrument(info_span!("health", %client)),
        );
    }
}

async fn handle(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let rsp = match req.uri().path() {
        "/health" | "/live" => match *req.method() {
            hyper::Method::GET | hyper::Method::HEAD => Response::builder()
                .status(hyper::StatusCode::OK)
                .header(hyper::header::CONTENT_TYPE, "text/plain")
                .body(Full::new(Bytes::from_static(b"ok\n"))),
            _ => Response::builder()
                .status(hyper::StatusCode::METHOD_NOT_ALLOWED)
                .body(Full::default()),
        },
        _ => Response::builder()
            .status(hyper::StatusCode::NOT_FOUND)
            .body(Full::default()),
    };
    // The builder only fails on invalid header values, which are all static here.
    Ok(rsp.unwrap_or_default())
}
