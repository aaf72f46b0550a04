//! Development HTTP server for the output directory.
//!
//! Files are read from disk on every request, so a committed rebuild is
//! visible on the next request without any cache invalidation.

pub mod compress;
pub mod mime;
pub mod static_files;

use crate::config::BuildConfig;
use crate::error::{BundleError, Result};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use static_files::Resolved;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the request handler needs to answer requests
#[derive(Debug, Clone)]
pub struct ServerState {
    pub root: PathBuf,
    pub index: String,
    pub compress: bool,
}

impl ServerState {
    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            root: config.out_dir.clone(),
            index: config.index.clone(),
            compress: config.mode.compresses(),
        }
    }
}

/// A bound dev server; runs until its shutdown token fires
pub struct DevServer {
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
}

impl DevServer {
    pub async fn bind(config: &BuildConfig, shutdown: CancellationToken) -> Result<Self> {
        let addr = config.server.addr()?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                BundleError::PortInUse { addr, source: e }
            } else {
                BundleError::Io(e)
            }
        })?;

        Ok(Self {
            listener,
            state: Arc::new(ServerState::from_config(config)),
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<()> {
        info!(
            "Serving {:?} at http://{}",
            self.state.root,
            self.local_addr()?
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Dev server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Accepted connection from {}", peer);
                        serve_connection(stream, self.state.clone(), self.shutdown.clone());
                    }
                    Err(e) => warn!("Failed to accept connection: {}", e),
                },
            }
        }
    }
}

fn serve_connection(
    stream: tokio::net::TcpStream,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);
        let conn = http1::Builder::new().serve_connection(
            io,
            service_fn(move |req| handle_request(req, state.clone())),
        );

        tokio::select! {
            result = conn => {
                if let Err(e) = result {
                    debug!("Connection error: {}", e);
                }
            }
            _ = shutdown.cancelled() => {}
        }
    });
}

/// Answer one request from the output directory
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<ServerState>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = if method != Method::GET && method != Method::HEAD {
        plain_response(StatusCode::METHOD_NOT_ALLOWED, "405 Method Not Allowed")
    } else {
        let accepts_gzip = req
            .headers()
            .get(header::ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(compress::accepts_gzip);

        match static_files::resolve(&state.root, &state.index, &path).await {
            Resolved::File(file) | Resolved::Fallback(file) => {
                serve_file(&file, &state, accepts_gzip, method == Method::HEAD).await
            }
            Resolved::NotFound => plain_response(StatusCode::NOT_FOUND, "404 Not Found"),
            Resolved::Forbidden => {
                warn!("Path traversal attempt blocked: {}", path);
                plain_response(StatusCode::FORBIDDEN, "403 Forbidden")
            }
            Resolved::Unavailable => plain_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "503 Service Unavailable: output directory is being replaced",
            ),
        }
    };

    debug!("{} {} -> {}", method, path, response.status());
    Ok(response)
}

async fn serve_file(
    file: &Path,
    state: &ServerState,
    accepts_gzip: bool,
    is_head: bool,
) -> Response<Full<Bytes>> {
    let content = match tokio::fs::read(file).await {
        Ok(content) => content,
        // Replaced between resolve and read
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return plain_response(StatusCode::SERVICE_UNAVAILABLE, "503 Service Unavailable");
        }
        Err(e) => {
            warn!("Failed to read {:?}: {}", file, e);
            return plain_response(StatusCode::INTERNAL_SERVER_ERROR, "500 Internal Server Error");
        }
    };

    let content_type = mime::content_type(file.extension().and_then(|e| e.to_str()));
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache");

    let body = if state.compress && mime::is_compressible(content_type) {
        builder = builder.header(header::VARY, "Accept-Encoding");
        if accepts_gzip {
            match compress::gzip(&content) {
                Ok(encoded) => {
                    builder = builder.header(header::CONTENT_ENCODING, "gzip");
                    encoded
                }
                Err(e) => {
                    warn!("Failed to compress {:?}: {}", file, e);
                    content
                }
            }
        } else {
            content
        }
    } else {
        content
    };

    builder = builder.header(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    let body = if is_head { Bytes::new() } else { Bytes::from(body) };

    builder.body(Full::new(body)).unwrap_or_else(|e| {
        warn!("Failed to build response: {}", e);
        Response::new(Full::new(Bytes::new()))
    })
}

fn plain_response(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8");
    if status == StatusCode::METHOD_NOT_ALLOWED {
        builder = builder.header(header::ALLOW, "GET, HEAD");
    }
    builder
        .body(Full::new(Bytes::from_static(message.as_bytes())))
        .unwrap_or_else(|e| {
            warn!("Failed to build {} response: {}", status, e);
            Response::new(Full::new(Bytes::from_static(message.as_bytes())))
        })
}
