//! HTTP listener the booted guest reports back to.
//!
//! Three behaviors: `/good` and `/bad` deliver a [`Signal`], any other
//! request gets `200 OK` and nothing else happens. Connections are served
//! by hyper on the caller's tokio runtime; signals arrive on an `mpsc`
//! channel so the caller can wait on them against a deadline.

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use std::convert::Infallible;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Verdict reported by the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Good,
    Bad,
}

/// What a request path means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Signal(Signal),
    /// Progress or liveness ping.
    Ping,
}

pub fn route(path: &str) -> Route {
    match path {
        "/good" => Route::Signal(Signal::Good),
        "/bad" => Route::Signal(Signal::Bad),
        _ => Route::Ping,
    }
}

pub struct CallbackServer {
    listener: TcpListener,
    port: u16,
}

impl CallbackServer {
    /// Listen on all interfaces on an OS-assigned port, so the guest can
    /// reach it through QEMU's user-mode network.
    pub async fn bind() -> Result<Self> {
        Self::bind_to("0.0.0.0:0").await
    }

    pub async fn bind_to(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context("binding callback listener")?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve on a spawned task for as long as the runtime lives.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> UnboundedReceiver<Signal> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.serve(tx));
        rx
    }

    async fn serve(self, tx: UnboundedSender<Signal>) {
        let http = ConnBuilder::new(TokioExecutor::new());

        loop {
            let (socket, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    continue;
                }
            };

            let tx = tx.clone();
            let service = service_fn(move |req: Request<Incoming>| {
                let tx = tx.clone();
                async move {
                    tracing::info!(%peer, path = %req.uri().path(), "callback request");
                    if let Route::Signal(signal) = route(req.uri().path()) {
                        let _ = tx.send(signal);
                    }
                    Ok::<_, Infallible>(Response::new(Full::new(Bytes::new())))
                }
            });

            let http = http.clone();
            tokio::spawn(async move {
                if let Err(e) = http.serve_connection(TokioIo::new(socket), service).await {
                    tracing::warn!("callback connection error: {}", e);
                }
            });
        }
    }
}
