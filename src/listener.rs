use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

use crate::error::{ButlerError, ParseError, Result};
use crate::handler::{Context, HandlerChain};
use crate::http::request::METHOD_HEAD;
use crate::http::{headers, Request, Response, Scheme};

/// One accept loop bound to one address. TLS listeners wrap each accepted
/// socket in a handshake before entering the shared connection loop.
pub struct Listener {
    addr: String,
    scheme: Scheme,
    chain: Arc<HandlerChain>,
    tls: Option<TlsAcceptor>,
    ready_tx: watch::Sender<Option<SocketAddr>>,
    ready_rx: watch::Receiver<Option<SocketAddr>>,
    shutdown_tx: watch::Sender<()>,
    shutdown_rx: watch::Receiver<()>,
}

impl Listener {
    pub fn new(
        addr: String,
        scheme: Scheme,
        chain: Arc<HandlerChain>,
        tls: Option<TlsAcceptor>,
    ) -> Self {
        let (ready_tx, ready_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        Self {
            addr,
            scheme,
            chain,
            tls,
            ready_tx,
            ready_rx,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Wait until the socket is bound and return its address. This is how
    /// callers discover the port assigned when the config asked for port 0.
    pub async fn bound_addr(&self) -> Result<SocketAddr> {
        let mut ready = self.ready_rx.clone();
        loop {
            if let Some(addr) = *ready.borrow() {
                return Ok(addr);
            }
            ready
                .changed()
                .await
                .map_err(|_| ButlerError::Internal("listener closed before binding".to_string()))?;
        }
    }

    /// Ask the accept loop to exit. Connections already being served run to
    /// completion on their own tasks.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Bind, publish readiness, and accept until shutdown. Each accepted
    /// connection is served on its own task.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.addr).await?;
        let local_addr = listener.local_addr()?;
        let _ = self.ready_tx.send(Some(local_addr));

        info!("{} listener bound on {}", self.scheme, local_addr);

        let mut shutdown = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("{} listener on {} shutting down", self.scheme, local_addr);
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!("accepted connection from {}", peer);

                    let chain = self.chain.clone();
                    let scheme = self.scheme;
                    let tls = self.tls.clone();
                    tokio::spawn(async move {
                        match tls {
                            Some(acceptor) => match acceptor.accept(stream).await {
                                Ok(stream) => serve_connection(stream, peer, scheme, chain).await,
                                Err(e) => debug!("TLS handshake with {} failed: {}", peer, e),
                            },
                            None => serve_connection(stream, peer, scheme, chain).await,
                        }
                    });
                }
            }
        }
    }
}

/// Drive one connection: parse a request, dispatch it through the chain,
/// write the response, and repeat until the peer goes away or asks to
/// close.
async fn serve_connection<S>(stream: S, peer: SocketAddr, scheme: Scheme, chain: Arc<HandlerChain>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    loop {
        let request = match Request::parse(&mut reader, scheme).await {
            Ok(request) => request,
            Err(ParseError::NoData) => return,
            Err(ParseError::Malformed(e)) => {
                debug!("malformed request from {}: {}", peer, e);
                let mut response = Response::bad_request();
                response.headers.set(headers::SERVER, crate::SERVER_TOKEN);
                if let Ok(bytes) = response.to_bytes(false, false) {
                    let _ = write_half.write_all(&bytes).await;
                }
                return;
            }
            Err(ParseError::Io(e)) => {
                debug!("error reading from {}, closing connection: {}", peer, e);
                return;
            }
        };

        let close_requested = connection_close(&request);
        let headers_only = request.method == METHOD_HEAD;
        let gzip_accepted = accepts_gzip(&request);

        let mut ctx = Context::new(peer, request);
        if let Err(e) = chain.dispatch(&mut ctx).await {
            error!("handler error for {} {}: {}", peer, ctx.request, e);
            return;
        }

        let mut response = ctx.response.take().unwrap_or_else(Response::not_found);
        let compress = gzip_accepted && !response.content.is_empty() && !response.is_gzip_encoded();
        response.headers.set(headers::SERVER, crate::SERVER_TOKEN);

        let bytes = match response.to_bytes(compress, headers_only) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("failed to serialize response for {}: {}", peer, e);
                return;
            }
        };

        if let Err(e) = write_half.write_all(&bytes).await {
            debug!("failed writing response to {}: {}", peer, e);
            return;
        }
        let _ = write_half.flush().await;

        info!("{} {} ({} bytes)", peer, ctx.request, bytes.len());

        if close_requested {
            return;
        }
    }
}

fn connection_close(request: &Request) -> bool {
    request
        .headers
        .first_ignore_case(headers::CONNECTION)
        .map(|value| value.eq_ignore_ascii_case("close"))
        .unwrap_or(false)
}

fn accepts_gzip(request: &Request) -> bool {
    request
        .headers
        .first_ignore_case(headers::ACCEPT_ENCODING)
        .map(|value| value.split(',').any(|token| token.trim() == "gzip"))
        .unwrap_or(false)
}
