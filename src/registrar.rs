use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::{ButlerError, Result};
use crate::handler::{Context, Handler, HandlerChain, Outcome};
use crate::http::{headers, Response, Scheme};
use crate::listener::Listener;
use crate::registry::{Backend, BackendRegistry};

const PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Control plane for the live backend set: an admission listener plus a
/// supervisor task that is the registry's single writer.
///
/// A backend admitted through `PUT /backends` must pass one probe up front,
/// then owns a probe loop; its first failed probe unregisters it for good.
pub struct Registrar {
    listener: Arc<Listener>,
    registry: BackendRegistry,
    client: reqwest::Client,
    unregister_tx: UnboundedSender<Backend>,
    events: Mutex<Option<(UnboundedReceiver<Backend>, UnboundedReceiver<Backend>)>>,
    shutdown_tx: watch::Sender<()>,
    shutdown_rx: watch::Receiver<()>,
}

impl Registrar {
    pub fn new(host: &str, port: u16, registry: BackendRegistry) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent(crate::SERVER_TOKEN)
            .build()
            .map_err(|e| {
                ButlerError::Internal(format!("failed to create health-check client: {e}"))
            })?;

        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let admission = AdmissionHandler {
            register_tx,
            client: client.clone(),
        };
        let chain = Arc::new(HandlerChain::new(vec![
            Arc::new(admission) as Arc<dyn Handler>
        ]));
        let listener = Arc::new(Listener::new(
            format!("{host}:{port}"),
            Scheme::Http,
            chain,
            None,
        ));

        Ok(Self {
            listener,
            registry,
            client,
            unregister_tx,
            events: Mutex::new(Some((register_rx, unregister_rx))),
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub async fn bound_addr(&self) -> Result<SocketAddr> {
        self.listener.bound_addr().await
    }

    /// Run the admission listener and the supervisor until closed.
    pub async fn run(&self) -> Result<()> {
        let (register_rx, unregister_rx) = self
            .events
            .lock()
            .await
            .take()
            .ok_or_else(|| ButlerError::Internal("registrar is already running".to_string()))?;

        let supervisor = supervise(
            self.registry.clone(),
            register_rx,
            unregister_rx,
            self.unregister_tx.clone(),
            self.client.clone(),
            self.shutdown_rx.clone(),
        );

        let listener = self.listener.clone();
        tokio::select! {
            result = listener.run() => result,
            _ = supervisor => Ok(()),
        }
    }

    /// Stop the admission listener, the supervisor, and every probe loop.
    pub fn close(&self) {
        self.listener.shutdown();
        let _ = self.shutdown_tx.send(());
    }
}

/// Single writer of the registry: serializes every register/unregister
/// event, deduplicates registrations by value, and spawns one probe loop
/// per newly active backend. Keeps running no matter how admissions fail.
async fn supervise(
    registry: BackendRegistry,
    mut register_rx: UnboundedReceiver<Backend>,
    mut unregister_rx: UnboundedReceiver<Backend>,
    unregister_tx: UnboundedSender<Backend>,
    client: reqwest::Client,
    mut shutdown: watch::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            registered = register_rx.recv() => {
                let Some(backend) = registered else { return };
                if !registry.add(backend.clone()).await {
                    debug!("ignoring duplicate registration for {}", backend);
                    continue;
                }
                info!("registered backend {}", backend);
                tokio::spawn(probe_loop(
                    backend,
                    unregister_tx.clone(),
                    client.clone(),
                    shutdown.clone(),
                ));
            }
            unregistered = unregister_rx.recv() => {
                let Some(backend) = unregistered else { return };
                if registry.remove(&backend).await {
                    info!("unregistered backend {}", backend);
                }
            }
        }
    }
}

/// One probe task per active backend. The first failed probe emits an
/// unregister event and ends the task; there is no way back to active.
async fn probe_loop(
    backend: Backend,
    unregister_tx: UnboundedSender<Backend>,
    client: reqwest::Client,
    mut shutdown: watch::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(PROBE_INTERVAL) => {}
        }

        if !check_health(&client, &backend).await {
            let _ = unregister_tx.send(backend);
            return;
        }
    }
}

/// A backend is healthy when `GET /health` completes with a 2xx status.
async fn check_health(client: &reqwest::Client, backend: &Backend) -> bool {
    let url = format!("http://{}/health", backend.addr);
    match client.get(&url).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            if !(200..300).contains(&status) {
                debug!("{} is unhealthy: status code {}", backend, status);
                return false;
            }
            true
        }
        Err(e) => {
            debug!("{} is unhealthy: {}", backend, e);
            false
        }
    }
}

/// `PUT /backends` admission surface served by the registrar's listener.
struct AdmissionHandler {
    register_tx: UnboundedSender<Backend>,
    client: reqwest::Client,
}

#[async_trait]
impl Handler for AdmissionHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<Outcome> {
        let request = &ctx.request;
        if request.method != "PUT" || request.path != "/backends" {
            ctx.response = Some(Response::not_found());
            return Ok(Outcome::Terminated);
        }

        let content_type = request
            .headers
            .first_ignore_case(headers::CONTENT_TYPE)
            .unwrap_or_default();
        if content_type != "application/json" && content_type != "text/json" {
            ctx.response = Some(Response::unsupported_media_type());
            return Ok(Outcome::Terminated);
        }

        let backend: Backend = match serde_json::from_slice(&request.body) {
            Ok(backend) => backend,
            Err(e) => {
                debug!("rejecting admission from {}: {}", ctx.peer, e);
                ctx.response = Some(Response::bad_request());
                return Ok(Outcome::Terminated);
            }
        };
        let backend = backend.normalized();

        // The backend must prove itself healthy before it may join.
        if !check_health(&self.client, &backend).await {
            warn!("rejecting {}: failed pre-admission probe", backend);
            ctx.response = Some(Response::bad_request());
            return Ok(Outcome::Terminated);
        }

        let _ = self.register_tx.send(backend);
        ctx.response = Some(Response::no_content());
        Ok(Outcome::Terminated)
    }
}
