use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::config::Config;
use crate::error::Result;
use crate::handler::{
    DocumentRootHandler, Handler, HandlerChain, ProxyHandler, RedirectHttpsHandler,
};
use crate::http::Scheme;
use crate::listener::Listener;
use crate::registrar::Registrar;
use crate::registry::{Backend, BackendRegistry};
use crate::tls;

/// The edge server: up to two listeners sharing one handler chain, plus the
/// optional registrar mutating the shared backend registry at runtime.
pub struct Server {
    http: Option<Arc<Listener>>,
    https: Option<Arc<Listener>>,
    registrar: Option<Arc<Registrar>>,
    registry: BackendRegistry,
}

impl Server {
    /// Validate the config and assemble every component. Fails instead of
    /// running when the config is inconsistent or the TLS keypair cannot be
    /// loaded.
    pub async fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let registry = BackendRegistry::new();
        for backend in &config.backends {
            registry.add(backend.clone().normalized()).await;
        }

        let mut handlers: Vec<Arc<dyn Handler>> = Vec::new();
        if config.redirect_http {
            handlers.push(Arc::new(RedirectHttpsHandler::new(
                config.listen_tls.max(0) as u16,
            )));
        }
        if config.registrar || !config.backends.is_empty() {
            handlers.push(Arc::new(ProxyHandler::new(registry.clone())?));
        }
        if let Some(doc_root) = &config.document_root {
            handlers.push(Arc::new(DocumentRootHandler::new(doc_root)));
        }
        let chain = Arc::new(HandlerChain::new(handlers));

        let http = if config.http_enabled() {
            Some(Arc::new(Listener::new(
                format!("{}:{}", config.host, config.listen),
                Scheme::Http,
                chain.clone(),
                None,
            )))
        } else {
            None
        };

        let https = if config.tls_enabled() {
            let cert = config.certificate_file.as_deref().unwrap_or_default();
            let key = config.certificate_key_file.as_deref().unwrap_or_default();
            let acceptor = tls::load_acceptor(Path::new(cert), Path::new(key))?;
            Some(Arc::new(Listener::new(
                format!("{}:{}", config.host, config.listen_tls),
                Scheme::Https,
                chain.clone(),
                Some(acceptor),
            )))
        } else {
            None
        };

        let registrar = if config.registrar {
            Some(Arc::new(Registrar::new(
                &config.host,
                config.registrar_listen.max(0) as u16,
                registry.clone(),
            )?))
        } else {
            None
        };

        Ok(Self {
            http,
            https,
            registrar,
            registry,
        })
    }

    /// Start every enabled listener plus the registrar. The first fatal
    /// error from any of them becomes this call's result.
    pub async fn run(&self) -> Result<()> {
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        if let Some(http) = &self.http {
            let http = http.clone();
            tasks.spawn(async move { http.run().await });
        }

        if let Some(https) = &self.https {
            let https = https.clone();
            let plaintext = self.http.clone();
            tasks.spawn(async move {
                // Bind TLS only once the plaintext listener is up, so the
                // redirect to the TLS port is observable as soon as both
                // listeners exist.
                if let Some(plaintext) = plaintext {
                    plaintext.bound_addr().await?;
                }
                https.run().await
            });
        }

        if let Some(registrar) = &self.registrar {
            let registrar = registrar.clone();
            tasks.spawn(async move { registrar.run().await });
        }

        while let Some(joined) = tasks.join_next().await {
            joined??;
        }

        Ok(())
    }

    /// Close every open listener, then the registrar.
    pub fn close(&self) {
        if let Some(http) = &self.http {
            http.shutdown();
        }
        if let Some(https) = &self.https {
            https.shutdown();
        }
        if let Some(registrar) = &self.registrar {
            registrar.close();
        }
    }

    /// Bound address of the plaintext listener, once it is up.
    pub async fn http_addr(&self) -> Option<SocketAddr> {
        match &self.http {
            Some(listener) => listener.bound_addr().await.ok(),
            None => None,
        }
    }

    /// Bound address of the TLS listener, once it is up.
    pub async fn https_addr(&self) -> Option<SocketAddr> {
        match &self.https {
            Some(listener) => listener.bound_addr().await.ok(),
            None => None,
        }
    }

    /// Bound address of the registrar's admission listener, once it is up.
    pub async fn registrar_addr(&self) -> Option<SocketAddr> {
        match &self.registrar {
            Some(registrar) => registrar.bound_addr().await.ok(),
            None => None,
        }
    }

    /// Snapshot of the live backend list, in dispatch order.
    pub async fn backends(&self) -> Vec<Backend> {
        self.registry.snapshot().await
    }
}
