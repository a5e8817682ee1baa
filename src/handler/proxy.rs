use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::error::{ButlerError, Result};
use crate::http::{Request, Response};
use crate::registry::{Backend, BackendRegistry};

use super::{Context, Handler, Outcome};

/// Forwards requests whose path starts with a registered backend's prefix.
/// The first match in registration order wins. The live backend list is
/// read through the registry on every dispatch, so registrar mutations are
/// visible without rebuilding the chain.
pub struct ProxyHandler {
    registry: BackendRegistry,
    client: reqwest::Client,
}

impl ProxyHandler {
    pub fn new(registry: BackendRegistry) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(crate::SERVER_TOKEN)
            .build()
            .map_err(|e| ButlerError::Upstream(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { registry, client })
    }

    /// Replay `request` against `backend`. Transport failure is a client
    /// answer (502), not an error.
    async fn forward(&self, backend: &Backend, request: &Request) -> Result<Response> {
        let url = format!("http://{}{}", backend.addr, request.path);
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| ButlerError::Upstream(format!("invalid method {:?}: {e}", request.method)))?;

        let mut outbound_headers = HeaderMap::new();
        for (name, values) in request.headers.iter() {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            for value in values {
                if let Ok(value) = HeaderValue::from_str(value) {
                    outbound_headers.append(name.clone(), value);
                }
            }
        }

        let mut outbound = self.client.request(method, &url).headers(outbound_headers);
        if !request.body.is_empty() {
            outbound = outbound.body(request.body.clone());
        }

        let upstream = match outbound.send().await {
            Ok(upstream) => upstream,
            Err(e) => {
                debug!("backend {} unreachable: {}", backend, e);
                return Ok(Response::bad_gateway());
            }
        };

        let mut response = Response::status(upstream.status().as_u16(), Vec::new());
        for (name, value) in upstream.headers() {
            if let Ok(value) = value.to_str() {
                response.headers.add(name.as_str(), value);
            }
        }
        response.content = upstream
            .bytes()
            .await
            .map_err(|e| ButlerError::Upstream(format!("failed reading backend response: {e}")))?
            .to_vec();

        Ok(response)
    }
}

#[async_trait]
impl Handler for ProxyHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<Outcome> {
        let backends = self.registry.snapshot().await;
        for backend in &backends {
            if ctx.request.path.starts_with(&backend.path) {
                ctx.response = Some(self.forward(backend, &ctx.request).await?);
                return Ok(Outcome::Terminated);
            }
        }

        Ok(Outcome::Passed)
    }
}
