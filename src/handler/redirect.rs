use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::http::{Response, Scheme};

use super::{Context, Handler, Outcome};

/// Sends plaintext traffic to the TLS listener with a 301. TLS requests
/// pass straight through, which is what scopes this handler to the
/// plaintext listener even though the chain is shared.
pub struct RedirectHttpsHandler {
    tls_port: u16,
}

impl RedirectHttpsHandler {
    pub fn new(tls_port: u16) -> Self {
        Self { tls_port }
    }
}

#[async_trait]
impl Handler for RedirectHttpsHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<Outcome> {
        if ctx.request.scheme != Scheme::Http {
            return Ok(Outcome::Passed);
        }

        let host = ctx.request.host.split(':').next().unwrap_or_default();
        let location = format!("https://{}:{}{}", host, self.tls_port, ctx.request.path);

        debug!("redirecting {} to {}", ctx.peer, location);
        ctx.response = Some(Response::moved_permanently(location));
        Ok(Outcome::Terminated)
    }
}
