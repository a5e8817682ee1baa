//! The ordered request pipeline: each handler either produces the response
//! and terminates the chain, or passes to its successor.

pub mod doc_root;
pub mod proxy;
pub mod redirect;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::http::{Request, Response};

pub use doc_root::DocumentRootHandler;
pub use proxy::ProxyHandler;
pub use redirect::RedirectHttpsHandler;

/// Per-request scratch carried through the chain. The live socket stays in
/// the connection loop; `peer` is the connection's identity for logging.
#[derive(Debug)]
pub struct Context {
    pub peer: SocketAddr,
    pub request: Request,
    pub response: Option<Response>,
}

impl Context {
    pub fn new(peer: SocketAddr, request: Request) -> Self {
        Self {
            peer,
            request,
            response: None,
        }
    }
}

/// What a handler did with the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The chain stops here; the context's response is final.
    Terminated,
    /// The next handler decides.
    Passed,
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &mut Context) -> Result<Outcome>;
}

/// Ordered pipeline evaluated per request, built once at server
/// construction and shared by every listener. Falls back to 404 when no
/// handler terminates.
pub struct HandlerChain {
    handlers: Vec<Arc<dyn Handler>>,
}

impl HandlerChain {
    pub fn new(handlers: Vec<Arc<dyn Handler>>) -> Self {
        Self { handlers }
    }

    pub async fn dispatch(&self, ctx: &mut Context) -> Result<()> {
        for handler in &self.handlers {
            if handler.handle(ctx).await? == Outcome::Terminated {
                return Ok(());
            }
        }

        ctx.response = Some(Response::not_found());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Scheme;

    struct PassingHandler;

    #[async_trait]
    impl Handler for PassingHandler {
        async fn handle(&self, _ctx: &mut Context) -> Result<Outcome> {
            Ok(Outcome::Passed)
        }
    }

    fn request() -> Request {
        Request {
            scheme: Scheme::Http,
            method: "GET".to_string(),
            path: "/".to_string(),
            host: String::new(),
            headers: crate::http::Headers::new(),
            body: Vec::new(),
        }
    }

    #[tokio::test]
    async fn exhausted_chain_falls_back_to_not_found() {
        let chain = HandlerChain::new(vec![Arc::new(PassingHandler)]);
        let mut ctx = Context::new("127.0.0.1:0".parse().unwrap(), request());

        chain.dispatch(&mut ctx).await.unwrap();

        assert_eq!(ctx.response.unwrap().status_code, 404);
    }

    #[tokio::test]
    async fn empty_chain_falls_back_to_not_found() {
        let chain = HandlerChain::new(Vec::new());
        let mut ctx = Context::new("127.0.0.1:0".parse().unwrap(), request());

        chain.dispatch(&mut ctx).await.unwrap();

        assert_eq!(ctx.response.unwrap().status_code, 404);
    }
}
