use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;
use crate::http::Response;

use super::{Context, Handler, Outcome};

/// Serves files from a directory as the chain's static fallback.
pub struct DocumentRootHandler {
    doc_root: PathBuf,
}

impl DocumentRootHandler {
    pub fn new(doc_root: impl Into<PathBuf>) -> Self {
        Self {
            doc_root: doc_root.into(),
        }
    }
}

#[async_trait]
impl Handler for DocumentRootHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<Outcome> {
        if ctx.request.path == "/" {
            ctx.request.path = "/index.html".to_string();
        }

        let path = self.doc_root.join(ctx.request.path.trim_start_matches('/'));
        match tokio::fs::read(&path).await {
            Ok(content) => {
                ctx.response = Some(Response::ok(content));
                Ok(Outcome::Terminated)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                ctx.response = Some(Response::not_found());
                Ok(Outcome::Terminated)
            }
            Err(e) => Err(e.into()),
        }
    }
}
