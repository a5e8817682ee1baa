use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::error::{ButlerError, Result};

/// Load an X.509 PEM keypair from disk and build the acceptor for the
/// HTTPS listener.
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor> {
    let mut cert_reader = BufReader::new(File::open(cert_path)?);
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| ButlerError::Tls(format!("failed to read {}: {e}", cert_path.display())))?;
    if certs.is_empty() {
        return Err(ButlerError::Tls(format!(
            "no certificates found in {}",
            cert_path.display()
        )));
    }

    let mut key_reader = BufReader::new(File::open(key_path)?);
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| ButlerError::Tls(format!("failed to read {}: {e}", key_path.display())))?
        .ok_or_else(|| {
            ButlerError::Tls(format!("no private key found in {}", key_path.display()))
        })?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ButlerError::Tls(format!("invalid keypair: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
