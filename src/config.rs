use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::registry::Backend;

/// Validated server configuration, read from a YAML file with PascalCase
/// keys. Ports use -1 as "disabled" and 0 for an ephemeral bind.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "Host")]
    pub host: String,

    #[serde(rename = "Listen")]
    pub listen: i32,

    #[serde(rename = "ListenTLS")]
    pub listen_tls: i32,

    /// When set, the plaintext listener answers every request with a 301
    /// to the TLS port.
    #[serde(rename = "RedirectHTTP")]
    pub redirect_http: bool,

    #[serde(rename = "Backends")]
    pub backends: Vec<Backend>,

    #[serde(rename = "CertificateFile")]
    pub certificate_file: Option<String>,

    #[serde(rename = "CertificateKeyFile")]
    pub certificate_key_file: Option<String>,

    /// Directory for the static-file fallback; omitted disables it.
    #[serde(rename = "DocumentRoot")]
    pub document_root: Option<String>,

    #[serde(rename = "Registrar")]
    pub registrar: bool,

    #[serde(rename = "RegistrarListen")]
    pub registrar_listen: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            listen: -1,
            listen_tls: -1,
            redirect_http: false,
            backends: Vec::new(),
            certificate_file: None,
            certificate_key_file: None,
            document_root: None,
            registrar: false,
            registrar_listen: -1,
        }
    }
}

impl Config {
    /// Load and validate configuration from a YAML file
    pub async fn load(path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file: {path}"))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {path}"))?;

        config.validate()?;
        Ok(config)
    }

    pub fn http_enabled(&self) -> bool {
        self.listen >= 0
    }

    pub fn tls_enabled(&self) -> bool {
        self.listen_tls >= 0
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.http_enabled() && !self.tls_enabled() {
            anyhow::bail!("at least one of Listen and ListenTLS must be enabled");
        }

        for port in [self.listen, self.listen_tls, self.registrar_listen] {
            if port > u16::MAX as i32 {
                anyhow::bail!("port {port} is out of range");
            }
        }

        if self.tls_enabled() {
            if self.certificate_file.as_deref().unwrap_or_default().is_empty() {
                anyhow::bail!("CertificateFile is required when ListenTLS is enabled");
            }
            if self
                .certificate_key_file
                .as_deref()
                .unwrap_or_default()
                .is_empty()
            {
                anyhow::bail!("CertificateKeyFile is required when ListenTLS is enabled");
            }
        }

        if self.registrar && self.registrar_listen < 0 {
            anyhow::bail!("RegistrarListen is required when Registrar is enabled");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pascal_case_yaml() {
        let yaml = r#"
Host: 127.0.0.1
Listen: 8080
ListenTLS: 8443
RedirectHTTP: true
CertificateFile: /etc/butler/cert.pem
CertificateKeyFile: /etc/butler/key.pem
DocumentRoot: /srv/www
Backends:
  - Addr: localhost:9001
    Path: /api
  - Addr: localhost:9002
Registrar: true
RegistrarListen: 7070
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.listen, 8080);
        assert_eq!(config.listen_tls, 8443);
        assert!(config.redirect_http);
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].addr, "localhost:9001");
        assert_eq!(config.backends[0].path, "/api");
        // Path may be omitted; normalization happens at registration time.
        assert_eq!(config.backends[1].path, "");
        assert_eq!(config.document_root.as_deref(), Some("/srv/www"));
        assert!(config.registrar);
        assert_eq!(config.registrar_listen, 7070);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn omitted_keys_fall_back_to_defaults() {
        let config: Config = serde_yaml::from_str("Listen: 8080").unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.listen_tls, -1);
        assert!(!config.registrar);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn both_listeners_disabled_is_invalid() {
        let config = Config::default();

        assert!(config.validate().is_err());
    }

    #[test]
    fn tls_without_certificates_is_invalid() {
        let config = Config {
            listen_tls: 443,
            ..Config::default()
        };

        assert!(config.validate().is_err());

        let config = Config {
            listen_tls: 443,
            certificate_file: Some("/etc/butler/cert.pem".to_string()),
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn registrar_requires_a_port() {
        let config = Config {
            listen: 8080,
            registrar: true,
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }
}
