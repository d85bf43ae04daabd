use serde::{Deserialize, Serialize};

/// One named PostgreSQL target from the `[[connections]]` config list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    /// Never written back out. When empty, `PGPASSWORD` is used.
    #[serde(skip_serializing)]
    pub password: String,
    pub ssl_mode: SslMode,
    /// Skip certificate verification in `Prefer`/`Require` modes.
    pub accept_invalid_certs: bool,
    /// Extra root certificate (PEM) trusted for TLS connections.
    pub ca_cert_path: Option<String>,
}

/// The libpq `sslmode` values this crate understands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

impl ConnectionConfig {
    pub fn resolved_password(&self) -> String {
        if self.password.is_empty() {
            std::env::var("PGPASSWORD").unwrap_or_default()
        } else {
            self.password.clone()
        }
    }

    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={} sslmode={} connect_timeout=10",
            quote_conn_value(&self.host),
            self.port,
            quote_conn_value(&self.database),
            quote_conn_value(&self.username),
            quote_conn_value(&self.resolved_password()),
            self.ssl_mode.as_str()
        )
    }

    pub fn display_string(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            name: String::from("local"),
            host: String::from("localhost"),
            port: 5432,
            database: String::from("postgres"),
            username: String::from("postgres"),
            password: String::new(),
            ssl_mode: SslMode::default(),
            accept_invalid_certs: false,
            ca_cert_path: None,
        }
    }
}

/// Quote a value for a libpq key=value connection string.
fn quote_conn_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

#[cfg(feature = "postgres")]
mod pg {
    use std::time::Duration;

    use anyhow::{Context, Result};
    use postgres_native_tls::MakeTlsConnector;
    use tokio_postgres::{Client, NoTls};

    use super::{ConnectionConfig, SslMode};

    const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Open a client and drive its connection on a background task.
    pub async fn connect(config: &ConnectionConfig) -> Result<Client> {
        let conn_string = config.connection_string();
        tracing::info!(target = %config.display_string(), "connecting to PostgreSQL");

        match config.ssl_mode {
            SslMode::Disable => spawn_connection(&conn_string, NoTls).await,
            SslMode::Prefer | SslMode::Require => {
                spawn_connection(&conn_string, build_tls_connector(config, false)?).await
            }
            SslMode::VerifyCa | SslMode::VerifyFull => {
                spawn_connection(&conn_string, build_tls_connector(config, true)?).await
            }
        }
    }

    async fn spawn_connection<T>(conn_string: &str, tls: T) -> Result<Client>
    where
        T: tokio_postgres::tls::MakeTlsConnect<tokio_postgres::Socket> + Send + 'static,
        T::Stream: Send + 'static,
    {
        let (client, connection) =
            tokio::time::timeout(CONNECT_TIMEOUT, tokio_postgres::connect(conn_string, tls))
                .await
                .map_err(|_| anyhow::anyhow!("Connection timed out after 15s"))?
                .context("Failed to connect to PostgreSQL")?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "connection error");
            }
        });
        Ok(client)
    }

    fn build_tls_connector(config: &ConnectionConfig, strict_verify: bool) -> Result<MakeTlsConnector> {
        let mut builder = native_tls::TlsConnector::builder();

        if config.accept_invalid_certs && !strict_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        } else if let Some(ca_path) = &config.ca_cert_path {
            let pem = std::fs::read(ca_path)
                .with_context(|| format!("Failed to read CA certificate file: {}", ca_path))?;
            let cert = native_tls::Certificate::from_pem(&pem)
                .context("Failed to parse CA certificate")?;
            builder.add_root_certificate(cert);
        }

        let connector = builder.build().context("Failed to build TLS connector")?;
        Ok(MakeTlsConnector::new(connector))
    }
}

#[cfg(feature = "postgres")]
pub use pg::connect;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_quotes_values() {
        let config = ConnectionConfig {
            database: "sales db".into(),
            password: "it's".into(),
            ssl_mode: SslMode::Disable,
            ..Default::default()
        };
        assert_eq!(
            config.connection_string(),
            "host='localhost' port=5432 dbname='sales db' user='postgres' \
             password='it\\'s' sslmode=disable connect_timeout=10"
        );
    }

    #[test]
    fn test_display_string() {
        let config = ConnectionConfig::default();
        assert_eq!(config.display_string(), "postgres@localhost:5432/postgres");
    }

    #[test]
    fn test_toml_entry_uses_defaults() {
        let config: ConnectionConfig =
            toml::from_str("name = \"warehouse\"\nhost = \"db.internal\"\nssl_mode = \"verify-full\"")
                .unwrap();
        assert_eq!(config.name, "warehouse");
        assert_eq!(config.port, 5432);
        assert_eq!(config.ssl_mode, SslMode::VerifyFull);
    }

    #[test]
    fn test_password_is_not_serialized() {
        let config = ConnectionConfig {
            password: "secret".into(),
            ..Default::default()
        };
        let out = toml::to_string(&config).unwrap();
        assert!(!out.contains("secret"));
    }
}
