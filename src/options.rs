use std::sync::Arc;
use std::time::Duration;

use tokio_rustls::rustls::ClientConfig;

/// Builder for connection-time and operational settings. Every
/// `ConnectOption` field from the wire protocol plus the retry/timeout
/// knobs the connection state machine needs; construct with
/// [`ClientOptions::new`] and chain the `with_*` setters.
#[derive(Clone, Default)]
pub struct ClientOptions {
    pub(crate) verbose: bool,
    pub(crate) pedantic: bool,
    pub(crate) tls_required: bool,
    pub(crate) user: Option<String>,
    pub(crate) pass: Option<String>,
    pub(crate) auth_token: Option<String>,
    pub(crate) jwt: Option<String>,
    pub(crate) nkey_seed: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) echo: bool,
    pub(crate) headers: bool,
    pub(crate) no_responders: bool,

    pub(crate) retry_interval: Duration,
    pub(crate) retry_count: i64,
    pub(crate) connect_timeout: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) ping_interval: Duration,
    pub(crate) max_outstanding_pings: u32,
    pub(crate) inbox_prefix: Option<String>,
    pub(crate) tls_config: Option<Arc<ClientConfig>>,
}

impl ClientOptions {
    pub fn new() -> Self {
        ClientOptions {
            verbose: false,
            pedantic: false,
            tls_required: false,
            user: None,
            pass: None,
            auth_token: None,
            jwt: None,
            nkey_seed: None,
            name: None,
            echo: true,
            headers: true,
            no_responders: true,
            retry_interval: Duration::from_secs(2),
            retry_count: -1,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(120),
            max_outstanding_pings: 2,
            inbox_prefix: None,
            tls_config: None,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn pedantic(mut self, pedantic: bool) -> Self {
        self.pedantic = pedantic;
        self
    }

    pub fn tls_required(mut self, required: bool) -> Self {
        self.tls_required = required;
        self
    }

    pub fn user_pass(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.pass = Some(pass.into());
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn jwt(mut self, jwt: impl Into<String>) -> Self {
        self.jwt = Some(jwt.into());
        self
    }

    /// Authenticate with an Ed25519 nkey seed; the client signs the
    /// server's handshake nonce with it automatically.
    pub fn nkey_seed(mut self, seed: impl Into<String>) -> Self {
        self.nkey_seed = Some(seed.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Number of reconnect attempts before giving up; `-1` retries
    /// forever.
    pub fn retry_count(mut self, count: i64) -> Self {
        self.retry_count = count;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn max_outstanding_pings(mut self, max: u32) -> Self {
        self.max_outstanding_pings = max;
        self
    }

    pub fn inbox_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.inbox_prefix = Some(prefix.into());
        self
    }

    pub fn tls_config(mut self, config: Arc<ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// The configured TLS client config, or a default one built from the
    /// webpki roots bundle if none was supplied.
    pub(crate) fn tls_config_or_default(&self) -> Arc<ClientConfig> {
        self.tls_config.clone().unwrap_or_else(default_tls_config)
    }
}

fn default_tls_config() -> Arc<ClientConfig> {
    install_default_crypto_provider();
    let mut roots = tokio_rustls::rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

fn install_default_crypto_provider() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tokio_rustls::rustls::crypto::ring::default_provider().install_default();
    });
}
