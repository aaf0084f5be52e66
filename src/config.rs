use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use pgwire::tokio::TlsAcceptor;
use pgwire::tokio::tokio_rustls::rustls::ServerConfig;

pub const WAL_FILE_NAME: &str = "lodgr.wal";

/// Server settings, read once from `LODGR_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub metrics_port: Option<u16>,
    /// Base URL of the quiz/search service. Unset means fallbacks only.
    pub search_url: Option<String>,
    pub search_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5433,
            bind: "0.0.0.0".into(),
            data_dir: PathBuf::from("./data"),
            password: "lodgr".into(),
            max_connections: 256,
            compact_threshold: 1000,
            tls_cert: None,
            tls_key: None,
            metrics_port: None,
            search_url: None,
            search_timeout: Duration::from_millis(3000),
        }
    }
}

impl Config {
    pub fn from_env() -> io::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> io::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();
        Ok(Self {
            port: parsed(&get, "LODGR_PORT")?.unwrap_or(defaults.port),
            bind: get("LODGR_BIND").unwrap_or(defaults.bind),
            data_dir: get("LODGR_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            password: get("LODGR_PASSWORD").unwrap_or(defaults.password),
            max_connections: parsed(&get, "LODGR_MAX_CONNECTIONS")?.unwrap_or(defaults.max_connections),
            compact_threshold: parsed(&get, "LODGR_COMPACT_THRESHOLD")?.unwrap_or(defaults.compact_threshold),
            tls_cert: get("LODGR_TLS_CERT"),
            tls_key: get("LODGR_TLS_KEY"),
            metrics_port: parsed(&get, "LODGR_METRICS_PORT")?,
            search_url: get("LODGR_SEARCH_URL").map(|u| u.trim_end_matches('/').to_string()),
            search_timeout: parsed(&get, "LODGR_SEARCH_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.search_timeout),
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn tls_acceptor(&self) -> io::Result<Option<TlsAcceptor>> {
        load_tls_acceptor(self.tls_cert.as_deref(), self.tls_key.as_deref())
    }
}

fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> io::Result<Option<T>> {
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| io::Error::new(ErrorKind::InvalidInput, format!("{key}: invalid value '{raw}'")))
        })
        .transpose()
}

pub fn load_tls_acceptor(cert_path: Option<&str>, key_path: Option<&str>) -> io::Result<Option<TlsAcceptor>> {
    let (cert_path, key_path) = match (cert_path, key_path) {
        (None, None) => return Ok(None),
        (Some(c), Some(k)) => (c, k),
        _ => {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "both LODGR_TLS_CERT and LODGR_TLS_KEY must be set, or neither",
            ));
        }
    };

    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?)).collect::<Result<_, _>>()?;

    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))?
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "no private key found in key file"))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;

    config.alpn_protocols = vec![b"postgresql".to_vec()];

    Ok(Some(TlsAcceptor::from(Arc::new(config))))
}
