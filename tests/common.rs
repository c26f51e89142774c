//! Shared test helpers.
#![allow(dead_code)]

use multicert::config::Settings;
use multicert::registry::Classification;
use rcgen::{CertificateParams, KeyPair};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Create a temp directory for certificate files.
/// Uses current dir (workspace) so sandbox allows full access.
pub fn temp_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("multicert_test_")
        .tempdir_in(std::env::current_dir().unwrap_or_else(|_| std::path::Path::new(".").into()))
        .expect("temp dir")
}

/// A minted leaf certificate and its key.
pub struct Issued {
    pub cert_pem: String,
    pub key_pem: String,
    pub cert_der: Vec<u8>,
}

fn issue_with(domain: &str, adjust: impl FnOnce(&mut CertificateParams)) -> Issued {
    let key = KeyPair::generate().expect("generate key");
    let mut params = CertificateParams::new(vec![domain.to_string()]).expect("params");
    params.distinguished_name = rcgen::DistinguishedName::new();
    params.distinguished_name.push(
        rcgen::DnType::CommonName,
        rcgen::DnValue::Utf8String(domain.to_string()),
    );
    adjust(&mut params);
    let cert = params.self_signed(&key).expect("self-sign");
    Issued {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
        cert_der: cert.der().to_vec(),
    }
}

/// Self-signed cert for `domain`.
pub fn issue(domain: &str) -> Issued {
    issue_with(domain, |_| {})
}

/// Self-signed cert for `domain` that expired yesterday.
pub fn issue_expired(domain: &str) -> Issued {
    issue_with(domain, |params| {
        let now = time::OffsetDateTime::now_utc();
        params.not_before = now - time::Duration::days(30);
        params.not_after = now - time::Duration::days(1);
    })
}

/// Write `<name>-chain.pem` and `<name>-key.pem` into `dir`.
pub fn write_pair(dir: &Path, name: &str, issued: &Issued) -> (PathBuf, PathBuf) {
    let chain = dir.join(format!("{name}-chain.pem"));
    let key = dir.join(format!("{name}-key.pem"));
    std::fs::write(&chain, &issued.cert_pem).unwrap();
    std::fs::write(&key, &issued.key_pem).unwrap();
    (chain, key)
}

/// Settings on 127.0.0.1:0 with a default pair written into `dir`.
pub fn settings_with_default(dir: &Path, default: &Issued) -> Settings {
    let (chain, key) = write_pair(dir, "default", default);
    let mut settings = Settings::with_base(dir);
    settings.listen.address = IpAddr::V4(Ipv4Addr::LOCALHOST);
    settings.listen.port = 0;
    settings.default.chain = chain;
    settings.default.key = key;
    settings.limits.read_timeout_secs = 5;
    settings.limits.shutdown_grace_secs = 1;
    settings
}

/// Add a `[[certs]]` entry.
pub fn add_cert(settings: &mut Settings, domain: &str, chain: PathBuf, key: PathBuf, class: &str) {
    settings.certs.push(multicert::config::CertSpec {
        domain: domain.to_string(),
        chain,
        key,
        classification: Classification::from(class),
    });
}

/// Running server plus the handle to stop it.
pub struct TestServer {
    pub addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn start(settings: &Settings) -> Self {
        let registry = Arc::new(settings.registry().expect("registry"));
        let acceptor = multicert::serve::prepare(settings, registry).expect("prepare");
        let addr = acceptor.local_addr().expect("local addr");
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(acceptor.run(async {
            let _ = stopped.await;
        }));
        Self {
            addr,
            stop: Some(stop),
            task,
        }
    }

    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task.await.expect("join").expect("run");
    }
}

/// Accepts any server certificate; the tests only look at what was sent.
#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Connect with `server_name` as SNI. An IP address sends no SNI.
pub async fn connect(addr: SocketAddr, server_name: &str) -> TlsStream<TcpStream> {
    let provider = multicert::credential::default_provider();
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));
    let tcp = TcpStream::connect(addr).await.expect("tcp connect");
    let name = ServerName::try_from(server_name.to_string()).expect("server name");
    connector.connect(name, tcp).await.expect("tls connect")
}

/// DER of the leaf certificate the server presented.
pub fn served_leaf(stream: &TlsStream<TcpStream>) -> Vec<u8> {
    stream
        .get_ref()
        .1
        .peer_certificates()
        .and_then(|certs| certs.first())
        .map(|c| c.to_vec())
        .expect("peer certificate")
}
