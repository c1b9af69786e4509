//! TLS termination tests against the fixture certificate in tests/certs

mod support;

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use sawmill_core::{CloseReason, TlsSettings};
use sawmill_server::ServerBuilder;

use support::{read_ack, send_frame, start_with_builder, wait_until, RecordingListener};

const CERT_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/certs/cert.pem");
const KEY_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/certs/key.pem");

fn fixture_tls() -> TlsSettings {
    TlsSettings {
        cert_path: CERT_PATH.into(),
        key_path: KEY_PATH.into(),
    }
}

/// Client config trusting only the fixture certificate
fn client_config() -> Arc<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    for cert in CertificateDer::pem_file_iter(CERT_PATH).expect("fixture cert missing") {
        roots.add(cert.expect("fixture cert unreadable")).expect("fixture cert rejected");
    }
    Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

#[tokio::test]
async fn test_tls_client_end_to_end() {
    let listener = RecordingListener::new();
    let builder = ServerBuilder::new()
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .inactivity_timeout(Duration::from_secs(5))
        .shutdown_grace(Duration::from_secs(5))
        .tls(fixture_tls())
        .listener(listener.clone());
    let (server, addr, _handle) = start_with_builder(builder).await;
    assert!(server.tls_enabled());

    let connector = TlsConnector::from(client_config());
    let tcp = TcpStream::connect(addr).await.unwrap();
    let name = ServerName::try_from("localhost").unwrap();
    let mut stream = connector.connect(name, tcp).await.expect("handshake failed");

    for sequence in 1..=5u64 {
        send_frame(&mut stream, sequence, b"over tls").await;
        assert_eq!(read_ack(&mut stream).await, sequence);
    }
    drop(stream);

    assert!(wait_until(Duration::from_secs(2), || listener.close_count() == 1).await);
    assert_eq!(listener.messages.lock().unwrap().len(), 5);
    assert_eq!(listener.exception_count(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_plaintext_client_rejected_on_tls_port() {
    let listener = RecordingListener::new();
    let builder = ServerBuilder::new()
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .inactivity_timeout(Duration::from_secs(5))
        .shutdown_grace(Duration::from_secs(5))
        .tls(fixture_tls())
        .listener(listener.clone());
    let (server, addr, _handle) = start_with_builder(builder).await;

    // Raw frame bytes are not a ClientHello; the handshake must fail.
    let mut client = TcpStream::connect(addr).await.unwrap();
    send_frame(&mut client, 1, b"not a handshake").await;

    let mut rest = Vec::new();
    let _ = client.read_to_end(&mut rest).await;

    assert!(wait_until(Duration::from_secs(2), || listener.close_count() == 1).await);
    assert_eq!(listener.closes.lock().unwrap()[0].1, CloseReason::ProtocolError);
    assert_eq!(listener.exception_count(), 1);
    assert!(listener.messages.lock().unwrap().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_missing_certificate_fails_construction() {
    let result = ServerBuilder::new()
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .tls(TlsSettings {
            cert_path: "/nonexistent/cert.pem".into(),
            key_path: "/nonexistent/key.pem".into(),
        })
        .build();
    assert!(result.is_err());
}
