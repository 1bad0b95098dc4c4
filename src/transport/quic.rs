// File: quic.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use async_trait::async_trait;
use log::{debug, info, warn};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{Connection, Stream};
use crate::error::{RaceError, RaceResult};
use crate::frame::{
    write_settings_frame, SETTINGS_QPACK_BLOCKED_STREAMS, SETTINGS_QPACK_MAX_TABLE_CAPACITY,
};

const ALPN_H3: &[u8] = b"h3";
const STREAM_TYPE_CONTROL: u8 = 0x00;

#[derive(Debug, Clone)]
pub struct QuicOptions {
    pub connect_timeout: Duration,
    /// Accept any server certificate. Lab targets only.
    pub insecure: bool,
}

impl Default for QuicOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5000),
            insecure: false,
        }
    }
}

/// An HTTP/3 client connection over quinn.
pub struct QuicConnection {
    endpoint: quinn::Endpoint,
    connection: quinn::Connection,
    // kept open for the lifetime of the connection
    _control: quinn::SendStream,
}

impl QuicConnection {
    pub async fn connect(url: &Url, options: &QuicOptions) -> RaceResult<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| RaceError::InvalidRequest("url has no host".to_string()))?;
        let port = url.port_or_known_default().unwrap_or(443);
        let addr = resolve(host, port).await?;

        let bind: SocketAddr = if addr.is_ipv6() {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        };
        let mut endpoint = quinn::Endpoint::client(bind)
            .map_err(|e| RaceError::Transport(format!("endpoint: {}", e)))?;
        endpoint.set_default_client_config(client_config(options.insecure)?);

        let server_name = host.trim_start_matches('[').trim_end_matches(']');
        debug!("Connecting to {} ({}) via QUIC", server_name, addr);
        let connecting = endpoint
            .connect(addr, server_name)
            .map_err(|e| RaceError::Transport(format!("connect {}: {}", addr, e)))?;
        let connection = match tokio::time::timeout(options.connect_timeout, connecting).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Err(RaceError::Transport(format!("handshake: {}", e))),
            Err(_) => return Err(RaceError::Timeout(options.connect_timeout)),
        };
        info!("QUIC connection established to {}", addr);

        let control = open_control_stream(&connection).await?;
        Ok(Self {
            endpoint,
            connection,
            _control: control,
        })
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    pub async fn close(self) {
        self.connection.close(0u32.into(), b"done");
        self.endpoint.wait_idle().await;
    }
}

#[async_trait]
impl Connection for QuicConnection {
    async fn open_bidirectional_stream(&self) -> RaceResult<Box<dyn Stream>> {
        let (send, recv) = self
            .connection
            .open_bi()
            .await
            .map_err(|e| RaceError::Open(e.to_string()))?;
        Ok(Box::new(QuicStream { send, recv }))
    }
}

pub struct QuicStream {
    send: quinn::SendStream,
    recv: quinn::RecvStream,
}

#[async_trait]
impl Stream for QuicStream {
    fn id(&self) -> u64 {
        quinn::VarInt::from(self.send.id()).into_inner()
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.send
            .write_all(buf)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.recv.read(buf).await {
            Ok(Some(n)) => Ok(n),
            Ok(None) => Ok(0),
            Err(e) => Err(io::Error::new(io::ErrorKind::ConnectionReset, e)),
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        self.send
            .finish()
            .map_err(|e| io::Error::new(io::ErrorKind::NotConnected, e))
    }
}

async fn resolve(host: &str, port: u16) -> RaceResult<SocketAddr> {
    tokio::net::lookup_host((host.trim_start_matches('[').trim_end_matches(']'), port))
        .await
        .map_err(|e| RaceError::Transport(format!("resolve {}: {}", host, e)))?
        .next()
        .ok_or_else(|| RaceError::Transport(format!("no address for {}", host)))
}

/// Client control stream: stream type, then SETTINGS announcing a zero
/// capacity QPACK dynamic table.
async fn open_control_stream(connection: &quinn::Connection) -> RaceResult<quinn::SendStream> {
    let mut control = connection
        .open_uni()
        .await
        .map_err(|e| RaceError::Open(format!("control stream: {}", e)))?;
    let mut bytes = vec![STREAM_TYPE_CONTROL];
    bytes.extend(write_settings_frame(&[
        (SETTINGS_QPACK_MAX_TABLE_CAPACITY, 0),
        (SETTINGS_QPACK_BLOCKED_STREAMS, 0),
    ])?);
    control
        .write_all(&bytes)
        .await
        .map_err(|e| RaceError::Write(io::Error::new(io::ErrorKind::BrokenPipe, e)))?;
    debug!("Control stream opened with SETTINGS");
    Ok(control)
}

fn client_config(insecure: bool) -> RaceResult<quinn::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let mut tls = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| RaceError::Transport(format!("tls: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    tls.alpn_protocols = vec![ALPN_H3.to_vec()];
    if insecure {
        warn!("Certificate verification disabled");
        tls.dangerous()
            .set_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)));
    }

    let quic = quinn::crypto::rustls::QuicClientConfig::try_from(tls)
        .map_err(|e| RaceError::Transport(format!("quic tls: {}", e)))?;
    Ok(quinn::ClientConfig::new(Arc::new(quic)))
}

#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
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
