//! TLS configuration
//!
//! This module provides TLS configuration builders for both client and server.

use openssl::ssl::{SslContextBuilder, SslMethod, SslVerifyMode, SslVersion};
use std::net::TcpStream;

/// TLS protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

impl TlsVersion {
    fn to_openssl_version(self) -> SslVersion {
        match self {
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
}

/// TLS configuration (immutable after building)
#[derive(Clone)]
pub struct TlsConfig {
    pub(crate) ctx: openssl::ssl::SslContext,
    pub(crate) is_server: bool,
    pub(crate) verify_peer: bool,
}

impl TlsConfig {
    pub fn client() -> Result<ClientConfigBuilder, TlsError> {
        ClientConfigBuilder::new()
    }

    pub fn server() -> Result<ServerConfigBuilder, TlsError> {
        ServerConfigBuilder::new()
    }

    pub fn verifies_peer(&self) -> bool {
        self.verify_peer
    }

    /// Perform a client handshake over `stream`
    ///
    /// `servername` is sent as SNI unless it is empty or an IP literal.
    pub fn connect(
        &self,
        stream: TcpStream,
        servername: &str,
    ) -> Result<super::TlsSessionOps, TlsError> {
        if self.is_server {
            return Err(TlsError::InvalidConfig(
                "Cannot use server config for client connection".to_string(),
            ));
        }
        super::session::TlsSessionOps::connect(stream, self, servername)
    }

    /// Perform a server handshake over `stream`
    pub fn accept(&self, stream: TcpStream) -> Result<super::TlsSessionOps, TlsError> {
        if !self.is_server {
            return Err(TlsError::InvalidConfig(
                "Cannot use client config for server accept".to_string(),
            ));
        }
        super::session::TlsSessionOps::accept(stream, self)
    }
}

/// Client configuration builder
pub struct ClientConfigBuilder {
    ctx_builder: SslContextBuilder,
    verify_peer: bool,
}

impl ClientConfigBuilder {
    fn new() -> Result<Self, TlsError> {
        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_client())?;

        // Default: don't verify peer
        ctx_builder.set_verify(SslVerifyMode::NONE);

        Ok(ClientConfigBuilder {
            ctx_builder,
            verify_peer: false,
        })
    }

    /// Restrict the negotiated protocol versions
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Result<Self, TlsError> {
        self.ctx_builder
            .set_min_proto_version(Some(min.to_openssl_version()))?;
        self.ctx_builder
            .set_max_proto_version(Some(max.to_openssl_version()))?;
        Ok(self)
    }

    /// Enable/disable peer certificate verification
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        if verify {
            self.ctx_builder.set_verify(SslVerifyMode::PEER);
        } else {
            self.ctx_builder.set_verify(SslVerifyMode::NONE);
        }
        self
    }

    pub fn build(self) -> TlsConfig {
        TlsConfig {
            ctx: self.ctx_builder.build(),
            is_server: false,
            verify_peer: self.verify_peer,
        }
    }
}

/// Server configuration builder
pub struct ServerConfigBuilder {
    ctx_builder: SslContextBuilder,
    has_cert: bool,
}

impl ServerConfigBuilder {
    fn new() -> Result<Self, TlsError> {
        let ctx_builder = SslContextBuilder::new(SslMethod::tls_server())?;

        Ok(ServerConfigBuilder {
            ctx_builder,
            has_cert: false,
        })
    }

    /// Load certificate and private key from one PEM bundle
    pub fn cert_pem(mut self, pem: &[u8]) -> Result<Self, TlsError> {
        use openssl::pkey::PKey;
        use openssl::x509::X509;

        let cert = X509::from_pem(pem)
            .map_err(|e| TlsError::Certificate(format!("Failed to load certificate: {}", e)))?;
        let key = PKey::private_key_from_pem(pem)
            .map_err(|e| TlsError::Certificate(format!("Failed to load private key: {}", e)))?;

        self.ctx_builder.set_certificate(&cert)?;
        self.ctx_builder.set_private_key(&key)?;
        self.has_cert = true;
        Ok(self)
    }

    /// Build the configuration
    ///
    /// Without a certificate, a self-signed one for `localhost` is generated.
    pub fn build(mut self) -> Result<TlsConfig, TlsError> {
        if !self.has_cert {
            let (cert, key) = super::cert::self_signed("localhost")?;
            self.ctx_builder.set_certificate(&cert)?;
            self.ctx_builder.set_private_key(&key)?;
        }
        self.ctx_builder.check_private_key()?;

        Ok(TlsConfig {
            ctx: self.ctx_builder.build(),
            is_server: true,
            verify_peer: false,
        })
    }
}
