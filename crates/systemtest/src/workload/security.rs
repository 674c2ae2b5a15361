//! Client security profiles and the connection properties they render.

use k8s_openapi::api::core::v1::Secret;

use crate::{Error, Result};

pub const TRUSTSTORE_LOCATION: &str = "/tmp/truststore.p12";
pub const KEYSTORE_LOCATION: &str = "/tmp/keystore.p12";

/// Listener the client connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Plain,
    Tls,
}

impl Transport {
    pub fn from_tls(tls: bool) -> Self {
        if tls {
            Self::Tls
        } else {
            Self::Plain
        }
    }

    pub fn is_encrypted(self) -> bool {
        matches!(self, Self::Tls)
    }
}

/// SCRAM-SHA-512 username and password.
#[derive(Clone, PartialEq, Eq)]
pub struct ScramCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ScramCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScramCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ScramCredentials {
    /// Read the password of `user` from its credential secret.
    pub fn from_secret(user: &str, secret: &Secret) -> Result<Self> {
        let from_data = secret
            .data
            .as_ref()
            .and_then(|d| d.get("password"))
            .map(|b| String::from_utf8_lossy(&b.0).into_owned());
        let from_string_data = || {
            secret
                .string_data
                .as_ref()
                .and_then(|d| d.get("password"))
                .cloned()
        };
        let password = from_data.or_else(from_string_data).ok_or_else(|| {
            Error::Configuration(format!("The Secret {user} lacks the 'password' key"))
        })?;
        Ok(Self {
            username: user.to_string(),
            password,
        })
    }

    fn jaas_block(&self) -> String {
        format!(
            "sasl.mechanism=SCRAM-SHA-512\n\
             sasl.jaas.config=org.apache.kafka.common.security.scram.ScramLoginModule required \\\n\
             username=\"{}\" \\\n\
             password=\"{}\";\n",
            self.username, self.password
        )
    }
}

/// The user a workload authenticates as.
///
/// SCRAM credentials and a TLS client certificate may both be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub name: String,
    pub scram: Option<ScramCredentials>,
    pub tls_certificate: bool,
}

impl ClientIdentity {
    pub fn scram(credentials: ScramCredentials) -> Self {
        Self {
            name: credentials.username.clone(),
            scram: Some(credentials),
            tls_certificate: false,
        }
    }

    pub fn tls(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scram: None,
            tls_certificate: true,
        }
    }

    /// A named user without client credentials (authorization only).
    pub fn anonymous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scram: None,
            tls_certificate: false,
        }
    }
}

/// Value of the client `security.protocol` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityProtocol {
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl SecurityProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plaintext => "PLAINTEXT",
            Self::Ssl => "SSL",
            Self::SaslPlaintext => "SASL_PLAINTEXT",
            Self::SaslSsl => "SASL_SSL",
        }
    }
}

/// Producer or consumer half of a client configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRole {
    Producer,
    Consumer,
}

impl ClientRole {
    fn base_line(self) -> &'static str {
        match self {
            Self::Producer => "acks=all",
            Self::Consumer => "auto.offset.reset=earliest",
        }
    }

    /// Prefix of this role's environment variables.
    pub fn env_prefix(self) -> &'static str {
        match self {
            Self::Producer => "PRODUCER",
            Self::Consumer => "CONSUMER",
        }
    }
}

/// Transport plus optional identity, fixed once per workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityProfile {
    pub transport: Transport,
    pub identity: Option<ClientIdentity>,
}

impl SecurityProfile {
    pub fn new(transport: Transport, identity: Option<ClientIdentity>) -> Self {
        Self { transport, identity }
    }

    pub fn plain() -> Self {
        Self::new(Transport::Plain, None)
    }

    fn scram(&self) -> Option<&ScramCredentials> {
        self.identity.as_ref().and_then(|i| i.scram.as_ref())
    }

    pub fn uses_client_certificate(&self) -> bool {
        self.identity.as_ref().is_some_and(|i| i.tls_certificate)
    }

    pub fn protocol(&self) -> SecurityProtocol {
        match (self.transport, self.scram().is_some()) {
            (Transport::Tls, true) => SecurityProtocol::SaslSsl,
            (Transport::Tls, false) => SecurityProtocol::Ssl,
            (Transport::Plain, true) => SecurityProtocol::SaslPlaintext,
            (Transport::Plain, false) => SecurityProtocol::Plaintext,
        }
    }

    /// Client properties for `role`, one `key=value` per line.
    ///
    /// Each combination of transport, SCRAM credentials and client certificate
    /// has its own arm. Trust material always follows the credential block.
    pub fn render(&self, role: ClientRole) -> String {
        let mut config = format!(
            "{}\nsecurity.protocol={}\n",
            role.base_line(),
            self.protocol().as_str()
        );
        let sections: [String; 3] = match (self.transport, self.scram(), self.uses_client_certificate()) {
            (Transport::Plain, None, false) => Default::default(),
            (Transport::Plain, None, true) => [String::new(), String::new(), keystore_lines()],
            (Transport::Plain, Some(scram), false) => [scram.jaas_block(), String::new(), String::new()],
            (Transport::Plain, Some(scram), true) => [scram.jaas_block(), String::new(), keystore_lines()],
            (Transport::Tls, None, false) => [String::new(), truststore_lines(), String::new()],
            (Transport::Tls, None, true) => [String::new(), truststore_lines(), keystore_lines()],
            (Transport::Tls, Some(scram), false) => [scram.jaas_block(), truststore_lines(), String::new()],
            (Transport::Tls, Some(scram), true) => [scram.jaas_block(), truststore_lines(), keystore_lines()],
        };
        config.extend(sections);
        config
    }
}

fn truststore_lines() -> String {
    format!("ssl.truststore.location={TRUSTSTORE_LOCATION}\nssl.truststore.type=pkcs12\n")
}

fn keystore_lines() -> String {
    format!("ssl.keystore.location={KEYSTORE_LOCATION}\nssl.keystore.type=pkcs12\n")
}
