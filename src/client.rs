use crate::{
    error::{Error, Result},
    job::CompleteJobBuilder,
    oauth::{AuthInterceptor, OAuthConfig},
    process::{CreateProcessInstanceWithResultBuilder, DeployResourceBuilder},
    proto::gateway_client::GatewayClient,
    topology::TopologyBuilder,
    worker::JobWorkerBuilder,
};
use std::fmt::Debug;
use tonic::{
    service::interceptor::InterceptedService,
    transport::{Channel, ClientTlsConfig, Endpoint},
};

/// Client used to communicate with the Zeebe gateway.
///
/// Cloning is cheap, all clones share the underlying channel.
#[derive(Clone, Debug)]
pub struct Client {
    pub(crate) gateway_client: GatewayClient<InterceptedService<Channel, AuthInterceptor>>,
    pub(crate) auth_interceptor: AuthInterceptor,
    pub(crate) current_job_key: Option<i64>,
}

impl Client {
    /// Build a new Zeebe client from a given configuration.
    ///
    /// The connection is established lazily on the first command. When OAuth
    /// is configured a token refresh task is spawned, so this must be called
    /// from within a tokio runtime.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let ClientConfig {
            endpoints,
            tls,
            auth,
        } = config;
        let channel = Self::build_channel(endpoints, tls)?;
        let auth_interceptor = match auth {
            Some(auth) => AuthInterceptor::init(auth)?,
            None => AuthInterceptor::default(),
        };

        Ok(Client {
            gateway_client: GatewayClient::with_interceptor(channel, auth_interceptor.clone()),
            auth_interceptor,
            current_job_key: None,
        })
    }

    /// Future that resolves when the first OAuth token is available.
    ///
    /// Resolves immediately when the client is not configured for OAuth.
    pub async fn auth_initialized(&self) -> Result<()> {
        self.auth_interceptor.auth_initialized().await
    }

    /// Obtains the current topology of the cluster the gateway is part of.
    pub fn topology(&self) -> TopologyBuilder {
        TopologyBuilder::new(self.clone())
    }

    /// Deploys one or more resources (e.g. BPMN processes) to Zeebe. Note that
    /// this is an atomic call, i.e. either all resources are deployed, or none
    /// of them are.
    pub fn deploy_resource(&self) -> DeployResourceBuilder {
        DeployResourceBuilder::new(self.clone())
    }

    /// Creates and starts an instance of the specified process, responding
    /// once the process instance has completed.
    ///
    /// Note that only processes with none start events can be started through
    /// this command.
    pub fn create_process_instance_with_result(&self) -> CreateProcessInstanceWithResultBuilder {
        CreateProcessInstanceWithResultBuilder::new(self.clone())
    }

    /// Create a new job worker builder.
    pub fn job_worker(&self) -> JobWorkerBuilder {
        JobWorkerBuilder::new(self.clone())
    }

    /// Completes a job with the given payload, which allows completing the
    /// associated service task.
    pub fn complete_job(&self) -> CompleteJobBuilder {
        CompleteJobBuilder::new(self.clone())
    }

    fn build_channel(endpoints: Vec<String>, tls: Option<ClientTlsConfig>) -> Result<Channel> {
        let mut endpoints = endpoints
            .into_iter()
            .map(|uri| {
                Channel::from_shared(uri.clone()).map_err(|err| Error::InvalidGatewayUri {
                    uri,
                    message: err.to_string(),
                })
            })
            .map(|endpoint| {
                endpoint.and_then(|endpoint| match &tls {
                    Some(tls) => endpoint.tls_config(tls.to_owned()).map_err(From::from),
                    None => Ok(endpoint),
                })
            })
            .collect::<Result<Vec<Endpoint>>>()?;

        match endpoints.len() {
            0 => Err(Error::InvalidParameters("at least one endpoint must be set")),
            1 => Ok(endpoints.remove(0).connect_lazy()),
            _ => Ok(Channel::balance_list(endpoints.into_iter())),
        }
    }
}

/// Config for establishing zeebe client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// The endpoints the client should connect to
    pub endpoints: Vec<String>,
    /// TLS configuration, required for `https` endpoints
    pub tls: Option<ClientTlsConfig>,
    /// OAuth credentials
    pub auth: Option<OAuthConfig>,
}

impl ClientConfig {
    /// Set the grpc endpoints the client should connect to.
    pub fn with_endpoints(endpoints: Vec<String>) -> Self {
        ClientConfig {
            endpoints,
            tls: None,
            auth: None,
        }
    }

    /// Connect to a single gateway. `https` gateways use TLS with the
    /// platform's root certificates.
    pub fn with_endpoint<T: Into<String>>(endpoint: T) -> Self {
        let endpoint = endpoint.into();
        let tls = endpoint
            .starts_with("https://")
            .then(|| ClientTlsConfig::new().with_native_roots());

        ClientConfig {
            tls,
            ..ClientConfig::with_endpoints(vec![endpoint])
        }
    }

    /// Authenticate every request with OAuth client credentials.
    pub fn with_auth(self, auth: OAuthConfig) -> Self {
        ClientConfig {
            auth: Some(auth),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_invalid_gateway_uri() {
        let err = Client::from_config(ClientConfig::with_endpoints(vec![
            "not a uri".to_string()
        ]))
        .unwrap_err();

        assert!(matches!(err, Error::InvalidGatewayUri { uri, .. } if uri == "not a uri"));
    }

    #[tokio::test]
    async fn rejects_empty_endpoint_list() {
        let err = Client::from_config(ClientConfig::with_endpoints(Vec::new())).unwrap_err();

        assert!(matches!(err, Error::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn plaintext_client_needs_no_auth() {
        let client =
            Client::from_config(ClientConfig::with_endpoint("http://127.0.0.1:26500")).unwrap();

        assert!(client.auth_initialized().await.is_ok());
        assert!(client.current_job_key.is_none());
    }

    #[test]
    fn https_endpoint_enables_tls() {
        assert!(ClientConfig::with_endpoint("https://zeebe.example.com:443")
            .tls
            .is_some());
        assert!(ClientConfig::with_endpoint("http://localhost:26500")
            .tls
            .is_none());
    }
}
