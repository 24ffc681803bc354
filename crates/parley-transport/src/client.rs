//! Outbound connector client.
//!
//! Sends and updates activities through the conversation's service:
//!
//! ```text
//! POST {serviceUrl}/v3/conversations/{conversationId}/activities
//! PUT  {serviceUrl}/v3/conversations/{conversationId}/activities/{activityId}
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, ClientBuilder, Method, Url};
use tracing::{debug, trace, warn};

use parley_core::{
    Activity, ActivitySender, ApiError, ApiResult, BoxedCredentialProvider,
    ConversationReference, ResourceResponse, Token,
};

use crate::error::{TransportError, TransportResult, api_error};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`ActivitySender`] over the connector REST API.
///
/// App tokens are requested for the tenant of the conversation being
/// addressed and cached per tenant until they expire.
pub struct ConnectorClient {
    http: Client,
    credentials: Option<BoxedCredentialProvider>,
    tokens: Mutex<HashMap<Option<String>, Token>>,
}

impl ConnectorClient {
    pub fn new() -> TransportResult<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> TransportResult<Self> {
        let http = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self {
            http,
            credentials: None,
            tokens: Mutex::default(),
        })
    }

    /// Authenticates requests with the app token from `provider`.
    pub fn with_credentials(mut self, provider: BoxedCredentialProvider) -> Self {
        self.credentials = Some(provider);
        self
    }

    async fn bearer(&self, tenant: Option<&str>) -> Option<Token> {
        let provider = self.credentials.as_ref()?;
        let key = tenant.map(str::to_owned);
        if let Some(token) = self.tokens.lock().get(&key).filter(|t| !t.is_expired()) {
            return Some(token.clone());
        }

        match provider.app_token(tenant).await {
            Ok(token) => {
                self.tokens.lock().insert(key, token.clone());
                Some(token)
            }
            Err(err) => {
                warn!(%err, tenant, "Sending without a bearer token");
                None
            }
        }
    }

    async fn call(
        &self,
        method: Method,
        url: Url,
        reference: &ConversationReference,
        activity: &Activity,
    ) -> ApiResult<ResourceResponse> {
        trace!(%method, %url, r#type = %activity.activity_type(), "Connector request");

        let mut request = self.http.request(method, url).json(activity);
        let tenant = reference.conversation.tenant_id.as_deref();
        if let Some(token) = self.bearer(tenant).await {
            request = request.bearer_auth(token.value());
        }

        let response = request.send().await.map_err(api_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(api_error)?;
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            debug!("Connector answered without a resource id");
            return Ok(ResourceResponse::new(""));
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl ActivitySender for ConnectorClient {
    async fn send_activity(
        &self,
        reference: &ConversationReference,
        activity: &Activity,
    ) -> ApiResult<ResourceResponse> {
        let url = activities_url(&reference.service_url, reference.conversation_id(), None)?;
        self.call(Method::POST, url, reference, activity).await
    }

    async fn update_activity(
        &self,
        reference: &ConversationReference,
        id: &str,
        activity: &Activity,
    ) -> ApiResult<ResourceResponse> {
        let url = activities_url(&reference.service_url, reference.conversation_id(), Some(id))?;
        self.call(Method::PUT, url, reference, activity).await
    }
}

/// Builds the activities endpoint, percent-encoding the path segments.
pub fn activities_url(
    service_url: &str,
    conversation_id: &str,
    activity_id: Option<&str>,
) -> Result<Url, TransportError> {
    let invalid = || TransportError::InvalidServiceUrl(service_url.to_owned());
    let mut url = Url::parse(service_url).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }

    {
        let mut segments = url.path_segments_mut().map_err(|_| invalid())?;
        segments
            .pop_if_empty()
            .extend(["v3", "conversations", conversation_id, "activities"]);
        if let Some(id) = activity_id {
            segments.push(id);
        }
    }
    Ok(url)
}

impl std::fmt::Debug for ConnectorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorClient")
            .field("authenticated", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}
