use std::marker::PhantomData;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::HTTP_TRANSPORT;
use crate::context::ConquerorContext;
use crate::dispatch::{TransportClient, TransportClientBuilder};
use crate::error::{MessagingError, TransportFailure};
use crate::message::Message;
use crate::pipeline::TransportType;
use crate::services::Services;
use crate::transport::{CONTEXT_HEADER, MESSAGE_ID_HEADER, TRACE_ID_HEADER};

/// Sends messages to a remote [`router`](super::router) over HTTP.
///
/// Uses a `reqwest::Client` registered in [`Services`] if there is one,
/// otherwise its own.
pub struct HttpTransportClient<M> {
    base_url: String,
    client: reqwest::Client,
    headers: Vec<(String, String)>,
    _message: PhantomData<fn(M)>,
}

impl<M: Message> HttpTransportClient<M> {
    /// Create a client for `base_url`, which must be an `http://` or `https://` URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, MessagingError> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(MessagingError::InvalidConfiguration(format!(
                "http transport needs an http(s) base url, got {:?}",
                base_url
            )));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            headers: Vec::new(),
            _message: PhantomData,
        })
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Add a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn url(&self) -> String {
        format!("{}/{}", self.base_url, M::NAME)
    }
}

#[async_trait]
impl<M: Message> TransportClient<M> for HttpTransportClient<M> {
    fn transport_type_name(&self) -> &str {
        HTTP_TRANSPORT
    }

    async fn send(
        &self,
        message: M,
        services: &Services,
        context: &ConquerorContext,
        cancellation: CancellationToken,
    ) -> Result<M::Response, MessagingError> {
        let transport_type = TransportType::client(HTTP_TRANSPORT);
        let client = services
            .get::<reqwest::Client>()
            .map(|client| (*client).clone())
            .unwrap_or_else(|| self.client.clone());

        let mut request = client
            .post(self.url())
            .json(&message)
            .header(TRACE_ID_HEADER, context.trace_id());
        if let Some(message_id) = context.message_id() {
            request = request.header(MESSAGE_ID_HEADER, message_id);
        }
        if let Some(encoded) = context.encode_downstream() {
            request = request.header(CONTEXT_HEADER, encoded);
        }
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = tokio::select! {
            _ = cancellation.cancelled() => return Err(MessagingError::Cancelled),
            response = request.send() => response.map_err(|e| {
                TransportFailure::new(transport_type.clone(), &message, "request failed").with_source(e)
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or(body);
            return Err(TransportFailure::new(transport_type, &message, reason)
                .with_status(status.as_u16())
                .into());
        }

        let upstream: Vec<String> = response
            .headers()
            .get_all(CONTEXT_HEADER)
            .iter()
            .filter_map(|value| value.to_str().ok().map(str::to_string))
            .collect();
        context.decode_into(upstream)?;

        response.json::<M::Response>().await.map_err(|e| {
            TransportFailure::new(transport_type, &message, "invalid response body")
                .with_status(status.as_u16())
                .with_source(e)
                .into()
        })
    }
}

/// Adds `use_http` to [`TransportClientBuilder`].
pub trait HttpTransportClientBuilderExt {
    fn use_http<M: Message>(
        &self,
        base_url: impl Into<String>,
    ) -> Result<Box<dyn TransportClient<M>>, MessagingError>;
}

impl HttpTransportClientBuilderExt for TransportClientBuilder {
    fn use_http<M: Message>(
        &self,
        base_url: impl Into<String>,
    ) -> Result<Box<dyn TransportClient<M>>, MessagingError> {
        Ok(Box::new(HttpTransportClient::<M>::new(base_url)?))
    }
}
