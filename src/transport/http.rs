//! REST transport over `reqwest`.
//!
//! # Route mapping
//!
//! | Operation    | Request                                              |
//! |--------------|------------------------------------------------------|
//! | list         | `GET {base}/{resource}?page&limit&sortBy&sortOrder&…` |
//! | getById      | `GET {base}/{resource}/{id}`                         |
//! | create       | `POST {base}/{resource}`                             |
//! | update       | `PUT {base}/{resource}/{id}`                         |
//! | delete       | `DELETE {base}/{resource}/{id}`                      |
//! | createMany   | `POST {base}/{resource}/bulk`                        |
//! | updateMany   | `PUT {base}/{resource}/bulk`                         |
//! | deleteMany   | `DELETE {base}/{resource}/bulk`                      |
//! | export       | `GET {base}/{resource}/export?format=…&…`            |
//! | import       | `POST {base}/{resource}/import` (multipart `file`)   |
//!
//! Non-2xx responses become [`RawFailure::Status`] with the body decoded as an
//! [`ErrorBody`] when it is JSON. Connection failures become
//! [`RawFailure::Network`].

use super::{Envelope, ExportFormat, ImportFile, ImportReport, ListEnvelope, Transport, TransportResult};
use crate::entity::Entity;
use crate::key::ListParams;
use crate::normalizer::{ErrorBody, RawFailure};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

impl From<reqwest::Error> for RawFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RawFailure::Exception(format!("malformed response: {}", e))
        } else {
            RawFailure::Network(e.to_string())
        }
    }
}

#[derive(Serialize)]
struct BulkUpdate<'a, I, P> {
    id: &'a I,
    data: &'a P,
}

#[derive(Serialize)]
struct BulkDelete<'a, I> {
    ids: &'a [I],
}

/// HTTP transport for any [`Entity`], routed by [`Entity::resource`].
///
/// Cheap to clone; clones share the connection pool.
///
/// ```no_run
/// use resource_kit::transport::HttpTransport;
///
/// let transport = HttpTransport::new("https://api.example.com/v1")
///     .with_bearer_token("token-from-login");
/// ```
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Use a preconfigured client (timeouts, proxies, TLS roots).
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        HttpTransport {
            client,
            base_url,
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url<T: Entity>(&self, suffix: &str) -> String {
        format!("{}/{}{}", self.base_url, T::resource(), suffix)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        debug!("» HTTP {} {}", method, url);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send and fail on non-2xx, decoding the error body when possible.
    async fn send(&self, request: RequestBuilder) -> TransportResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let bytes = response.bytes().await.unwrap_or_default();
        let body = serde_json::from_slice::<ErrorBody>(&bytes).ok();
        debug!("HTTP {} with error body {:?}", status, body);
        Err(RawFailure::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json<D: DeserializeOwned>(&self, request: RequestBuilder) -> TransportResult<D> {
        let bytes = self.send(request).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl<T: Entity> Transport<T> for HttpTransport {
    async fn list(&self, params: &ListParams) -> TransportResult<ListEnvelope<T>> {
        let request = self
            .request(Method::GET, self.url::<T>(""))
            .query(&params.query_pairs());
        self.send_json(request).await
    }

    async fn get(&self, id: &T::Id) -> TransportResult<Envelope<T>> {
        let request = self.request(Method::GET, self.url::<T>(&format!("/{}", id)));
        self.send_json(request).await
    }

    async fn create(&self, patch: &T::Patch) -> TransportResult<Envelope<T>> {
        let request = self.request(Method::POST, self.url::<T>("")).json(patch);
        self.send_json(request).await
    }

    async fn update(&self, id: &T::Id, patch: &T::Patch) -> TransportResult<Envelope<T>> {
        let request = self
            .request(Method::PUT, self.url::<T>(&format!("/{}", id)))
            .json(patch);
        self.send_json(request).await
    }

    /// An empty 2xx body counts as success.
    async fn delete(&self, id: &T::Id) -> TransportResult<Envelope<()>> {
        let request = self.request(Method::DELETE, self.url::<T>(&format!("/{}", id)));
        let bytes = self.send(request).await?.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Envelope::ok(()));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn create_many(&self, patches: &[T::Patch]) -> TransportResult<Envelope<Vec<T>>> {
        let request = self
            .request(Method::POST, self.url::<T>("/bulk"))
            .json(patches);
        self.send_json(request).await
    }

    async fn update_many(
        &self,
        updates: &[(T::Id, T::Patch)],
    ) -> TransportResult<Envelope<Vec<T>>> {
        let body: Vec<BulkUpdate<'_, T::Id, T::Patch>> = updates
            .iter()
            .map(|(id, data)| BulkUpdate { id, data })
            .collect();
        let request = self
            .request(Method::PUT, self.url::<T>("/bulk"))
            .json(&body);
        self.send_json(request).await
    }

    async fn delete_many(&self, ids: &[T::Id]) -> TransportResult<Envelope<u64>> {
        let request = self
            .request(Method::DELETE, self.url::<T>("/bulk"))
            .json(&BulkDelete { ids });
        self.send_json(request).await
    }

    async fn export(&self, format: ExportFormat, params: &ListParams) -> TransportResult<Vec<u8>> {
        let mut query = vec![("format".to_string(), format.as_str().to_string())];
        query.extend(params.query_pairs());
        let request = self
            .request(Method::GET, self.url::<T>("/export"))
            .query(&query);
        Ok(self.send(request).await?.bytes().await?.to_vec())
    }

    async fn import(&self, file: &ImportFile) -> TransportResult<Envelope<ImportReport>> {
        let part = Part::bytes(file.content.clone()).file_name(file.name.clone());
        let request = self
            .request(Method::POST, self.url::<T>("/import"))
            .multipart(Form::new().part("file", part));
        self.send_json(request).await
    }
}
