//! HTTP implementation of the store client.

use crate::error::StoreError;
use crate::objects::{ObjectList, WatchEvent};
use crate::store_trait::{StoreClient, WatchStream};
use futures::StreamExt;
use models::DynamicObject;
use reqwest::StatusCode;
use tracing::debug;

/// Store client speaking the versioned object store's REST protocol.
///
/// Watch responses are newline-delimited JSON events streamed over a
/// chunked response body.
#[derive(Clone)]
pub struct HttpStoreClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpStoreClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn collection_url(&self, path: &str, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) => format!(
                "{}/namespaces/{}/{}",
                self.base_url,
                urlencoding::encode(ns),
                path
            ),
            None => format!("{}/{}", self.base_url, path),
        }
    }

    fn object_url(&self, path: &str, namespace: Option<&str>, name: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(path, namespace),
            urlencoding::encode(name)
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    fn selector_query(selectors: &[(&str, &str)]) -> Vec<(String, String)> {
        if selectors.is_empty() {
            return Vec::new();
        }
        let joined = selectors
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        vec![("labelSelector".to_string(), joined)]
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let url = resp.url().to_string();
        let message = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(url)),
            StatusCode::CONFLICT => Err(StoreError::Conflict(message)),
            _ => Err(StoreError::Api {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

#[async_trait::async_trait]
impl StoreClient for HttpStoreClient {
    async fn list(
        &self,
        path: &str,
        namespace: Option<&str>,
        selectors: &[(&str, &str)],
    ) -> Result<ObjectList, StoreError> {
        let url = self.collection_url(path, namespace);
        let resp = self
            .request(reqwest::Method::GET, &url)
            .query(&Self::selector_query(selectors))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    async fn watch(
        &self,
        path: &str,
        namespace: Option<&str>,
        resource_version: Option<&str>,
        selectors: &[(&str, &str)],
    ) -> Result<WatchStream, StoreError> {
        let url = self.collection_url(path, namespace);
        let mut query = Self::selector_query(selectors);
        query.push(("watch".to_string(), "true".to_string()));
        if let Some(rv) = resource_version {
            query.push(("resourceVersion".to_string(), rv.to_string()));
        }
        debug!("opening watch on {}", url);
        let resp = self
            .request(reqwest::Method::GET, &url)
            .query(&query)
            .send()
            .await?;
        let resp = Self::check(resp).await?;

        // Newline-delimited JSON events over a chunked body.
        let bytes = resp.bytes_stream();
        let stream = futures::stream::unfold(
            (bytes, Vec::<u8>::new()),
            |(mut bytes, mut buf)| async move {
                loop {
                    if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = buf.drain(..=pos).collect();
                        let line = &line[..line.len() - 1];
                        if line.is_empty() {
                            continue;
                        }
                        let event = serde_json::from_slice::<WatchEvent>(line)
                            .map_err(StoreError::from);
                        return Some((event, (bytes, buf)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                        Some(Err(e)) => return Some((Err(StoreError::from(e)), (bytes, buf))),
                        None => return None,
                    }
                }
            },
        );
        Ok(stream.boxed())
    }

    async fn get(
        &self,
        path: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, StoreError> {
        let url = self.object_url(path, namespace, name);
        let resp = self.request(reqwest::Method::GET, &url).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    async fn create(
        &self,
        path: &str,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let url = self.collection_url(path, namespace);
        let resp = self
            .request(reqwest::Method::POST, &url)
            .json(object)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    async fn replace(
        &self,
        path: &str,
        namespace: Option<&str>,
        name: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let url = self.object_url(path, namespace, name);
        let resp = self
            .request(reqwest::Method::PUT, &url)
            .json(object)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    async fn delete(
        &self,
        path: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError> {
        let url = self.object_url(path, namespace, name);
        let resp = self.request(reqwest::Method::DELETE, &url).send().await?;
        Self::check(resp).await?;
        Ok(())
    }
}
