// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP transport shared by all connectors.
use permaudit_core::{Credentials, ServiceError};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::config::{ClientConfig, ConfigError};

/// Client bound to the base URL of one service, optionally sending HTTP basic auth.
#[derive(Clone, Debug)]
pub(crate) struct HttpClient {
    http: reqwest::Client,
    base: Url,
    credentials: Option<Credentials>,
}

impl HttpClient {
    pub fn new(base: &Url, config: &ClientConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            base: base.clone(),
            credentials: None,
        })
    }

    /// Copy of this client authenticating every request with the given credentials.
    pub fn authenticated(&self, credentials: &Credentials) -> Self {
        Self {
            credentials: Some(credentials.clone()),
            ..self.clone()
        }
    }

    /// Resolves `path` against the base URL. Absolute URLs are taken as they are.
    pub fn url(&self, path: &str) -> Result<Url, ServiceError> {
        self.base
            .join(path)
            .map_err(|err| ServiceError::InvalidResponse(format!("invalid url {path}: {err}")))
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        let url = self.url(path)?;
        debug!(%url, "GET");

        let mut request = self.http.get(url).query(query);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(credentials.user(), Some(credentials.password()));
        }

        let response = request.send().await.map_err(unavailable)?;
        let response = self.check(response)?;
        response.json::<T>().await.map_err(|err| {
            if err.is_decode() {
                ServiceError::InvalidResponse(err.to_string())
            } else {
                unavailable(err)
            }
        })
    }

    pub async fn post_xml(&self, path: &str, body: String) -> Result<String, ServiceError> {
        let url = self.url(path)?;
        debug!(%url, "POST");

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "text/xml")
            .header(ACCEPT, "text/xml")
            .body(body)
            .send()
            .await
            .map_err(unavailable)?;
        let response = self.check(response)?;
        response.text().await.map_err(unavailable)
    }

    fn check(&self, response: Response) -> Result<Response, ServiceError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ServiceError::Authentication {
                user: self
                    .credentials
                    .as_ref()
                    .map(|credentials| credentials.user().to_owned())
                    .unwrap_or_default(),
                reason: format!("{} answered {status}", response.url()),
            });
        }

        if !status.is_success() {
            return Err(ServiceError::Unavailable(format!(
                "{} answered {status}",
                response.url()
            )));
        }

        Ok(response)
    }
}

fn unavailable(err: reqwest::Error) -> ServiceError {
    ServiceError::Unavailable(err.to_string())
}
