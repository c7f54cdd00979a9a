use crate::auth::{rest_timestamp, Credentials, Signer};
use crate::error::ConfigError;
use crate::exchanges::{DecodeError, RestError};
use chrono::Utc;
use log::debug;
use reqwest::{Client, Method, Url};
use serde_json::{Map, Value};
use std::time::Duration;

/// Signed REST client.
///
/// GET parameters go into the query string, which is part of the signed path.
/// POST parameters are sent as a JSON object, which is the signed body.
pub struct RestClient {
    base_url: String,
    credentials: Credentials,
    signer: Signer,
    http: Client,
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let signer = Signer::new(credentials.secret_key.expose())?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            signer,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a signed request and return the decoded JSON body.
    ///
    /// Fails with `RestError::Remote` on a non-2xx status and with
    /// `RestError::Venue` when the body's `code` is not `"0"`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, RestError> {
        let timestamp = rest_timestamp(Utc::now());
        let endpoint = format!("{}{}", self.base_url, path);

        let (builder, signed_path, body) = if method == Method::GET {
            let url = if params.is_empty() {
                Url::parse(&endpoint)
            } else {
                Url::parse_with_params(&endpoint, params.iter().map(|(k, v)| (*k, v.as_str())))
            }
            .map_err(|e| RestError::Url(e.to_string()))?;
            let signed_path = match url.query() {
                Some(query) => format!("{}?{}", path, query),
                None => path.to_string(),
            };
            (self.http.get(url), signed_path, String::new())
        } else {
            let body = if params.is_empty() {
                String::new()
            } else {
                let object: Map<String, Value> = params
                    .iter()
                    .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
                    .collect();
                Value::Object(object).to_string()
            };
            let builder = self
                .http
                .request(method.clone(), &endpoint)
                .body(body.clone());
            (builder, path.to_string(), body)
        };

        let signature = self
            .signer
            .sign(method.as_str(), &signed_path, &body, &timestamp);

        debug!("{} {}", method, signed_path);
        let response = builder
            .header("Content-Type", "application/json")
            .header("OK-ACCESS-KEY", self.credentials.api_key.expose())
            .header("OK-ACCESS-SIGN", signature)
            .header("OK-ACCESS-TIMESTAMP", timestamp)
            .header("OK-ACCESS-PASSPHRASE", self.credentials.passphrase.expose())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RestError::Remote {
                status: status.as_u16(),
                body: text,
            });
        }

        let json: Value = serde_json::from_str(&text).map_err(DecodeError::from)?;
        match json.get("code").and_then(Value::as_str) {
            Some("0") | None => Ok(json),
            Some(code) => Err(RestError::Venue {
                code: code.to_string(),
                msg: json
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
        }
    }

    pub async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, RestError> {
        self.request(Method::GET, path, params).await
    }

    pub async fn post(&self, path: &str, params: &[(&str, String)]) -> Result<Value, RestError> {
        self.request(Method::POST, path, params).await
    }
}
