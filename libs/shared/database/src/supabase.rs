use anyhow::{Result, anyhow, Context};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION, CONTENT_RANGE},
    Method, Response,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key).context("Invalid anon key header value")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .context("Invalid bearer token header value")?,
            );
        }

        Ok(headers)
    }

    async fn send(&self, method: Method, path: &str,
                  auth_token: Option<&str>, body: Option<Value>,
                  prefer: Option<&'static str>) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(prefer) = prefer {
            headers.insert("Prefer", HeaderValue::from_static(prefer));
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                _ => anyhow!("API error ({}): {}", status, error_text),
            });
        }

        Ok(response)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T>
    where T: DeserializeOwned {
        let response = self.send(method, path, auth_token, body, None).await?;
        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Counts the rows matched by a PostgREST filter path without fetching them.
    pub async fn count(&self, path: &str, auth_token: Option<&str>) -> Result<u64> {
        let response = self
            .send(Method::HEAD, path, auth_token, None, Some("count=exact"))
            .await?;

        let range = response
            .headers()
            .get(CONTENT_RANGE)
            .ok_or_else(|| anyhow!("Count response for {} has no Content-Range header", path))?
            .to_str()
            .context("Content-Range header is not valid text")?;

        parse_content_range_total(range)
            .ok_or_else(|| anyhow!("Unexpected Content-Range value: {}", range))
    }

    /// Inserts one row into `table` and returns the stored representation.
    pub async fn insert<T>(&self, table: &str, row: Value,
                           auth_token: Option<&str>) -> Result<T>
    where T: DeserializeOwned {
        let path = format!("/rest/v1/{}", table);
        let response = self
            .send(Method::POST, &path, auth_token, Some(row), Some("return=representation"))
            .await?;

        let mut rows: Vec<T> = response.json().await?;
        if rows.is_empty() {
            return Err(anyhow!("Insert into {} returned no rows", table));
        }
        Ok(rows.swap_remove(0))
    }

    /// Calls a Postgres function exposed under `/rest/v1/rpc`.
    pub async fn rpc<T>(&self, function: &str, args: Value,
                        auth_token: Option<&str>) -> Result<T>
    where T: DeserializeOwned {
        let path = format!("/rest/v1/rpc/{}", function);
        self.request(Method::POST, &path, auth_token, Some(args)).await
    }
}

/// Extracts the total from a PostgREST `Content-Range` value such as `0-24/57` or `*/0`.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.parse().ok()
}
