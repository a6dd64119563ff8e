use anyhow::{anyhow, Result};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, RequestBuilder,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use shared_config::AppConfig;

/// PostgREST client for the collaborator tables (clinic settings, patients).
/// Calls run with the service key; row filters travel in the query string.
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

    /// `GET {base}{path}`; PostgREST always answers with an array of rows.
    pub async fn select<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let req = self.build(Method::GET, path)?;
        self.send(req).await
    }

    /// `PATCH {base}{path}` returning the updated rows. An empty result means
    /// the filter matched nothing.
    pub async fn update_returning<B, T>(&self, path: &str, body: &B) -> Result<Vec<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let req = self
            .build(Method::PATCH, path)?
            .header("Prefer", HeaderValue::from_static("return=representation"))
            .json(body);
        self.send(req).await
    }

    fn build(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.anon_key))?,
        );

        Ok(self.client.request(method, &url).headers(headers))
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Vec<T>> {
        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Supabase rejected request ({}): {}", status, body);
            return Err(match status.as_u16() {
                401 | 403 => anyhow!("not authorized: {}", body),
                404 => anyhow!("table or row not found: {}", body),
                _ => anyhow!("status {}: {}", status, body),
            });
        }

        Ok(response.json::<Vec<T>>().await?)
    }
}
