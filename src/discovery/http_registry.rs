//! Discovery registry client over HTTP.
//!
//! Queries `GET {base}/services/{name}/instances`, which answers with a JSON
//! array of `{"address": "host:port"}` objects. A 404 means the service has
//! no registered instances.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::discovery::registry::{RegistryError, ServiceInstance, ServiceRegistry};

#[derive(Debug, Deserialize)]
struct InstanceRecord {
    address: String,
}

#[derive(Debug, Clone)]
pub struct HttpRegistry {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let mut base_url =
            Url::parse(base_url).map_err(|_| RegistryError::InvalidUrl(base_url.to_string()))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        Ok(Self { base_url, client })
    }

    fn instances_url(&self, service: &str) -> Result<Url, RegistryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["services", service, "instances"]);
        Ok(url)
    }
}

#[async_trait]
impl ServiceRegistry for HttpRegistry {
    async fn resolve(&self, service: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        let url = self.instances_url(service)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(Vec::new()),
            status if !status.is_success() => {
                return Err(RegistryError::Unavailable(format!(
                    "registry answered {}",
                    status
                )))
            }
            _ => {}
        }

        let records: Vec<InstanceRecord> = response
            .json()
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        Ok(records
            .into_iter()
            .map(|r| ServiceInstance::new(service, r.address))
            .collect())
    }
}
