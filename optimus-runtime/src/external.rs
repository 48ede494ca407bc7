//! HTTP sensor dependency checks
//!
//! HTTP dependencies are opaque edges evaluated by the scheduler at run
//! time; the core only validates their shape at check time and offers a
//! reachability probe for validation endpoints.

use optimus_core::HttpDependency;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Validates and probes HTTP sensor dependencies
pub struct HttpDependencyChecker {
    client: Client,
}

impl HttpDependencyChecker {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(DEFAULT_PROBE_TIMEOUT)
                .build()
                .expect("reqwest client construction"),
        }
    }

    /// Shape validation without network access
    pub fn validate(&self, dependencies: &[HttpDependency]) -> optimus_core::Result<()> {
        for dep in dependencies {
            if dep.name.is_empty() {
                return Err(optimus_core::Error::invalid_argument(
                    "unable to validate http dependency",
                    "name cannot be empty",
                ));
            }
            reqwest::Url::parse(&dep.url).map_err(|e| {
                optimus_core::Error::invalid_argument(
                    "unable to validate http dependency",
                    format!("invalid url '{}': {}", dep.url, e),
                )
            })?;
        }
        Ok(())
    }

    /// Probe each dependency once; 2xx counts as reachable
    pub async fn check(
        &self,
        dependencies: &[HttpDependency],
    ) -> Vec<(String, optimus_core::Result<()>)> {
        let mut results = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            let result = self.probe(dep).await;
            debug!(sensor = %dep.name, ok = result.is_ok(), "probed http dependency");
            results.push((dep.name.clone(), result));
        }
        results
    }

    async fn probe(&self, dep: &HttpDependency) -> optimus_core::Result<()> {
        let mut request = self.client.get(&dep.url).query(&dep.params);
        for (key, value) in &dep.headers {
            request = request.header(key, value);
        }
        let response = request.send().await.map_err(|e| {
            optimus_core::Error::unavailable(
                "unable to reach http dependency",
                format!("{}: {}", dep.name, e),
            )
        })?;
        if !response.status().is_success() {
            return Err(optimus_core::Error::unavailable(
                "unable to reach http dependency",
                format!("{}: status {}", dep.name, response.status()),
            ));
        }
        Ok(())
    }
}

impl Default for HttpDependencyChecker {
    fn default() -> Self {
        Self::new()
    }
}
