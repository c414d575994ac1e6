//src/entrez.rs

use std::cell::Cell;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::config::EntrezConfig;
use crate::enrich::ReferenceCounter;
use crate::error::{PipelineError, Result};

const SERVICE: &str = "Entrez esearch";

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    /// NCBI sends the count as a string
    count: Option<String>,
    #[serde(rename = "ERROR")]
    error: Option<String>,
}

/// Pull the hit count out of an esearch JSON body.
pub fn parse_esearch_count(body: &str) -> std::result::Result<u64, String> {
    let parsed: EsearchResponse = serde_json::from_str(body).map_err(|e| e.to_string())?;
    if let Some(err) = parsed.esearchresult.error {
        return Err(err);
    }
    let count = parsed
        .esearchresult
        .count
        .ok_or_else(|| "response has no count".to_string())?;
    count
        .trim()
        .parse()
        .map_err(|_| format!("count '{count}' is not a number"))
}

/// Counts entries of an NCBI database (e.g. `assembly`) matching a term.
pub struct EntrezCounter {
    client: reqwest::blocking::Client,
    config: EntrezConfig,
    db: String,
    last_request: Cell<Option<Instant>>,
}

impl EntrezCounter {
    pub fn new(config: &EntrezConfig, db: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("{}/{}", config.tool, env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot build HTTP client: {e}")))?;

        if config.email.is_none() {
            log::warn!("No Entrez e-mail configured; NCBI asks every client to send one");
        }

        Ok(Self {
            client,
            config: config.clone(),
            db: db.to_string(),
            last_request: Cell::new(None),
        })
    }

    fn wait_for_slot(&self) {
        let interval = Duration::from_millis(self.config.request_interval_ms);
        if let Some(last) = self.last_request.get() {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }

    fn service_error(&self, term: &str, message: impl Into<String>) -> PipelineError {
        PipelineError::ExternalService {
            service: SERVICE,
            term: term.to_string(),
            message: message.into(),
        }
    }
}

impl ReferenceCounter for EntrezCounter {
    fn count_references(&self, term: &str) -> Result<u64> {
        self.wait_for_slot();

        let url = format!("{}/esearch.fcgi", self.config.base_url.trim_end_matches('/'));
        let mut query: Vec<(&str, &str)> = vec![
            ("db", self.db.as_str()),
            ("term", term),
            ("retmode", "json"),
            ("retmax", "0"),
            ("tool", self.config.tool.as_str()),
        ];
        if let Some(email) = self.config.email.as_deref() {
            query.push(("email", email));
        }
        if let Some(key) = self.config.api_key.as_deref() {
            query.push(("api_key", key));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .map_err(|e| self.service_error(term, e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.service_error(term, format!("HTTP {}", response.status())));
        }

        let body = response
            .text()
            .map_err(|e| self.service_error(term, e.to_string()))?;
        parse_esearch_count(&body).map_err(|msg| self.service_error(term, msg))
    }
}
