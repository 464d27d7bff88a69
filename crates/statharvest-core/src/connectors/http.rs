use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::{Connector, ConnectorArgs, Fetched};
use crate::domain::{Endpoint, RawDocument};
use crate::error::HarvestError;
use crate::http_client::{
    HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient, DEFAULT_USER_AGENT,
};
use crate::retry::RetryPolicy;

/// Plain HTTP GET connector.
///
/// One client (and therefore one connection pool) is created per connector,
/// so a run reuses connections across fetches without sharing them with
/// other runs.
#[derive(Debug)]
pub struct HttpConnector {
    client: Arc<dyn HttpClient>,
    headers: BTreeMap<String, String>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl HttpConnector {
    pub fn new(args: &ConnectorArgs) -> Self {
        let client = args
            .http_client
            .clone()
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let mut headers = args.headers.clone();
        let has_user_agent = headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("user-agent"));
        if !has_user_agent {
            headers.insert(String::from("user-agent"), String::from(DEFAULT_USER_AGENT));
        }
        Self {
            client,
            headers,
            timeout: args.timeout,
            retry: args.retry.clone(),
        }
    }

    /// Performs a retried GET and returns the successful response.
    pub fn get(&self, url: &str) -> Result<HttpResponse, HarvestError> {
        let request = HttpRequest::get(url)
            .with_headers(&self.headers)
            .with_timeout_ms(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX));

        self.retry.run(&format!("GET {url}"), || {
            let response = self
                .client
                .execute(&request)
                .map_err(|error| transport_error(url, &error))?;
            status_check(url, response, &self.retry)
        })
    }
}

impl Connector for HttpConnector {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch(&mut self, endpoint: &Endpoint) -> Result<Fetched, HarvestError> {
        let url = endpoint.url();
        info!(url = %url, "fetching page");
        let response = self.get(&url)?;
        debug!(url = %url, bytes = response.body.len(), "page fetched");
        Ok(Fetched::Document(RawDocument::new(url, response.text())))
    }
}

pub(crate) fn transport_error(url: &str, error: &HttpError) -> HarvestError {
    HarvestError::Network {
        url: url.to_string(),
        message: error.message().to_string(),
        retryable: error.retryable(),
    }
}

/// Maps non-2xx statuses to network errors, retryable per `retry`.
pub(crate) fn status_check(
    url: &str,
    response: HttpResponse,
    retry: &RetryPolicy,
) -> Result<HttpResponse, HarvestError> {
    if response.is_success() {
        return Ok(response);
    }
    Err(status_error(url, response.status, retry))
}

pub(crate) fn status_error(url: &str, status: u16, retry: &RetryPolicy) -> HarvestError {
    HarvestError::Network {
        url: url.to_string(),
        message: format!("HTTP {status}"),
        retryable: retry.should_retry_status(status),
    }
}
