use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use routewatch_core::{EvidenceItem, Report, ReportId};

use crate::index::{evidence_search_text, report_search_text, IndexError, IndexHit, ReportIndex};
use crate::provider::{SearchError, SearchProvider};

const GATEWAY_REGION: &str = "eu";

/// HTTP client for the search gateway's `POST /search` endpoint.
pub struct GatewaySearchClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl GatewaySearchClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url: trim_base_url(base_url.into()), api_key })
    }
}

#[derive(Serialize)]
struct SearchRequestBody<'a> {
    query: &'a str,
    max_results: u32,
    region: &'static str,
}

#[derive(Deserialize)]
struct SearchResponseBody {
    #[serde(default)]
    results: Vec<GatewayResult>,
}

#[derive(Deserialize)]
struct GatewayResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    published_date: Option<String>,
}

impl GatewayResult {
    fn into_evidence(self) -> EvidenceItem {
        EvidenceItem {
            url: self.url,
            title: self.title,
            snippet: self.snippet,
            published_date: self.published_date,
        }
    }
}

#[async_trait]
impl SearchProvider for GatewaySearchClient {
    async fn search(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<EvidenceItem>, SearchError> {
        debug!(query, max_results, "dispatching gateway search");
        let request = self
            .http
            .post(format!("{}/search", self.base_url))
            .json(&SearchRequestBody { query, max_results, region: GATEWAY_REGION });

        let response = with_bearer(request, self.api_key.as_ref()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Gateway { status: status.as_u16(), body });
        }

        let body: SearchResponseBody = response.json().await?;
        Ok(body.results.into_iter().map(GatewayResult::into_evidence).collect())
    }
}

/// HTTP report index backed by the gateway's `/index` and `/query` endpoints.
pub struct GatewayReportIndex {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl GatewayReportIndex {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, IndexError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url: trim_base_url(base_url.into()), api_key })
    }

    async fn post_document(&self, path: &str, body: &IndexDocumentBody) -> Result<(), IndexError> {
        let request = self.http.post(format!("{}{path}", self.base_url)).json(body);
        let response = with_bearer(request, self.api_key.as_ref()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Gateway { status: status.as_u16(), body });
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct IndexDocumentBody {
    report_id: ReportId,
    company_name: String,
    text: String,
}

#[derive(Serialize)]
struct QueryRequestBody<'a> {
    query: &'a str,
    limit: u32,
}

#[derive(Deserialize)]
struct QueryResponseBody {
    #[serde(default)]
    hits: Vec<IndexHit>,
}

#[async_trait]
impl ReportIndex for GatewayReportIndex {
    async fn index_evidence(
        &self,
        report_id: &ReportId,
        evidence: &[EvidenceItem],
    ) -> Result<(), IndexError> {
        self.post_document(
            "/index/evidence",
            &IndexDocumentBody {
                report_id: *report_id,
                company_name: String::new(),
                text: evidence_search_text(evidence),
            },
        )
        .await
    }

    async fn index_report(&self, report: &Report) -> Result<(), IndexError> {
        self.post_document(
            "/index/report",
            &IndexDocumentBody {
                report_id: report.id,
                company_name: report.company_name.clone(),
                text: report_search_text(report),
            },
        )
        .await
    }

    async fn search_reports(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<IndexHit>, IndexError> {
        debug!(query, limit, "querying gateway report index");
        let request = self
            .http
            .post(format!("{}/query", self.base_url))
            .json(&QueryRequestBody { query, limit });

        let response = with_bearer(request, self.api_key.as_ref()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Gateway { status: status.as_u16(), body });
        }

        let body: QueryResponseBody = response.json().await?;
        Ok(body.hits)
    }

    async fn remove_report(&self, report_id: &ReportId) -> Result<(), IndexError> {
        let request = self.http.delete(format!("{}/index/{report_id}", self.base_url));
        let response = with_bearer(request, self.api_key.as_ref()).send().await?;
        let status = response.status();
        if !status.is_success() && status.as_u16() != 404 {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Gateway { status: status.as_u16(), body });
        }
        Ok(())
    }
}

fn with_bearer(request: RequestBuilder, api_key: Option<&SecretString>) -> RequestBuilder {
    match api_key {
        Some(key) => request.bearer_auth(key.expose_secret()),
        None => request,
    }
}

fn trim_base_url(mut base_url: String) -> String {
    while base_url.ends_with('/') {
        base_url.pop();
    }
    base_url
}

#[cfg(test)]
mod tests {
    use super::{trim_base_url, SearchRequestBody, GATEWAY_REGION};

    #[test]
    fn search_body_pins_the_eu_region() {
        let body = SearchRequestBody { query: "cabotage", max_results: 5, region: GATEWAY_REGION };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["region"], "eu");
        assert_eq!(json["max_results"], 5);
    }

    #[test]
    fn trailing_slashes_are_stripped_from_base_urls() {
        assert_eq!(trim_base_url("https://gw.example.eu//".to_string()), "https://gw.example.eu");
        assert_eq!(trim_base_url("https://gw.example.eu".to_string()), "https://gw.example.eu");
    }
}
