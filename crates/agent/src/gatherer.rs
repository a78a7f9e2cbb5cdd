use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tracing::{debug, info, warn};

use routewatch_core::config::{PipelineConfig, SearchConfig};
use routewatch_core::{dedup_evidence, CompanyProfile, EvidenceItem};
use routewatch_search::SearchProvider;

use crate::llm::{parse_string_list, LlmClient, LlmRequest};

const PLAN_QUERIES_TOKENS: u32 = 1000;
const RERANK_TOKENS: u32 = 1000;

/// Evidence gathering seam the pipeline controller runs against. The live
/// implementation is [`EvidenceGatherer`]; tests substitute scripted sources.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn gather(&self, profile: &CompanyProfile) -> GatherOutcome;
}

/// Result envelope for one gathering pass. Gathering degrades rather than
/// errors: per-query failures are skipped and an empty evidence list is a
/// successful outcome. `success` flips false only when the gatherer could
/// not run at all, which the controller treats as fatal to the run.
#[derive(Clone, Debug, Default)]
pub struct GatherOutcome {
    pub success: bool,
    pub evidence: Vec<EvidenceItem>,
    pub queries_used: Vec<String>,
    pub total_results: u32,
    pub error: Option<String>,
}

impl GatherOutcome {
    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()), ..Self::default() }
    }
}

#[derive(Clone, Debug)]
pub struct GathererSettings {
    pub evidence_cap: usize,
    pub query_cap: usize,
    pub search_concurrency: usize,
    pub max_results_per_query: u32,
}

impl GathererSettings {
    pub fn from_config(pipeline: &PipelineConfig, search: &SearchConfig) -> Self {
        Self {
            evidence_cap: pipeline.evidence_cap,
            query_cap: pipeline.query_cap,
            search_concurrency: pipeline.search_concurrency,
            max_results_per_query: search.max_results_per_query,
        }
    }
}

impl Default for GathererSettings {
    fn default() -> Self {
        Self { evidence_cap: 15, query_cap: 10, search_concurrency: 4, max_results_per_query: 5 }
    }
}

/// First pipeline stage: plans search queries from the company profile, fans
/// them out over the search provider, and reduces the merged results to a
/// deduplicated, capped evidence set.
pub struct EvidenceGatherer {
    llm: Arc<dyn LlmClient>,
    provider: Arc<dyn SearchProvider>,
    settings: GathererSettings,
}

impl EvidenceGatherer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        provider: Arc<dyn SearchProvider>,
        settings: GathererSettings,
    ) -> Self {
        Self { llm, provider, settings }
    }

    async fn plan_queries(&self, profile: &CompanyProfile) -> Vec<String> {
        let prompt = match planning_prompt(profile) {
            Ok(prompt) => prompt,
            Err(error) => {
                warn!(error = %error, "query planning prompt failed; using fallback queries");
                return fallback_queries(profile);
            }
        };

        let response = self
            .llm
            .complete(LlmRequest {
                operation: "plan_queries",
                prompt,
                max_tokens: PLAN_QUERIES_TOKENS,
            })
            .await;

        match response {
            Ok(raw) => match parse_string_list(&raw).filter(|queries| !queries.is_empty()) {
                Some(mut queries) => {
                    queries.truncate(self.settings.query_cap);
                    queries
                }
                None => {
                    warn!("query planning returned unusable output; using fallback queries");
                    fallback_queries(profile)
                }
            },
            Err(error) => {
                warn!(error = %error, "query planning call failed; using fallback queries");
                fallback_queries(profile)
            }
        }
    }

    /// Runs every query against the provider with bounded concurrency.
    /// Batches are re-assembled in query order before merging, so the result
    /// does not depend on which search completed first.
    async fn run_searches(&self, queries: &[String]) -> Vec<EvidenceItem> {
        let max_results = self.settings.max_results_per_query;
        let mut batches: Vec<(usize, Vec<EvidenceItem>)> =
            stream::iter(queries.iter().cloned().enumerate())
                .map(|(position, query)| {
                    let provider = Arc::clone(&self.provider);
                    async move {
                        match provider.search(&query, max_results).await {
                            Ok(items) => (position, items),
                            Err(error) => {
                                warn!(query = %query, error = %error, "search query failed; skipping");
                                (position, Vec::new())
                            }
                        }
                    }
                })
                .buffer_unordered(self.settings.search_concurrency.max(1))
                .collect()
                .await;

        batches.sort_by_key(|(position, _)| *position);
        batches.into_iter().flat_map(|(_, items)| items).collect()
    }

    /// One LLM pass selecting the most relevant URLs when the unique set
    /// exceeds the cap. Unknown URLs in the reply are dropped; any failure
    /// falls back to the first `evidence_cap` items in merged order.
    async fn rerank(
        &self,
        profile: &CompanyProfile,
        unique: Vec<EvidenceItem>,
    ) -> Vec<EvidenceItem> {
        let cap = self.settings.evidence_cap;
        let prompt = match rerank_prompt(profile, &unique, cap) {
            Ok(prompt) => prompt,
            Err(error) => {
                warn!(error = %error, "re-rank prompt failed; truncating in merged order");
                return truncated(unique, cap);
            }
        };

        let response = self
            .llm
            .complete(LlmRequest { operation: "rerank_evidence", prompt, max_tokens: RERANK_TOKENS })
            .await;

        let ranked_urls = match response {
            Ok(raw) => parse_string_list(&raw),
            Err(error) => {
                warn!(error = %error, "re-rank call failed; truncating in merged order");
                None
            }
        };

        let Some(ranked_urls) = ranked_urls.filter(|urls| !urls.is_empty()) else {
            return truncated(unique, cap);
        };

        let mut selected = Vec::with_capacity(cap);
        let mut remaining = unique;
        for url in ranked_urls {
            if selected.len() == cap {
                break;
            }
            if let Some(index) = remaining.iter().position(|item| item.url == url) {
                selected.push(remaining.remove(index));
            }
        }

        if selected.is_empty() {
            warn!("re-rank reply matched no gathered URLs; truncating in merged order");
            return truncated(remaining, cap);
        }
        selected
    }
}

#[async_trait]
impl EvidenceSource for EvidenceGatherer {
    async fn gather(&self, profile: &CompanyProfile) -> GatherOutcome {
        let queries = self.plan_queries(profile).await;
        debug!(query_count = queries.len(), "planned search queries");

        let merged = self.run_searches(&queries).await;
        let total_results = merged.len() as u32;

        let unique = dedup_evidence(merged, usize::MAX);
        let evidence = if unique.len() > self.settings.evidence_cap {
            self.rerank(profile, unique).await
        } else {
            unique
        };

        info!(
            sources = evidence.len(),
            raw_results = total_results,
            "evidence gathering complete"
        );

        GatherOutcome { success: true, evidence, queries_used: queries, total_results, error: None }
    }
}

/// Named fallback used whenever query planning cannot produce a usable list.
pub fn fallback_queries(profile: &CompanyProfile) -> Vec<String> {
    vec![
        format!("logistics regulations {} 2024", profile.company_name),
        "EU transport law changes 2024".to_string(),
        "cross-border cargo requirements Europe".to_string(),
    ]
}

fn truncated(mut items: Vec<EvidenceItem>, cap: usize) -> Vec<EvidenceItem> {
    items.truncate(cap);
    items
}

fn planning_prompt(profile: &CompanyProfile) -> serde_json::Result<String> {
    let routes = serde_json::to_string_pretty(&profile.routes)?;
    let fleet = serde_json::to_string_pretty(&profile.fleet)?;
    let cargo = serde_json::to_string(&profile.cargo_categories)?;

    Ok(format!(
        "You are a logistics compliance research assistant. Generate targeted search \
         queries to find recent legal and regulatory changes affecting this company.\n\n\
         Company Profile:\n\
         - Name: {name}\n\
         - Countries on routes: {countries}\n\
         - Routes: {routes}\n\
         - Fleet: {fleet}\n\
         - Cargo Categories: {cargo}\n\n\
         Generate 8-10 specific search queries that will help find:\n\
         1. Recent legal changes in the countries they operate in\n\
         2. New regulations affecting their vehicle types\n\
         3. Cargo-specific compliance requirements\n\
         4. Border control updates\n\
         5. Emission standards and environmental regulations\n\n\
         Return ONLY a JSON array of search query strings, nothing else.\n\
         Example: [\"query 1\", \"query 2\", \"query 3\"]",
        name = profile.company_name,
        countries = profile.route_countries().join(", "),
        routes = routes,
        fleet = fleet,
        cargo = cargo,
    ))
}

fn rerank_prompt(
    profile: &CompanyProfile,
    items: &[EvidenceItem],
    cap: usize,
) -> serde_json::Result<String> {
    let profile_json = serde_json::to_string_pretty(profile)?;
    let results_json = serde_json::to_string_pretty(
        &items
            .iter()
            .map(|item| json!({ "url": item.url, "title": item.title, "snippet": item.snippet }))
            .collect::<Vec<_>>(),
    )?;

    Ok(format!(
        "You are filtering search results for a logistics company. Rank these results \
         by relevance and return the top {cap}.\n\n\
         Company Profile:\n{profile_json}\n\n\
         Search Results:\n{results_json}\n\n\
         Return a JSON array of the top {cap} most relevant result URLs in order of \
         importance.\nFormat: [\"url1\", \"url2\", ...]"
    ))
}
