// src/ranking/provider.rs
//! Optional external ranking provider.
//!
//! A provider returns a tagged JSON payload. The payload is decoded and
//! checked against the candidates it was given before anything is trusted;
//! a rejected payload or a provider error falls back to the heuristic
//! [`route`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::{clamp_limit, route, Candidate, RankInfo, RankedItem, Role, RouteResult};
use crate::models::Label;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("ranking provider unavailable: {0}")]
    Unavailable(String),
    #[error("ranking payload rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankingSource {
    Heuristic,
    Provider,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderPayload {
    Ranked { items: Vec<ProviderItem> },
    Abstain { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProviderItem {
    pub id: String,
    pub label: Label,
    pub score: f64,
}

#[async_trait]
pub trait RankingProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn rank(&self, role: Role, candidates: &[Candidate]) -> Result<serde_json::Value, ProviderError>;
}

/// Decode and validate a provider payload against the candidates sent.
pub fn validate_payload(
    raw: serde_json::Value,
    candidates: &[Candidate],
) -> Result<Vec<ProviderItem>, ProviderError> {
    let payload: ProviderPayload =
        serde_json::from_value(raw).map_err(|e| ProviderError::Rejected(e.to_string()))?;
    let items = match payload {
        ProviderPayload::Ranked { items } => items,
        ProviderPayload::Abstain { reason } => {
            return Err(ProviderError::Rejected(format!("provider abstained: {reason}")))
        }
    };
    if items.is_empty() {
        return Err(ProviderError::Rejected("no ranked items".into()));
    }

    let known: HashSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
    let mut seen = HashSet::with_capacity(items.len());
    for it in &items {
        if !known.contains(it.id.as_str()) {
            return Err(ProviderError::Rejected(format!("unknown id '{}'", it.id)));
        }
        if !seen.insert(it.id.as_str()) {
            return Err(ProviderError::Rejected(format!("duplicate id '{}'", it.id)));
        }
        if !it.score.is_finite() {
            return Err(ProviderError::Rejected(format!("non-finite score for '{}'", it.id)));
        }
    }
    Ok(items)
}

/// Heuristic collapse first, then let the provider order what survived.
/// Survivors the provider did not mention keep their heuristic entry in
/// `by_id` but are not returned in `items`.
pub async fn rank_with_provider(
    provider: Option<&dyn RankingProvider>,
    role: Role,
    limit: usize,
    candidates: &[Candidate],
) -> (RouteResult, RankingSource) {
    let heuristic = route(role, candidates.len().max(1), candidates);
    let Some(provider) = provider else {
        return (truncate(heuristic, limit), RankingSource::Heuristic);
    };

    let survivors: Vec<Candidate> = candidates
        .iter()
        .filter(|c| heuristic.by_id.contains_key(&c.id))
        .cloned()
        .collect();

    let outcome = match provider.rank(role, &survivors).await {
        Ok(raw) => validate_payload(raw, &survivors),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(mut items) => {
            items.sort_by(|a, b| b.score.total_cmp(&a.score));
            let mut by_id: HashMap<String, RankInfo> = heuristic.by_id;
            let ranked = items
                .into_iter()
                .map(|it| {
                    let rank_score = it.score.round() as i64;
                    by_id.insert(
                        it.id.clone(),
                        RankInfo {
                            label: it.label,
                            rank_score,
                        },
                    );
                    RankedItem {
                        id: it.id,
                        rank_score,
                    }
                })
                .take(clamp_limit(limit))
                .collect();
            tracing::debug!(target: "ranking", provider = provider.name(), "provider ranking accepted");
            (
                RouteResult {
                    items: ranked,
                    by_id,
                },
                RankingSource::Provider,
            )
        }
        Err(e) => {
            metrics::counter!("ranking_provider_fallback_total").increment(1);
            tracing::warn!(target: "ranking", provider = provider.name(), error = %e, "falling back to heuristic ranking");
            (truncate(heuristic, limit), RankingSource::Heuristic)
        }
    }
}

fn truncate(mut result: RouteResult, limit: usize) -> RouteResult {
    result.items.truncate(clamp_limit(limit));
    result
}

/// Provider that replays a fixed payload. Useful for wiring tests and demos.
pub struct FixedRankingProvider {
    response: Result<serde_json::Value, ProviderError>,
}

impl FixedRankingProvider {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            response: Ok(payload),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(ProviderError::Unavailable(message.to_string())),
        }
    }
}

#[async_trait]
impl RankingProvider for FixedRankingProvider {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn rank(&self, _role: Role, _candidates: &[Candidate]) -> Result<serde_json::Value, ProviderError> {
        self.response.clone()
    }
}
