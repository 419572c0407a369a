// src/ranking/mod.rs
//! Deterministic feed ranking.
//!
//! [`route`] collapses near-duplicate headlines, labels what survives,
//! scores it for the requesting role and returns the top `limit` items in a
//! stable order. The full per-id label/score map is returned alongside so
//! callers can render items that fell below the cut.

pub mod labels;
pub mod provider;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::models::{Label, Signal};

pub const MIN_LIMIT: usize = 1;
pub const MAX_LIMIT: usize = 100;
pub const ROLE_BOOST: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    General,
    Engineering,
    Product,
    Leadership,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::General => "general",
            Role::Engineering => "engineering",
            Role::Product => "product",
            Role::Leadership => "leadership",
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Role::General => &[],
            Role::Engineering => &[
                "api", "runtime", "sdk", "compiler", "security", "kernel", "database", "release",
                "migration", "performance", "library",
            ],
            Role::Product => &[
                "launch", "pricing", "roadmap", "customer", "feature", "beta", "onboarding",
            ],
            Role::Leadership => &[
                "funding", "acquisition", "acquires", "layoff", "strategy", "regulation", "revenue",
                "earnings",
            ],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "general" => Ok(Role::General),
            "engineering" | "engineer" => Ok(Role::Engineering),
            "product" => Ok(Role::Product),
            "leadership" | "executive" => Ok(Role::Leadership),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    pub summary: Option<String>,
    pub base_score: f64,
}

impl Candidate {
    pub fn text(&self) -> String {
        match self.summary.as_deref() {
            Some(s) if !s.is_empty() => format!("{} {}", self.title, s),
            _ => self.title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedItem {
    pub id: String,
    pub rank_score: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankInfo {
    pub label: Label,
    pub rank_score: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteResult {
    pub items: Vec<RankedItem>,
    pub by_id: HashMap<String, RankInfo>,
}

impl RouteResult {
    pub fn label_of(&self, id: &str) -> Option<Label> {
        self.by_id.get(id).map(|i| i.label)
    }
}

/// Lowercase title with every non-letter/non-digit removed.
pub fn collapse_key(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(MIN_LIMIT, MAX_LIMIT)
}

pub fn role_boost(role: Role, text: &str) -> f64 {
    let lower = text.to_lowercase();
    let hit = role.keywords().iter().any(|kw| {
        lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == *kw)
    });
    if hit {
        ROLE_BOOST
    } else {
        0.0
    }
}

/// Heuristic base score for a stored signal inside a digest window.
///
/// Up to 60 points for recency (linear over the window, newest = 60), 10 for
/// having a summary, 5 for a descriptive title.
pub fn base_score(signal: &Signal, window_end: DateTime<Utc>, window_days: u8) -> f64 {
    let window_hours = f64::from(window_days.max(1)) * 24.0;
    let age_hours = (window_end - signal.effective_at()).num_minutes() as f64 / 60.0;
    let freshness = (1.0 - age_hours.max(0.0) / window_hours).clamp(0.0, 1.0);
    let mut score = 60.0 * freshness;
    if signal.summary.as_deref().is_some_and(|s| !s.trim().is_empty()) {
        score += 10.0;
    }
    if signal.title.split_whitespace().count() >= 6 {
        score += 5.0;
    }
    score
}

/// Indices of candidates that survive headline collapsing, in input order.
fn collapse(candidates: &[Candidate]) -> Vec<usize> {
    let mut winners: HashMap<String, usize> = HashMap::new();
    let mut survivors = Vec::with_capacity(candidates.len());
    for (i, c) in candidates.iter().enumerate() {
        let key = collapse_key(&c.title);
        if key.is_empty() {
            survivors.push(i);
            continue;
        }
        match winners.get(&key) {
            Some(&w) if candidates[w].base_score >= c.base_score => {}
            _ => {
                winners.insert(key, i);
            }
        }
    }
    survivors.extend(winners.into_values());
    survivors.sort_unstable();
    survivors
}

pub fn route(role: Role, limit: usize, candidates: &[Candidate]) -> RouteResult {
    let survivors = collapse(candidates);

    let mut scored: Vec<(String, RankInfo)> = survivors
        .iter()
        .map(|&i| {
            let c = &candidates[i];
            let text = c.text();
            let label = labels::classify(&text);
            let raw = c.base_score + role_boost(role, &text) + labels::label_boost(label);
            (
                c.id.clone(),
                RankInfo {
                    label,
                    rank_score: raw.round() as i64,
                },
            )
        })
        .collect();

    let by_id: HashMap<String, RankInfo> = scored.iter().cloned().collect();

    // Vec::sort_by is stable: equal scores keep post-collapse order.
    scored.sort_by(|a, b| b.1.rank_score.cmp(&a.1.rank_score));
    let items = scored
        .into_iter()
        .take(clamp_limit(limit))
        .map(|(id, info)| RankedItem {
            id,
            rank_score: info.rank_score,
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        target: "ranking",
        role = role.as_str(),
        candidates = candidates.len(),
        survivors = by_id.len(),
        returned = items.len(),
        "route"
    );
    RouteResult { items, by_id }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(id: &str, title: &str, base: f64) -> Candidate {
        Candidate {
            id: id.into(),
            title: title.into(),
            summary: None,
            base_score: base,
        }
    }

    #[test]
    fn collapse_key_strips_punctuation_and_case() {
        assert_eq!(collapse_key("Rust 2.0: Released!"), "rust20released");
        assert_eq!(collapse_key("  -- "), "");
    }

    #[test]
    fn near_duplicates_keep_highest_base() {
        let r = route(
            Role::General,
            10,
            &[cand("a", "Big News!", 50.0), cand("b", "big news", 70.0)],
        );
        assert_eq!(r.items.len(), 1);
        assert_eq!(r.items[0].id, "b");
        assert!(!r.by_id.contains_key("a"));
    }

    #[test]
    fn ties_keep_first_encountered() {
        let r = route(
            Role::General,
            10,
            &[cand("a", "Same", 40.0), cand("b", "same.", 40.0)],
        );
        assert_eq!(r.items.len(), 1);
        assert_eq!(r.items[0].id, "a");
    }

    #[test]
    fn empty_keys_never_collapse() {
        let r = route(
            Role::General,
            10,
            &[cand("a", "!!!", 10.0), cand("b", "???", 10.0)],
        );
        assert_eq!(r.items.len(), 2);
    }

    #[test]
    fn limit_is_clamped_but_by_id_is_not() {
        let cands: Vec<_> = (0..5)
            .map(|i| cand(&format!("s{i}"), &format!("Title {i}"), f64::from(i)))
            .collect();
        let r = route(Role::General, 0, &cands);
        assert_eq!(r.items.len(), 1);
        assert_eq!(r.items[0].id, "s4");
        assert_eq!(r.by_id.len(), 5);
    }

    #[test]
    fn role_boost_matches_whole_words() {
        assert_eq!(role_boost(Role::Engineering, "New API surface"), ROLE_BOOST);
        assert_eq!(role_boost(Role::Engineering, "rapid growth"), 0.0);
        assert_eq!(role_boost(Role::General, "api"), 0.0);
    }
}
