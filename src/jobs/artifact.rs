// src/jobs/artifact.rs
//! Generated artifacts. Provider output is decoded into [`Artifact`] and
//! checked before it is persisted; anything that does not fit is rejected.

use serde::{Deserialize, Serialize};

use super::JobError;
use crate::models::JobType;

pub const MAX_BULLETS: usize = 12;
pub const MAX_EVIDENCE_ITEMS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Artifact {
    InsightCard {
        headline: String,
        bullets: Vec<String>,
    },
    EvidencePack {
        items: Vec<EvidenceItem>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EvidenceItem {
    #[serde(default)]
    pub signal_id: Option<String>,
    pub claim: String,
    pub evidence: String,
}

impl Artifact {
    pub fn job_type(&self) -> JobType {
        match self {
            Artifact::InsightCard { .. } => JobType::InsightCard,
            Artifact::EvidencePack { .. } => JobType::EvidencePack,
        }
    }

    /// Decode `raw` and require it to be a well-formed artifact of `expected`.
    pub fn from_value(raw: serde_json::Value, expected: JobType) -> Result<Self, JobError> {
        let artifact: Artifact =
            serde_json::from_value(raw).map_err(|e| JobError::InvalidArtifact(e.to_string()))?;
        if artifact.job_type() != expected {
            return Err(JobError::InvalidArtifact(format!(
                "expected {expected:?} artifact, got {:?}",
                artifact.job_type()
            )));
        }
        artifact.validate()?;
        Ok(artifact)
    }

    fn validate(&self) -> Result<(), JobError> {
        let bad = |msg: &str| Err(JobError::InvalidArtifact(msg.to_string()));
        match self {
            Artifact::InsightCard { headline, bullets } => {
                if headline.trim().is_empty() {
                    return bad("insight card headline is empty");
                }
                if bullets.is_empty() || bullets.len() > MAX_BULLETS {
                    return bad("insight card needs 1..=12 bullets");
                }
                if bullets.iter().any(|b| b.trim().is_empty()) {
                    return bad("insight card has an empty bullet");
                }
            }
            Artifact::EvidencePack { items } => {
                if items.is_empty() || items.len() > MAX_EVIDENCE_ITEMS {
                    return bad("evidence pack needs 1..=20 items");
                }
                if items
                    .iter()
                    .any(|i| i.claim.trim().is_empty() || i.evidence.trim().is_empty())
                {
                    return bad("evidence item has an empty claim or evidence");
                }
            }
        }
        Ok(())
    }
}
