// tests/ranking.rs
use serde_json::json;
use signal_digest::models::Label;
use signal_digest::ranking::provider::{rank_with_provider, FixedRankingProvider, RankingSource};
use signal_digest::ranking::{route, Candidate, Role};

fn cand(id: &str, title: &str, base: f64) -> Candidate {
    Candidate {
        id: id.into(),
        title: title.into(),
        summary: None,
        base_score: base,
    }
}

#[test]
fn near_duplicate_headlines_collapse_to_the_stronger_one() {
    let r = route(
        Role::General,
        30,
        &[
            cand("weak", "Acme ships v2 - today!", 50.0),
            cand("strong", "ACME ships v2, today", 70.0),
            cand("other", "Unrelated note", 10.0),
        ],
    );
    let ids: Vec<_> = r.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["strong", "other"]);
    assert!(r.label_of("weak").is_none());
}

#[test]
fn labels_and_role_shape_the_order() {
    let cands = [
        cand("rumor", "Startup reportedly raising a round", 40.0),
        cand("plain", "Weekly community roundup", 40.0),
        cand("action", "Kernel security patch released", 40.0),
    ];
    let r = route(Role::Engineering, 10, &cands);

    assert_eq!(r.label_of("rumor"), Some(Label::Drop));
    assert_eq!(r.label_of("plain"), Some(Label::Fyi));
    assert_eq!(r.label_of("action"), Some(Label::Do));

    let ids: Vec<_> = r.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["action", "plain", "rumor"]);
    // 40 + role 6 + DO 10
    assert_eq!(r.items[0].rank_score, 56);
}

#[test]
fn equal_scores_keep_input_order() {
    let cands: Vec<_> = (0..4)
        .map(|i| cand(&format!("c{i}"), &format!("Note number {i}"), 20.0))
        .collect();
    let r = route(Role::General, 10, &cands);
    let ids: Vec<_> = r.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["c0", "c1", "c2", "c3"]);
}

#[test]
fn limit_above_max_is_capped() {
    let cands: Vec<_> = (0..150)
        .map(|i| cand(&format!("c{i}"), &format!("Item {i}"), f64::from(i)))
        .collect();
    let r = route(Role::General, 500, &cands);
    assert_eq!(r.items.len(), 100);
    assert_eq!(r.by_id.len(), 150);
    assert_eq!(r.items[0].id, "c149");
}

#[tokio::test]
async fn provider_order_is_used_when_valid() {
    let cands = [
        cand("a", "Alpha launch", 10.0),
        cand("b", "Beta outage", 90.0),
    ];
    let provider = FixedRankingProvider::new(json!({
        "kind": "RANKED",
        "items": [
            { "id": "a", "label": "DO", "score": 80.0 },
            { "id": "b", "label": "FYI", "score": 20.0 }
        ]
    }));
    let (r, source) = rank_with_provider(Some(&provider), Role::Product, 10, &cands).await;
    assert_eq!(source, RankingSource::Provider);
    assert_eq!(r.items[0].id, "a");
    assert_eq!(r.label_of("b"), Some(Label::Fyi));
}

#[tokio::test]
async fn bad_provider_output_falls_back_to_heuristic() {
    let cands = [
        cand("a", "Alpha launch", 10.0),
        cand("b", "Beta outage", 90.0),
    ];
    let unknown_id = FixedRankingProvider::new(json!({
        "kind": "RANKED",
        "items": [{ "id": "zzz", "label": "DO", "score": 1.0 }]
    }));
    let (r, source) = rank_with_provider(Some(&unknown_id), Role::General, 10, &cands).await;
    assert_eq!(source, RankingSource::Heuristic);
    assert_eq!(r.items[0].id, "b");

    let abstain = FixedRankingProvider::new(json!({ "kind": "ABSTAIN", "reason": "too few" }));
    let (_, source) = rank_with_provider(Some(&abstain), Role::General, 10, &cands).await;
    assert_eq!(source, RankingSource::Heuristic);

    let down = FixedRankingProvider::failing("connection refused");
    let (r, source) = rank_with_provider(Some(&down), Role::General, 1, &cands).await;
    assert_eq!(source, RankingSource::Heuristic);
    assert_eq!(r.items.len(), 1);
}
