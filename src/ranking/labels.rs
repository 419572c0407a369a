// src/ranking/labels.rs
//! Keyword label classification over `title + summary`.
//!
//! Rumor markers win over actionable markers: a "rumored security release"
//! is still a rumor.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Label;

static RUMOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(rumou?rs?|rumou?red|reportedly|speculat\w*|unconfirmed|allegedly|leak(?:ed|s)?|gossip|gerücht\w*|rumeurs?|rumores?|spekulation\w*)\b|噂|传闻|謠言|据传",
    )
    .expect("rumor regex")
});

static ACTIONABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(releas(?:e|ed|es)|migrat\w*|breaking|security|vulnerab\w*|cve-\d{4}-\d+|incident|outage|deprecat\w*|end[- ]of[- ]life|urgent|patch(?:ed|es)?|veröffentlich\w*|sicherheit\w*|sécurité|faille|incidente?|seguridad|lanzamiento|migración|actualización)\b|リリース|脆弱性|障害|移行|发布|安全|漏洞|事故|迁移",
    )
    .expect("actionable regex")
});

pub fn is_rumor(text: &str) -> bool {
    RUMOR.is_match(text)
}

pub fn is_actionable(text: &str) -> bool {
    ACTIONABLE.is_match(text)
}

pub fn classify(text: &str) -> Label {
    if is_rumor(text) {
        Label::Drop
    } else if is_actionable(text) {
        Label::Do
    } else {
        Label::Fyi
    }
}

pub fn label_boost(label: Label) -> f64 {
    match label {
        Label::Do => 10.0,
        Label::Fyi => 2.0,
        Label::Drop => -8.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_markers() {
        assert_eq!(classify("Rumor: vendor to acquire startup"), Label::Drop);
        assert_eq!(classify("Runtime 3.1 released with fixes"), Label::Do);
        assert_eq!(classify("Security advisory for CVE-2026-1234"), Label::Do);
        assert_eq!(classify("A look at compiler history"), Label::Fyi);
    }

    #[test]
    fn rumor_beats_actionable() {
        assert_eq!(classify("Reportedly a security release is coming"), Label::Drop);
    }

    #[test]
    fn locale_equivalents() {
        assert_eq!(classify("Neue Sicherheitslücke entdeckt"), Label::Do);
        assert_eq!(classify("Sicherheitsupdate veröffentlicht"), Label::Do);
        assert_eq!(classify("Faille critique dans le noyau"), Label::Do);
        assert_eq!(classify("新版本发布"), Label::Do);
        assert_eq!(classify("新製品の噂"), Label::Drop);
        assert_eq!(classify("Gerüchte über neue Hardware"), Label::Drop);
    }
}
