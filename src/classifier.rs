//! Clone Classifier
//!
//! Maps raw message text to a clone category via case-insensitive
//! substring matching against an ordered keyword table. First matching
//! rule wins, so a message containing keywords from several rules is
//! routed by table order. Falls through to the content clone.
//!
//! Known limitation: no tokenization, no stemming, Spanish keywords
//! only. The table is static data so routing stays testable apart from
//! the dispatch code.

use crate::clones::CloneKind;

/// One routing rule: any keyword hit selects the clone
struct Rule {
    keywords: &'static [&'static str],
    clone: CloneKind,
}

/// Ordered rule table. Order matters - see module docs.
static RULES: &[Rule] = &[
    Rule {
        keywords: &["anuncio", "publicidad"],
        clone: CloneKind::Ads,
    },
    Rule {
        keywords: &["estrategia", "negocio"],
        clone: CloneKind::Ceo,
    },
    Rule {
        keywords: &["presentación", "hablar"],
        clone: CloneKind::Voice,
    },
    Rule {
        keywords: &["ventas", "embudo"],
        clone: CloneKind::Funnel,
    },
    Rule {
        keywords: &["agenda", "tiempo"],
        clone: CloneKind::Calendar,
    },
];

/// Default clone when no rule matches
pub const DEFAULT_CLONE: CloneKind = CloneKind::Content;

/// Classify a message into a clone category. Pure and total.
pub fn classify(text: &str) -> CloneKind {
    let lower = text.to_lowercase();

    RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|kw| lower.contains(kw)))
        .map(|rule| rule.clone)
        .unwrap_or(DEFAULT_CLONE)
}
