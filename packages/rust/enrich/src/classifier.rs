//! Link relevance classification.
//!
//! A pure keyword-table decision over (label, url) pairs: follow links that
//! look information-dense (papers, technical reports, linked cards) and veto
//! anything that looks like boilerplate (licenses, badges, community links).

use cardcomply_shared::LinkCandidate;

/// Label keywords that suggest high information density.
const RELEVANT_KEYWORDS: &[&str] = &[
    "paper",
    "arxiv",
    "technical report",
    "model card",
    "whitepaper",
    "specification",
    "datasheet",
    "documentation",
    "full details",
];

/// Label keywords that veto a fetch, even over a direct-PDF signal.
const SKIP_KEYWORDS: &[&str] = &[
    "license",
    "bounty",
    "grant",
    "donation",
    "citation",
    "bibtex",
    "join",
    "discord",
    "twitter",
    "community",
    "badge",
    "deploy",
    "colab",
    "demo",
];

/// Decide whether a link candidate is worth fetching.
///
/// `(relevant || direct_pdf) && !garbage` — the negative keyword set always
/// vetoes, so a link labelled "License (PDF)" is never fetched.
pub fn should_fetch(candidate: &LinkCandidate) -> bool {
    let label = candidate.label.to_lowercase();
    let url = candidate.url.to_lowercase();

    let is_relevant = RELEVANT_KEYWORDS.iter().any(|k| label.contains(k));
    let is_garbage = SKIP_KEYWORDS.iter().any(|k| label.contains(k));
    let is_direct_pdf = url.ends_with(".pdf") || url.contains("arxiv.org/pdf");

    (is_relevant || is_direct_pdf) && !is_garbage
}
