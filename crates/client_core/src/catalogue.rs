use shared::{
    domain::MatchResult,
    protocol::{ApplicationLink, CommunityCard},
};

pub const WEAK_MATCH_PERCENT: f64 = 5.0;
pub const DEFAULT_CATEGORY: &str = "General";

pub fn category_of(link: &ApplicationLink) -> &str {
    link.tags
        .first()
        .map(String::as_str)
        .unwrap_or(DEFAULT_CATEGORY)
}

/// True when there are results but none clears [`WEAK_MATCH_PERCENT`].
pub fn only_weak_matches(results: &[MatchResult]) -> bool {
    !results.is_empty()
        && results
            .iter()
            .all(|result| result.similarity_percent <= WEAK_MATCH_PERCENT)
}

pub fn by_upvotes(mut cards: Vec<CommunityCard>) -> Vec<CommunityCard> {
    cards.sort_by(|a, b| b.upvote.cmp(&a.upvote));
    cards
}
