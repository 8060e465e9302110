use std::collections::BTreeSet;

use shared::protocol::ClickStat;

pub fn stat_categories(stats: &[ClickStat]) -> Vec<String> {
    stats
        .iter()
        .flat_map(|stat| stat.tags.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Empty `category` or `search` matches everything.
pub fn filter_stats<'a>(stats: &'a [ClickStat], category: &str, search: &str) -> Vec<&'a ClickStat> {
    let search = search.to_lowercase();
    let mut matched: Vec<&ClickStat> = stats
        .iter()
        .filter(|stat| category.is_empty() || stat.tags.iter().any(|tag| tag == category))
        .filter(|stat| stat.app_name.to_lowercase().contains(&search))
        .collect();
    matched.sort_by(|a, b| b.click_count.cmp(&a.click_count));
    matched
}
