use std::collections::{BTreeMap, HashMap};

use crate::database::repo::Post;
use crate::registry::galleries::GalleryId;

/// Posts per raw `date` value for one gallery, ascending by date text.
/// Dates stay in the site's own format, so no calendar bucketing happens here.
pub fn daily_post_counts(posts: &[Post], gallery_id: GalleryId) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for post in posts.iter().filter(|p| p.gallery_id == gallery_id) {
        *counts.entry(post.date.as_str()).or_default() += 1;
    }
    counts.into_iter().map(|(date, n)| (date.to_string(), n)).collect()
}

/// Most frequent title words across all posts.
pub fn keyword_frequencies(posts: &[Post], limit: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in posts.iter().flat_map(|p| p.title.split_whitespace()) {
        if word.chars().count() < 2 {
            continue;
        }
        *counts.entry(word).or_default() += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().map(|(w, n)| (w.to_string(), n)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}
