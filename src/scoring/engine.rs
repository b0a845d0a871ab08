use std::collections::HashMap;
use serde::Serialize;

use crate::database::repo::Post;
use crate::registry::galleries::{Gallery, GalleryId};

/// Metric values rescaled to 0..=100 across the compared galleries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NormalizedMetrics {
    pub post_count: f64,
    pub comment_count: f64,
    pub view_count: f64,
    pub recommendation_count: f64,
}

impl NormalizedMetrics {
    fn total(&self) -> f64 {
        self.post_count + self.comment_count + self.view_count + self.recommendation_count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub gallery_id: GalleryId,
    pub post_count: u64,
    pub comment_count: u64,
    pub view_count: u64,
    pub recommendation_count: u64,
    pub normalized: NormalizedMetrics,
    pub total_score: f64,
}

/// Ranks galleries by total score, highest first. Ties follow registry
/// order; galleries missing from `galleries` come last, by ascending id.
pub fn score(posts: &[Post], galleries: &[Gallery]) -> Vec<ScoreRecord> {
    let position: HashMap<GalleryId, usize> =
        galleries.iter().enumerate().map(|(i, g)| (g.id, i)).collect();

    let mut records = aggregate(posts);
    // Establish tie order before ranking; the ranking sort is stable.
    records.sort_by_key(|r| (position.get(&r.gallery_id).copied().unwrap_or(usize::MAX), r.gallery_id));
    rank(records)
}

/// Groups posts by gallery.
fn aggregate(posts: &[Post]) -> Vec<ScoreRecord> {
    let mut index: HashMap<GalleryId, usize> = HashMap::new();
    let mut records: Vec<ScoreRecord> = Vec::new();

    for post in posts {
        let slot = *index.entry(post.gallery_id).or_insert_with(|| {
            records.push(ScoreRecord {
                gallery_id: post.gallery_id,
                post_count: 0,
                comment_count: 0,
                view_count: 0,
                recommendation_count: 0,
                normalized: NormalizedMetrics::default(),
                total_score: 0.0,
            });
            records.len() - 1
        });

        let record = &mut records[slot];
        record.post_count += 1;
        record.comment_count += u64::from(post.comments);
        record.view_count += u64::from(post.views);
        record.recommendation_count += u64::from(post.recommendations);
    }
    records
}

fn rank(mut records: Vec<ScoreRecord>) -> Vec<ScoreRecord> {
    let posts = normalize(records.iter().map(|r| r.post_count));
    let comments = normalize(records.iter().map(|r| r.comment_count));
    let views = normalize(records.iter().map(|r| r.view_count));
    let recommendations = normalize(records.iter().map(|r| r.recommendation_count));

    for (i, record) in records.iter_mut().enumerate() {
        record.normalized = NormalizedMetrics {
            post_count: posts[i],
            comment_count: comments[i],
            view_count: views[i],
            recommendation_count: recommendations[i],
        };
        record.total_score = record.normalized.total();
    }

    // sort_by is stable, so equal totals keep their incoming order.
    records.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));
    records
}

/// Min-max scaling to 0..=100. A column where every value is equal
/// (including a single gallery) scales to all zeros.
fn normalize(values: impl Iterator<Item = u64>) -> Vec<f64> {
    let values: Vec<u64> = values.collect();
    let (Some(&min), Some(&max)) = (values.iter().min(), values.iter().max()) else {
        return Vec::new();
    };
    if min == max {
        return vec![0.0; values.len()];
    }

    let span = (max - min) as f64;
    values
        .iter()
        .map(|&v| 100.0 * (v - min) as f64 / span)
        .collect()
}
