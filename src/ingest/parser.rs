use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use anyhow::{Result, Context, anyhow};
use tracing::debug;

use crate::database::repo::Post;
use crate::registry::galleries::GalleryId;

pub const DEFAULT_ORIGIN: &str = "https://gall.dcinside.com";

const UNKNOWN: &str = "Unknown";
const PINNED_MARKERS: [&str; 4] = ["공지", "설문", "notice", "survey"];

/// Turns a listing page into post records. Malformed rows are dropped,
/// missing fields fall back to defaults.
pub struct ListingParser {
    origin: Url,
    row: Selector,
    marker: Selector,
    anchor: Selector,
    writer: Selector,
    date: Selector,
    views: Selector,
    comments: Selector,
    recommendations: Selector,
}

impl ListingParser {
    pub fn new(origin: &str) -> Result<Self> {
        let origin = Url::parse(origin).with_context(|| format!("Invalid site origin: {}", origin))?;
        Ok(Self {
            origin,
            row: selector(".ub-content")?,
            marker: selector(".gall_num")?,
            anchor: selector(".gall_tit > a")?,
            writer: selector(".gall_writer")?,
            date: selector(".gall_date")?,
            views: selector(".gall_count")?,
            comments: selector(".gall_reply_num, .reply_num")?,
            recommendations: selector(".gall_recommend")?,
        })
    }

    pub fn parse(&self, gallery_id: GalleryId, markup: &str) -> Vec<Post> {
        let document = Html::parse_document(markup);
        let mut posts = Vec::new();
        let mut skipped = 0usize;

        for row in document.select(&self.row) {
            match self.parse_row(gallery_id, row) {
                Some(post) => posts.push(post),
                None => skipped += 1,
            }
        }

        debug!("Gallery {}: parsed {} rows, skipped {}", gallery_id, posts.len(), skipped);
        posts
    }

    fn parse_row(&self, gallery_id: GalleryId, row: ElementRef<'_>) -> Option<Post> {
        if let Some(marker) = self.text_of(row, &self.marker) {
            if is_pinned(&marker) {
                return None;
            }
        }

        let anchor = row.select(&self.anchor).next()?;
        let href = anchor.value().attr("href")?;
        let link = self.absolute_link(href)?;
        let title = collapse_text(anchor);

        Some(Post {
            id: None,
            gallery_id,
            title,
            link,
            writer: self.text_of(row, &self.writer).unwrap_or_else(|| UNKNOWN.to_string()),
            date: self.text_of(row, &self.date).unwrap_or_else(|| UNKNOWN.to_string()),
            views: self.text_of(row, &self.views).map_or(0, |t| parse_count(&t)),
            comments: self.text_of(row, &self.comments).map_or(0, |t| leading_number(&t)),
            recommendations: self.text_of(row, &self.recommendations).map_or(0, |t| parse_count(&t)),
        })
    }

    /// Trimmed text of the first match, `None` when absent or blank.
    fn text_of(&self, row: ElementRef<'_>, selector: &Selector) -> Option<String> {
        row.select(selector)
            .next()
            .map(collapse_text)
            .filter(|text| !text.is_empty())
    }

    fn absolute_link(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        self.origin.join(href).ok().map(String::from)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {:?}: {:?}", css, e))
}

fn collapse_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn is_pinned(marker: &str) -> bool {
    let lower = marker.to_lowercase();
    PINNED_MARKERS.iter().any(|token| lower.contains(token))
}

/// Parses a plain count, tolerating thousands separators. Anything else is 0.
fn parse_count(text: &str) -> u32 {
    let digits: String = text.trim().chars().filter(|c| *c != ',').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return 0;
    }
    saturating_u32(&digits)
}

/// First run of digits in the text: `"[3/5]"` yields 3.
fn leading_number(text: &str) -> u32 {
    let digits: String = text
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return 0;
    }
    saturating_u32(&digits)
}

/// `digits` is non-empty ASCII digits, so the only parse failure is overflow.
fn saturating_u32(digits: &str) -> u32 {
    digits.parse().unwrap_or(u32::MAX)
}
