//! Hybrid retrieval: vector search re-ranked by keyword overlap.
//!
//! The pipeline for one query:
//!
//! 1. Rebuild the index from the catalog if it is empty.
//! 2. Optionally rewrite the query through the vision backend.
//! 3. Embed the (rewritten) query and take the `top_k` nearest vectors.
//! 4. Drop candidates outside the requested capture-date range.
//! 5. Boost candidates whose summary or tags contain words of the raw query.
//! 6. Sort by boosted distance and trim everything worse than `best + 0.5`.

use crate::retrieval::media;
use crate::retrieval::vector_index::VectorIndex;
use crate::storage::{CatalogStore, MemoryRecord, VisionStatus};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use memora_embed::EmbeddingProvider;
use memora_vision::EnrichmentPipeline;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Results scoring more than this above the best result are dropped.
pub const CUTOFF_MARGIN: f32 = 0.5;

/// Query words this short or shorter never boost.
const MIN_TERM_LEN: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: Option<usize>,
    /// Inclusive lower bound on the capture date
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the capture date
    pub date_to: Option<NaiveDate>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_dates(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }
}

/// A record as presented to callers of search and list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultView {
    pub file_id: String,
    pub path: String,
    pub score: f32,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub vision_status: VisionStatus,
    pub created_at: DateTime<Utc>,
    pub exif_date: Option<NaiveDateTime>,
    /// `data:image/jpeg;base64,...` URL
    pub thumbnail_b64: Option<String>,
}

impl ResultView {
    pub fn from_record(record: MemoryRecord, score: f32) -> Self {
        Self {
            thumbnail_b64: record.thumbnail.as_deref().map(media::thumbnail_data_url),
            file_id: record.file_id,
            path: record.path,
            score,
            summary: record.memory_summary,
            tags: record.tags,
            vision_status: record.vision_status,
            created_at: record.created_at,
            exif_date: record.exif_date,
        }
    }
}

/// Lowercased whitespace-separated words of the query longer than two characters.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .map(str::to_lowercase)
        .collect()
}

/// How many `terms` occur as substrings of the record's summary and tags.
pub fn keyword_matches(terms: &[String], record: &MemoryRecord) -> usize {
    let text = record.keyword_text();
    terms.iter().filter(|t| text.contains(t.as_str())).count()
}

/// Distance multiplier for `matches` keyword hits.
pub fn boost_multiplier(matches: usize) -> f32 {
    if matches == 0 {
        1.0
    } else {
        (0.7 - 0.15 * matches as f32).max(0.2)
    }
}

/// Whether a capture date passes the inclusive bounds. Undated records always pass.
pub fn within_dates(
    exif_date: Option<NaiveDateTime>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> bool {
    let Some(date) = exif_date.map(|d| d.date()) else {
        return true;
    };
    from.is_none_or(|from| date >= from) && to.is_none_or(|to| date <= to)
}

/// Keep the prefix of ascending `scores` within [`CUTOFF_MARGIN`] of the best.
pub fn adaptive_cutoff(scores: &[f32]) -> usize {
    let Some(best) = scores.first() else {
        return 0;
    };
    let limit = best + CUTOFF_MARGIN;
    scores.iter().take_while(|&&s| s <= limit).count()
}

/// Filter, boost, sort and trim vector-search candidates.
///
/// `candidates` must be in vector-search order; equal boosted scores keep it.
pub fn rank(
    candidates: Vec<(MemoryRecord, f32)>,
    raw_query: &str,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
) -> Vec<(MemoryRecord, f32)> {
    let terms = query_terms(raw_query);

    let mut ranked: Vec<(MemoryRecord, f32)> = candidates
        .into_iter()
        .filter(|(record, _)| within_dates(record.exif_date, date_from, date_to))
        .map(|(record, distance)| {
            let matches = keyword_matches(&terms, &record);
            (record, distance * boost_multiplier(matches))
        })
        .collect();

    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    let scores: Vec<f32> = ranked.iter().map(|(_, score)| *score).collect();
    ranked.truncate(adaptive_cutoff(&scores));
    ranked
}

pub struct HybridRetriever {
    catalog: Arc<dyn CatalogStore>,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    default_top_k: usize,
}

impl HybridRetriever {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        default_top_k: usize,
    ) -> Self {
        Self {
            catalog,
            index,
            embedder,
            default_top_k,
        }
    }

    /// Run a search. `expander` rewrites the query when a vision backend is
    /// configured; keyword boosting always uses the raw query.
    pub async fn search(
        &self,
        request: &SearchRequest,
        expander: Option<&EnrichmentPipeline>,
    ) -> Result<Vec<ResultView>> {
        if self.index.count().await == 0 {
            debug!("Vector index empty, rebuilding from catalog");
            if self.index.build_from_catalog(self.catalog.as_ref()).await? == 0 {
                return Ok(Vec::new());
            }
        }

        let expanded = match expander {
            Some(pipeline) => pipeline.expand_query(&request.query).await,
            None => None,
        };
        let search_query = expanded.as_deref().unwrap_or(&request.query);

        let query_vector = self.embedder.embed_text(search_query).await?;
        let top_k = request.top_k.unwrap_or(self.default_top_k);
        let hits = self.index.search(&query_vector, top_k).await;

        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.catalog.get_record(&hit.file_id).await? {
                Some(record) => candidates.push((record, hit.score)),
                None => debug!("Indexed {} missing from catalog", hit.file_id),
            }
        }

        let ranked = rank(
            candidates,
            &request.query,
            request.date_from,
            request.date_to,
        );
        info!("Search '{}' returned {} results", request.query, ranked.len());

        Ok(ranked
            .into_iter()
            .map(|(record, score)| ResultView::from_record(record, score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(file_id: &str, summary: Option<&str>, tags: &[&str]) -> MemoryRecord {
        let now = Utc::now();
        MemoryRecord {
            file_id: file_id.to_string(),
            path: format!("/p/{file_id}.jpg"),
            hash: format!("hash-{file_id}"),
            created_at: now,
            modified_at: now,
            exif_date: None,
            ocr_text: None,
            caption: None,
            memory_summary: summary.map(str::to_string),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            thumbnail: None,
            vision_json: None,
            vision_status: VisionStatus::Done,
            embedding: None,
        }
    }

    fn dated(file_id: &str, y: i32, m: u32, d: u32) -> MemoryRecord {
        let mut r = record(file_id, None, &[]);
        r.exif_date = NaiveDate::from_ymd_opt(y, m, d).and_then(|d| d.and_hms_opt(10, 0, 0));
        r
    }

    fn ids(ranked: &[(MemoryRecord, f32)]) -> Vec<&str> {
        ranked.iter().map(|(r, _)| r.file_id.as_str()).collect()
    }

    #[test]
    fn test_query_terms_drop_short_words() {
        assert_eq!(
            query_terms("a Dog on the BEACH at sunset"),
            vec!["dog", "the", "beach", "sunset"]
        );
        assert!(query_terms("to be or").is_empty());
    }

    #[test]
    fn test_boost_multiplier() {
        assert_eq!(boost_multiplier(0), 1.0);
        assert!((boost_multiplier(1) - 0.55).abs() < 1e-6);
        assert!((boost_multiplier(2) - 0.40).abs() < 1e-6);
        assert!((boost_multiplier(3) - 0.25).abs() < 1e-6);
        assert_eq!(boost_multiplier(4), 0.2);
        assert_eq!(boost_multiplier(10), 0.2);
    }

    #[test]
    fn test_more_matches_never_score_worse() {
        let terms = query_terms("golden retriever beach");
        let plain = record("plain", Some("A cat indoors"), &[]);
        let one = record("one", Some("A golden sunset"), &[]);
        let two = record("two", Some("A golden dog"), &["beach"]);

        let scores: Vec<f32> = [&plain, &one, &two]
            .iter()
            .map(|r| 0.8 * boost_multiplier(keyword_matches(&terms, r)))
            .collect();
        assert!(scores[2] <= scores[1]);
        assert!(scores[1] <= scores[0]);
    }

    #[test]
    fn test_matching_is_case_insensitive_over_summary_and_tags() {
        let r = record("r", Some("Eiffel Tower at night"), &["Paris", "travel"]);
        assert_eq!(keyword_matches(&query_terms("eiffel PARIS"), &r), 2);
        assert_eq!(keyword_matches(&query_terms("london"), &r), 0);
    }

    #[test]
    fn test_date_filter() {
        let from = NaiveDate::from_ymd_opt(2023, 6, 1);
        let to = NaiveDate::from_ymd_opt(2023, 6, 30);

        let candidates = vec![
            (dated("before", 2023, 5, 31), 0.1),
            (dated("first-day", 2023, 6, 1), 0.2),
            (record("undated", None, &[]), 0.3),
            (dated("last-day", 2023, 6, 30), 0.4),
            (dated("after", 2023, 7, 1), 0.45),
        ];
        let ranked = rank(candidates, "", from, to);
        assert_eq!(ids(&ranked), vec!["first-day", "undated", "last-day"]);

        assert!(within_dates(None, from, to));
        assert!(within_dates(dated("x", 1999, 1, 1).exif_date, None, None));
    }

    #[test]
    fn test_cutoff_is_relative_to_best() {
        assert_eq!(adaptive_cutoff(&[0.10, 0.30, 0.55, 0.80]), 3);
        assert_eq!(adaptive_cutoff(&[1.2, 1.6, 1.65]), 3);
        assert_eq!(adaptive_cutoff(&[]), 0);

        let candidates = vec![
            (record("a", None, &[]), 0.10),
            (record("b", None, &[]), 0.30),
            (record("c", None, &[]), 0.55),
            (record("d", None, &[]), 0.80),
        ];
        assert_eq!(ids(&rank(candidates, "", None, None)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_boost_reorders_candidates() {
        let candidates = vec![
            (record("close", Some("A red car"), &[]), 0.9),
            (record("tagged", Some("Lighthouse"), &["lighthouse", "coast"]), 1.2),
        ];
        let ranked = rank(candidates, "lighthouse on the coast", None, None);

        assert_eq!(ids(&ranked), vec!["tagged", "close"]);
        assert!((ranked[0].1 - 1.2 * 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_prose_description_is_boosted() -> anyhow::Result<()> {
        let description =
            memora_vision::parse_description("A golden retriever running on the beach.")?;
        let mut described = record("described", None, &[]);
        described.caption = description.caption;
        described.memory_summary = description.summary;

        let candidates = vec![(record("plain", None, &[]), 0.7), (described, 1.0)];
        let ranked = rank(candidates, "golden retriever beach", None, None);

        assert_eq!(ids(&ranked), vec!["described", "plain"]);
        assert!((ranked[0].1 - 0.25).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_ties_keep_vector_order() {
        let candidates = vec![
            (record("first", None, &[]), 0.5),
            (record("second", None, &[]), 0.5),
        ];
        assert_eq!(
            ids(&rank(candidates, "", None, None)),
            vec!["first", "second"]
        );
    }

    #[test]
    fn test_result_view_carries_thumbnail_url() {
        let mut r = record("t", Some("Snow"), &["winter"]);
        r.thumbnail = Some(vec![0xFF, 0xD8]);
        let view = ResultView::from_record(r, 0.25);

        assert_eq!(view.thumbnail_b64.as_deref(), Some("data:image/jpeg;base64,/9g="));
        assert_eq!(view.tags, vec!["winter"]);
        assert_eq!(view.score, 0.25);
    }
}
