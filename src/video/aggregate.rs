//! Merges per-frame results into one video-level result.

use crate::normalize::dedup_keywords;
use crate::types::{AnalysisMethod, MetadataResult, VideoAnalysis};

/// Combines per-frame results.
///
/// Only successful frames contribute. The title is the longest distinct
/// title (earliest on ties); keywords are concatenated in frame order with
/// case-insensitive de-duplication and the usual cap. Category and releases
/// take the most frequent value, earliest on ties.
pub fn aggregate(frame_results: &[MetadataResult], frames_total: usize) -> MetadataResult {
    if frame_results.is_empty() {
        return MetadataResult::failure("No frames to analyze");
    }

    let successful: Vec<&MetadataResult> = frame_results.iter().filter(|r| r.success).collect();

    let mut titles: Vec<&str> = Vec::new();
    for result in &successful {
        let title = result.title.as_str();
        if !title.is_empty() && !titles.contains(&title) {
            titles.push(title);
        }
    }

    let keywords = dedup_keywords(
        successful
            .iter()
            .flat_map(|r| r.keywords.iter().map(String::as_str)),
    );

    if titles.is_empty() && keywords.is_empty() {
        return MetadataResult::failure("All frame analyses failed");
    }

    // max_by_key keeps the last maximum; fold keeps the first.
    let title = titles.iter().copied().fold("", |best, candidate| {
        if candidate.chars().count() > best.chars().count() {
            candidate
        } else {
            best
        }
    });

    let category = most_frequent(successful.iter().map(|r| r.category)).unwrap_or_default();
    let releases = most_frequent(successful.iter().map(|r| r.releases)).unwrap_or_default();

    tracing::debug!(
        frames_total,
        frames_analyzed = successful.len(),
        keywords = keywords.len(),
        "aggregated frame results"
    );

    MetadataResult::success(title, keywords, category, releases).with_video(VideoAnalysis {
        method: AnalysisMethod::FrameSampling,
        frames_total,
        frames_analyzed: successful.len(),
        duration_secs: None,
        note: None,
    })
}

/// Most frequent item; the earliest seen wins ties.
fn most_frequent<T, I>(items: I) -> Option<T>
where
    T: Copy + Eq,
    I: IntoIterator<Item = T>,
{
    let mut counts: Vec<(T, usize)> = Vec::new();
    for item in items {
        match counts.iter_mut().find(|(seen, _)| *seen == item) {
            Some((_, count)) => *count += 1,
            None => counts.push((item, 1)),
        }
    }

    let mut best: Option<(T, usize)> = None;
    for (item, count) in counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((item, count));
        }
    }
    best.map(|(item, _)| item)
}
