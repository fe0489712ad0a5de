//! Video analysis: native upload or sampled frames.

mod aggregate;
mod frames;

pub use aggregate::aggregate;
pub use frames::{
    timestamps, ExtractedFrames, FrameExtractor, FrameSource, VideoInfo, PLACEHOLDER_NOTE,
};

use crate::error::StockMetaError;
use crate::prompt::{frame_filename, frame_system_prompt};
use crate::provider::{MetadataProvider, MetadataProviderExt};
use crate::retry::RetryPolicy;
use crate::types::{AnalysisMethod, AssetContent, MetadataRequest, MetadataResult, VideoAnalysis};

/// Sends the whole video to a provider that accepts video input.
pub async fn analyze_native(
    provider: &dyn MetadataProvider,
    request: &MetadataRequest,
    policy: &RetryPolicy,
) -> MetadataResult {
    let result = provider.generate_with_retries(request, policy).await;
    if !result.success {
        return result;
    }
    result.with_video(VideoAnalysis {
        method: AnalysisMethod::Native,
        frames_total: 0,
        frames_analyzed: 0,
        duration_secs: None,
        note: None,
    })
}

/// Extracts frames from `video` and analyzes each one.
///
/// Extraction errors yield a single failure; they are not retried.
pub async fn analyze_sampled(
    provider: &dyn MetadataProvider,
    request: &MetadataRequest,
    video: &[u8],
    extractor: &FrameExtractor,
) -> MetadataResult {
    let extracted = match extractor.extract(video).await {
        Ok(extracted) => extracted,
        Err(
            e @ (StockMetaError::PayloadTooLarge { .. }
            | StockMetaError::InvalidInput(_)
            | StockMetaError::FrameExtraction(_)),
        ) => return e.into(),
        Err(e) => return StockMetaError::FrameExtraction(e.to_string()).into(),
    };

    let system_prompt = frame_system_prompt(
        &request.system_prompt,
        extracted.info.duration_secs,
        extracted.info.total_frames,
        extracted.frames.len(),
    );

    let mut result = analyze_frames(provider, request, &extracted.frames, &system_prompt).await;
    if let Some(video) = result.video.as_mut() {
        video.duration_secs = Some(extracted.info.duration_secs);
        if let FrameSource::Placeholder { note } = &extracted.source {
            video.note = Some(note.clone());
        }
    }
    result
}

/// Analyzes pre-extracted frames one at a time and aggregates the results.
///
/// Each frame gets a single attempt; a failed frame only lowers
/// `frames_analyzed`.
pub async fn analyze_frames(
    provider: &dyn MetadataProvider,
    request: &MetadataRequest,
    frames: &[Vec<u8>],
    system_prompt: &str,
) -> MetadataResult {
    let mut results = Vec::with_capacity(frames.len());

    for (index, frame) in frames.iter().enumerate() {
        let frame_request = MetadataRequest {
            filename: frame_filename(&request.filename, index),
            content: AssetContent::Image(frame.clone()),
            provider: request.provider,
            model: request.model.clone(),
            system_prompt: system_prompt.to_string(),
            additional_context: request.additional_context.clone(),
        };

        let result = match provider.generate_metadata(&frame_request).await {
            Ok(result) => result,
            Err(e) => e.into(),
        };
        if !result.success {
            tracing::debug!(frame = index + 1, error = %result.error, "frame analysis failed");
        }
        results.push(result);
    }

    aggregate(&results, frames.len())
}
