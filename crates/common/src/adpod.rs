//! Ad pod expansion.
//!
//! A long-form video ad break ("pod") is requested as a total duration plus
//! a list of acceptable creative durations. Exchanges want one impression
//! per slot, so the pod is expanded into `floor(total / min(range))`
//! placements and then chunked into request-sized batches.

use derive_more::Display;
use serde::Serialize;

use crate::auction::types::VideoSpec;

/// Default upper bound on impressions per exchange request.
pub const DEFAULT_MAX_IMPRESSIONS_PER_REQUEST: usize = 15;

/// One slot inside a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PodPlacement {
    /// Position inside the pod, starting at zero.
    pub slot: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_duration: Option<u32>,
    pub max_duration: u32,
}

/// Why a pod declaration cannot be expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PodError {
    #[display("adPodDurationSec is missing or zero")]
    MissingTotalDuration,
    #[display("durationRangeSec is empty")]
    EmptyDurationRange,
    #[display("durationRangeSec contains a zero duration")]
    ZeroDuration,
    #[display("pod duration {total}s is shorter than the smallest slot {min}s")]
    PodTooShort { total: u32, min: u32 },
}

/// Validated pod declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSpec {
    pub total_duration: u32,
    pub duration_range: Vec<u32>,
    pub require_exact_duration: bool,
}

impl PodSpec {
    /// # Errors
    ///
    /// Returns [`PodError`] when the total is missing or the range is empty or
    /// contains zero.
    pub fn new(
        total_duration: u32,
        duration_range: Vec<u32>,
        require_exact_duration: bool,
    ) -> Result<Self, PodError> {
        if total_duration == 0 {
            return Err(PodError::MissingTotalDuration);
        }
        if duration_range.is_empty() {
            return Err(PodError::EmptyDurationRange);
        }
        if duration_range.contains(&0) {
            return Err(PodError::ZeroDuration);
        }
        Ok(Self {
            total_duration,
            duration_range,
            require_exact_duration,
        })
    }

    /// # Errors
    ///
    /// See [`PodSpec::new`].
    pub fn from_video(video: &VideoSpec) -> Result<Self, PodError> {
        Self::new(
            video.ad_pod_duration_sec.unwrap_or(0),
            video.duration_range_sec.clone(),
            video.require_exact_duration,
        )
    }

    fn min_duration(&self) -> u32 {
        self.duration_range.iter().copied().min().unwrap_or(0)
    }

    fn max_duration(&self) -> u32 {
        self.duration_range.iter().copied().max().unwrap_or(0)
    }

    /// Number of slots. Rounds down so the pod budget is never exceeded.
    #[must_use]
    pub fn placement_count(&self) -> u32 {
        match self.min_duration() {
            0 => 0,
            min => self.total_duration / min,
        }
    }

    /// Expand into ordered placements.
    ///
    /// Range mode gives every slot `max_duration = max(range)`. Exact mode
    /// walks the distinct durations in ascending order and gives each one a
    /// contiguous run of `ceil(n / distinct)` slots with
    /// `min_duration = max_duration = duration`; the last run takes whatever
    /// is left.
    ///
    /// # Errors
    ///
    /// Returns [`PodError::PodTooShort`] when not even one slot fits.
    pub fn placements(&self) -> Result<Vec<PodPlacement>, PodError> {
        let count = self.placement_count();
        if count == 0 {
            return Err(PodError::PodTooShort {
                total: self.total_duration,
                min: self.min_duration(),
            });
        }

        if !self.require_exact_duration {
            let max_duration = self.max_duration();
            return Ok((0..count)
                .map(|slot| PodPlacement {
                    slot,
                    min_duration: None,
                    max_duration,
                })
                .collect());
        }

        let mut durations = self.duration_range.clone();
        durations.sort_unstable();
        durations.dedup();

        let distinct = u32::try_from(durations.len()).unwrap_or(u32::MAX);
        let per_duration = count.div_ceil(distinct) as usize;

        let slots: Vec<u32> = (0..count).collect();
        Ok(slots
            .chunks(per_duration)
            .zip(durations)
            .flat_map(|(run, duration)| {
                run.iter().map(move |&slot| PodPlacement {
                    slot,
                    min_duration: Some(duration),
                    max_duration: duration,
                })
            })
            .collect())
    }
}

/// Order-preserving partition into chunks of at most `max_per_request`.
///
/// A zero limit is treated as one. Items are moved, not cloned.
#[must_use]
pub fn batch<T>(items: impl IntoIterator<Item = T>, max_per_request: usize) -> Vec<Vec<T>> {
    let limit = max_per_request.max(1);
    let mut batches: Vec<Vec<T>> = Vec::new();
    for item in items {
        match batches.last_mut() {
            Some(last) if last.len() < limit => last.push(item),
            _ => batches.push(vec![item]),
        }
    }
    batches
}

/// Expand a pod and chunk it in one step.
///
/// # Errors
///
/// See [`PodSpec::new`] and [`PodSpec::placements`].
pub fn batch_pod(
    total_duration: u32,
    duration_range: &[u32],
    require_exact_duration: bool,
    max_per_request: usize,
) -> Result<Vec<Vec<PodPlacement>>, PodError> {
    let spec = PodSpec::new(
        total_duration,
        duration_range.to_vec(),
        require_exact_duration,
    )?;
    Ok(batch(spec.placements()?, max_per_request))
}
