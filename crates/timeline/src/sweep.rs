//! Condition Timeline Sweep

use crate::{DrivingCondition, ExternalSource};
use std::collections::BTreeMap;
use storage::ConditionType;

/// Internal condition whose source chain has been resolved to a video
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCondition {
    pub condition_type: ConditionType,
    pub severity: f64,
    /// Inclusive
    pub start_time_ms: i64,
    /// Exclusive
    pub end_time_ms: i64,
    pub video_url: String,
}

/// Maximum severity per (condition type, video) active at one breakpoint
type ActiveSet<'a> = BTreeMap<(ConditionType, &'a str), f64>;

fn active_at(conditions: &[ResolvedCondition], timestamp_ms: i64) -> ActiveSet<'_> {
    let mut active = ActiveSet::new();
    for dc in conditions {
        if dc.condition_type == ConditionType::NoneConditionType {
            continue;
        }
        if timestamp_ms < dc.start_time_ms || timestamp_ms >= dc.end_time_ms {
            continue;
        }
        active
            .entry((dc.condition_type, dc.video_url.as_str()))
            .and_modify(|severity| *severity = severity.max(dc.severity))
            .or_insert(dc.severity);
    }
    active
}

/// Flatten possibly overlapping conditions into consecutive segments.
///
/// Every distinct start or end time is a breakpoint. The segment from one
/// breakpoint up to (excluding) the next lists the conditions active at its
/// start, at their highest severity per source. A segment whose active set
/// equals the previous one extends it instead of starting a new one. NONE
/// conditions contribute breakpoints but are never listed.
pub fn consolidate_conditions(conditions: &[ResolvedCondition]) -> Vec<DrivingCondition> {
    let mut breakpoints: Vec<i64> = conditions
        .iter()
        .flat_map(|dc| [dc.start_time_ms, dc.end_time_ms])
        .collect();
    breakpoints.sort_unstable();
    breakpoints.dedup();

    let mut segments: Vec<DrivingCondition> = Vec::new();
    let mut previous: Option<ActiveSet<'_>> = None;

    for window in breakpoints.windows(2) {
        let (start, next) = (window[0], window[1]);
        let active = active_at(conditions, start);

        if previous.as_ref() == Some(&active) {
            if let Some(last) = segments.last_mut() {
                last.end_time_ms = next - 1;
            }
            continue;
        }

        let mut segment = DrivingCondition {
            start_time_ms: start,
            end_time_ms: next - 1,
            ..Default::default()
        };
        for ((condition_type, video_url), severity) in &active {
            segment.condition_type.push(*condition_type);
            segment.severity.push(*severity);
            segment.external_source.push(ExternalSource::dashcam_video(*video_url));
        }
        segments.push(segment);
        previous = Some(active);
    }

    segments.sort_by_key(|s| s.start_time_ms);
    segments
}
