//! Scheduling resolver — finds free calendar slots for meeting requests.
//!
//! The scheduling service is an external collaborator; this module owns the
//! window definition, the free-slot arithmetic used by commitment-backed
//! calendars, and the normalization applied to whatever a service returns
//! (chronological, non-overlapping, inside the window, long enough).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Days, Duration, NaiveTime, Utc};
use tracing::{debug, info};

use crate::error::SchedulingError;
use crate::pipeline::types::CalendarSlot;

/// The lookahead window availability is searched in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityWindow {
    /// Search starts the day after this instant.
    pub start: DateTime<Utc>,
    pub days_ahead: u32,
    pub min_duration: Duration,
    /// Working hours (UTC, 24h clock).
    pub workday_start_hour: u32,
    pub workday_end_hour: u32,
}

impl AvailabilityWindow {
    pub fn new(start: DateTime<Utc>, days_ahead: u32) -> Self {
        Self {
            start,
            days_ahead,
            min_duration: Duration::minutes(60),
            workday_start_hour: 9,
            workday_end_hour: 17,
        }
    }

    pub fn with_min_duration(mut self, min_duration: Duration) -> Self {
        self.min_duration = min_duration;
        self
    }

    pub fn with_working_hours(mut self, start_hour: u32, end_hour: u32) -> Self {
        self.workday_start_hour = start_hour;
        self.workday_end_hour = end_hour;
        self
    }

    /// Working-hour ranges for each day in the window, in order.
    pub fn working_days(&self) -> Vec<CalendarSlot> {
        let (Some(open), Some(close)) = (
            NaiveTime::from_hms_opt(self.workday_start_hour, 0, 0),
            NaiveTime::from_hms_opt(self.workday_end_hour, 0, 0),
        ) else {
            return Vec::new();
        };
        if open >= close {
            return Vec::new();
        }

        let first_day = self.start.date_naive();
        (1..=u64::from(self.days_ahead))
            .filter_map(|offset| first_day.checked_add_days(Days::new(offset)))
            .map(|day| CalendarSlot::new(day.and_time(open).and_utc(), day.and_time(close).and_utc()))
            .collect()
    }

    /// End of the last working day in the window.
    pub fn end(&self) -> DateTime<Utc> {
        self.working_days()
            .last()
            .map(|d| d.end)
            .unwrap_or(self.start)
    }

    /// Does the slot sit entirely inside one working day?
    pub fn contains(&self, slot: &CalendarSlot) -> bool {
        self.working_days()
            .iter()
            .any(|day| slot.start >= day.start && slot.end <= day.end)
    }
}

/// Calendar/availability collaborator.
#[async_trait]
pub trait SchedulingService: Send + Sync {
    /// Free slots inside the window. May be empty.
    async fn availability(
        &self,
        window: &AvailabilityWindow,
    ) -> Result<Vec<CalendarSlot>, SchedulingError>;
}

/// Free working-hour gaps around existing commitments.
///
/// Result is chronological, non-overlapping and every slot is at least
/// `window.min_duration` long.
pub fn free_slots(commitments: &[CalendarSlot], window: &AvailabilityWindow) -> Vec<CalendarSlot> {
    let mut busy: Vec<&CalendarSlot> = commitments.iter().filter(|c| c.end > c.start).collect();
    busy.sort_by_key(|c| c.start);

    let mut free = Vec::new();
    for day in window.working_days() {
        let mut cursor = day.start;
        for commitment in busy.iter().filter(|c| c.overlaps(&day)) {
            if commitment.start > cursor {
                push_if_long_enough(&mut free, cursor, commitment.start, window.min_duration);
            }
            cursor = cursor.max(commitment.end);
        }
        if day.end > cursor {
            push_if_long_enough(&mut free, cursor, day.end, window.min_duration);
        }
    }
    free
}

fn push_if_long_enough(
    out: &mut Vec<CalendarSlot>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    min: Duration,
) {
    if end - start >= min {
        out.push(CalendarSlot::new(start, end));
    }
}

/// Sort, drop invalid/short/out-of-window/overlapping slots, cap the count.
pub fn normalize_slots(
    mut slots: Vec<CalendarSlot>,
    window: &AvailabilityWindow,
    max_slots: usize,
) -> Vec<CalendarSlot> {
    slots.sort_by_key(|s| s.start);

    let mut kept: Vec<CalendarSlot> = Vec::with_capacity(slots.len().min(max_slots));
    for slot in slots {
        if kept.len() >= max_slots {
            break;
        }
        if slot.end <= slot.start
            || slot.end - slot.start < window.min_duration
            || !window.contains(&slot)
        {
            debug!(start = %slot.start, end = %slot.end, "Dropping slot outside policy");
            continue;
        }
        if kept.last().is_some_and(|prev| prev.overlaps(&slot)) {
            debug!(start = %slot.start, "Dropping overlapping slot");
            continue;
        }
        kept.push(slot);
    }
    kept
}

/// Wraps a scheduling service and applies slot policy.
pub struct SchedulingResolver {
    service: Arc<dyn SchedulingService>,
    max_slots: usize,
}

impl SchedulingResolver {
    pub fn new(service: Arc<dyn SchedulingService>, max_slots: usize) -> Self {
        Self { service, max_slots }
    }

    /// Find candidate slots. An empty result is not an error.
    pub async fn resolve(
        &self,
        window: &AvailabilityWindow,
    ) -> Result<Vec<CalendarSlot>, SchedulingError> {
        let raw = self.service.availability(window).await?;
        let returned = raw.len();
        let slots = normalize_slots(raw, window, self.max_slots);
        info!(
            returned,
            kept = slots.len(),
            days_ahead = window.days_ahead,
            "Resolved calendar availability"
        );
        Ok(slots)
    }
}
