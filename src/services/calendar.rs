//! Calendar backed by a list of busy commitments.

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveTime, Utc};
use tokio::sync::RwLock;

use crate::error::SchedulingError;
use crate::pipeline::scheduling::{AvailabilityWindow, SchedulingService, free_slots};
use crate::pipeline::types::CalendarSlot;

#[derive(Default)]
pub struct CommitmentCalendar {
    commitments: RwLock<Vec<CalendarSlot>>,
}

impl CommitmentCalendar {
    pub fn new(commitments: Vec<CalendarSlot>) -> Self {
        Self {
            commitments: RwLock::new(commitments),
        }
    }

    /// Busy 10:00-14:00 and 15:00-17:00 UTC every day for `days` days after
    /// `now`, leaving an hour free each morning and afternoon.
    pub fn demo(now: DateTime<Utc>, days: u32) -> Self {
        let first_day = now.date_naive();
        let mut commitments = Vec::new();
        for offset in 1..=u64::from(days) {
            let Some(day) = first_day.checked_add_days(Days::new(offset)) else {
                break;
            };
            for (from, to, label) in [(10, 14, "Team sync"), (15, 17, "Deep work")] {
                if let (Some(start), Some(end)) = (
                    NaiveTime::from_hms_opt(from, 0, 0),
                    NaiveTime::from_hms_opt(to, 0, 0),
                ) {
                    commitments.push(
                        CalendarSlot::new(day.and_time(start).and_utc(), day.and_time(end).and_utc())
                            .with_label(label),
                    );
                }
            }
        }
        Self::new(commitments)
    }

    pub async fn add_commitment(&self, slot: CalendarSlot) {
        self.commitments.write().await.push(slot);
    }
}

#[async_trait]
impl SchedulingService for CommitmentCalendar {
    async fn availability(
        &self,
        window: &AvailabilityWindow,
    ) -> Result<Vec<CalendarSlot>, SchedulingError> {
        let commitments = self.commitments.read().await;
        Ok(free_slots(&commitments, window))
    }
}
