//! Comparison schedules: a set of devices re-compared on a fixed interval or
//! on a cron expression evaluated in UTC.

use async_graphql::{InputObject, SimpleObject};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use croner::Cron;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ComparisonScheduleError;

/// Id of the schedule derived from `comparison.devices` in the config file.
pub const CONFIG_SCHEDULE_ID: &str = "config";

/// A device to compare: its source-of-truth key and its observed-state key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject, InputObject)]
#[graphql(input_name = "DeviceTargetInput")]
pub struct DeviceTarget {
    pub id: String,
    pub address: String,
}

/// Operator request for a new schedule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewComparisonSchedule {
    #[serde(default)]
    pub name: Option<String>,
    pub devices: Vec<DeviceTarget>,
    #[serde(default)]
    pub interval_secs: Option<u64>,
    /// Five-field cron expression (`0 2 * * *`); a leading seconds field is
    /// accepted too.
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SimpleObject)]
pub struct ComparisonSchedule {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub devices: Vec<DeviceTarget>,
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub cron: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub next_run_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub runs: u64,
    /// Comparison ids produced by the most recent run.
    #[serde(default)]
    pub last_results: Vec<String>,
}

enum Cadence {
    Every(ChronoDuration),
    Cron(Box<Cron>),
}

impl Cadence {
    fn parse(interval_secs: Option<u64>, cron: Option<&str>) -> Result<Self, ComparisonScheduleError> {
        match (interval_secs, cron.map(str::trim)) {
            (Some(secs), None) if secs > 0 => {
                let secs = i64::try_from(secs).map_err(|_| ComparisonScheduleError::InvalidCadence)?;
                Ok(Cadence::Every(ChronoDuration::seconds(secs)))
            }
            (None, Some(expr)) if !expr.is_empty() => Cron::new(expr)
                .with_seconds_optional()
                .parse()
                .map(|cron| Cadence::Cron(Box::new(cron)))
                .map_err(|e| ComparisonScheduleError::InvalidCron {
                    expr: expr.to_string(),
                    reason: e.to_string(),
                }),
            _ => Err(ComparisonScheduleError::InvalidCadence),
        }
    }

    /// First run strictly after `after`.
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Cadence::Every(every) => after.checked_add_signed(*every),
            Cadence::Cron(cron) => cron.find_next_occurrence(&after, false).ok(),
        }
    }
}

impl ComparisonSchedule {
    /// Validate `request` and schedule its first run after `now`.
    pub fn new(
        request: NewComparisonSchedule,
        now: DateTime<Utc>,
    ) -> Result<Self, ComparisonScheduleError> {
        if request.devices.is_empty() {
            return Err(ComparisonScheduleError::NoDevices);
        }
        if request
            .devices
            .iter()
            .any(|d| d.id.trim().is_empty() || d.address.trim().is_empty())
        {
            return Err(ComparisonScheduleError::InvalidDevice);
        }

        let cadence = Cadence::parse(request.interval_secs, request.cron.as_deref())?;
        let next_run_at = cadence
            .next_after(now)
            .ok_or(ComparisonScheduleError::InvalidCadence)?;
        let created_by = request
            .created_by
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: request.name.filter(|n| !n.trim().is_empty()),
            devices: request.devices,
            interval_secs: request.interval_secs,
            cron: request.cron.map(|c| c.trim().to_string()),
            created_by,
            created_at: now,
            next_run_at,
            last_run_at: None,
            runs: 0,
            last_results: Vec::new(),
        })
    }

    /// The schedule described by `comparison.interval_secs` and
    /// `comparison.devices`. Its first run is due immediately.
    pub fn from_config(
        devices: Vec<DeviceTarget>,
        interval_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<Self, ComparisonScheduleError> {
        let mut schedule = Self::new(
            NewComparisonSchedule {
                name: Some("configured devices".to_string()),
                devices,
                interval_secs: Some(interval_secs),
                cron: None,
                created_by: Some("config".to_string()),
            },
            now,
        )?;
        schedule.id = CONFIG_SCHEDULE_ID.to_string();
        schedule.next_run_at = now;
        Ok(schedule)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run_at <= now
    }

    /// Record a run at `now` and move `next_run_at` past it. Returns `false`
    /// when the cadence has no future run.
    pub fn advance(&mut self, now: DateTime<Utc>, results: Vec<String>) -> bool {
        self.last_run_at = Some(now);
        self.runs += 1;
        self.last_results = results;
        let next = Cadence::parse(self.interval_secs, self.cron.as_deref())
            .ok()
            .and_then(|cadence| cadence.next_after(now));
        match next {
            Some(next) => {
                self.next_run_at = next;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    fn devices() -> Vec<DeviceTarget> {
        vec![DeviceTarget {
            id: "core-sw-1".to_string(),
            address: "10.0.1.1".to_string(),
        }]
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap()
    }

    fn request(interval_secs: Option<u64>, cron: Option<&str>) -> NewComparisonSchedule {
        NewComparisonSchedule {
            devices: devices(),
            interval_secs,
            cron: cron.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn interval_schedule_runs_one_interval_later() {
        let mut schedule = ComparisonSchedule::new(request(Some(3600), None), noon()).unwrap();
        assert_eq!(schedule.next_run_at, noon() + ChronoDuration::hours(1));
        assert_eq!(schedule.created_by, "unknown");
        assert!(!schedule.is_due(noon()));

        let ran_at = noon() + ChronoDuration::minutes(61);
        assert!(schedule.advance(ran_at, vec!["c1".to_string()]));
        assert_eq!(schedule.runs, 1);
        assert_eq!(schedule.last_run_at, Some(ran_at));
        assert_eq!(schedule.next_run_at, ran_at + ChronoDuration::hours(1));
    }

    #[test]
    fn cron_presets_resolve_in_utc() {
        // Wednesday 2026-03-04 12:00 UTC.
        let nightly = ComparisonSchedule::new(request(None, Some("0 2 * * *")), noon()).unwrap();
        assert_eq!(
            nightly.next_run_at,
            Utc.with_ymd_and_hms(2026, 3, 5, 2, 0, 0).unwrap()
        );

        let weekly = ComparisonSchedule::new(request(None, Some("0 0 * * 1")), noon()).unwrap();
        assert_eq!(weekly.next_run_at.weekday(), Weekday::Mon);
        assert_eq!(weekly.next_run_at.hour(), 0);

        let monthly = ComparisonSchedule::new(request(None, Some("0 0 1 * *")), noon()).unwrap();
        assert_eq!(
            monthly.next_run_at,
            Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()
        );

        let every_six = ComparisonSchedule::new(request(None, Some("0 */6 * * *")), noon()).unwrap();
        assert_eq!(
            every_six.next_run_at,
            Utc.with_ymd_and_hms(2026, 3, 4, 18, 0, 0).unwrap()
        );
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let no_devices = NewComparisonSchedule {
            interval_secs: Some(60),
            ..Default::default()
        };
        assert!(matches!(
            ComparisonSchedule::new(no_devices, noon()),
            Err(ComparisonScheduleError::NoDevices)
        ));

        let blank = NewComparisonSchedule {
            devices: vec![DeviceTarget {
                id: "sw1".to_string(),
                address: " ".to_string(),
            }],
            interval_secs: Some(60),
            ..Default::default()
        };
        assert!(matches!(
            ComparisonSchedule::new(blank, noon()),
            Err(ComparisonScheduleError::InvalidDevice)
        ));

        for (interval, cron) in [(None, None), (Some(0), None), (Some(60), Some("0 2 * * *"))] {
            assert!(matches!(
                ComparisonSchedule::new(request(interval, cron), noon()),
                Err(ComparisonScheduleError::InvalidCadence)
            ));
        }

        assert!(matches!(
            ComparisonSchedule::new(request(None, Some("every tuesday")), noon()),
            Err(ComparisonScheduleError::InvalidCron { .. })
        ));
    }

    #[test]
    fn config_schedule_is_due_immediately() {
        let schedule = ComparisonSchedule::from_config(devices(), 900, noon()).unwrap();
        assert_eq!(schedule.id, CONFIG_SCHEDULE_ID);
        assert!(schedule.is_due(noon()));
        assert_eq!(schedule.interval_secs, Some(900));
    }
}
