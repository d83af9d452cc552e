use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Longest accepted interval period (~68 years); keeps date arithmetic in range.
pub const MAX_INTERVAL_SECS: u64 = i32::MAX as u64;

/// Wall-clock time of day in `HH:MM` form (UTC).
///
/// Serialised as the `"HH:MM"` string so config files and exported schedules
/// stay human-editable. Parsing is strict: anything that is not one or two
/// digits, a colon, then one or two digits within range is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self, String> {
        if hour > 23 {
            return Err(format!("hour out of range: {hour}"));
        }
        if minute > 59 {
            return Err(format!("minute out of range: {minute}"));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn as_naive(&self) -> NaiveTime {
        // Both fields are range-checked on construction.
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl std::str::FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("invalid time of day '{s}': expected HH:MM"))?;

        let field = |part: &str| -> std::result::Result<u8, String> {
            if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("invalid time of day '{s}': expected HH:MM"));
            }
            part.parse::<u8>().map_err(|e| format!("invalid time of day '{s}': {e}"))
        };

        Self::new(field(h)?, field(m)?).map_err(|e| format!("invalid time of day '{s}': {e}"))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Recurrence rule of a job.
///
/// Weekdays follow ISO numbering from zero: 0 = Monday … 6 = Sunday, which
/// matches chrono's `num_days_from_monday`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Fire exactly once at the given UTC instant, even if it is already past.
    Once { at: DateTime<Utc> },

    /// Fire every N seconds at a fixed rate.
    Interval { every_secs: u64 },

    /// Fire every day at the given time (UTC).
    Daily { time: TimeOfDay },

    /// Fire on one weekday at the given time (UTC).
    Weekly { day: u8, time: TimeOfDay },
}

impl Schedule {
    /// Short lowercase label used in logs and status output.
    pub fn kind(&self) -> &'static str {
        match self {
            Schedule::Once { .. } => "once",
            Schedule::Interval { .. } => "interval",
            Schedule::Daily { .. } => "daily",
            Schedule::Weekly { .. } => "weekly",
        }
    }

    /// Period in seconds for interval schedules.
    pub fn interval_secs(&self) -> Option<u64> {
        match self {
            Schedule::Interval { every_secs } => Some(*every_secs),
            _ => None,
        }
    }

    /// Range checks that the type system cannot express.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Schedule::Interval { every_secs: 0 } => {
                Err("interval must be at least one second".to_string())
            }
            Schedule::Interval { every_secs } if *every_secs > MAX_INTERVAL_SECS => {
                Err(format!("interval too large: {every_secs}s (max {MAX_INTERVAL_SECS}s)"))
            }
            Schedule::Weekly { day, .. } if *day > 6 => {
                Err(format!("weekday out of range: {day} (0 = Monday … 6 = Sunday)"))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Once { at } => write!(f, "once at {}", at.to_rfc3339()),
            Schedule::Interval { every_secs } => write!(f, "every {every_secs}s"),
            Schedule::Daily { time } => write!(f, "daily at {time}"),
            Schedule::Weekly { day, time } => write!(f, "weekly on day {day} at {time}"),
        }
    }
}

/// What the clock loop does when a job comes due while a previous occurrence
/// of the same job is still executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Dispatch anyway; task bodies that need exclusion serialise themselves.
    #[default]
    Allow,
    /// Reschedule as usual but do not dispatch this occurrence.
    SkipIfRunning,
}

/// Positional and keyword arguments handed to a task on every invocation.
///
/// Values are untyped JSON so the scheduler stays decoupled from task bodies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl TaskArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn kwarg(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }
}
