//! Trading-session calendar
//!
//! Pure classification of an instant against US extended trading hours:
//! Mon-Fri, 04:00-20:00 in the reference timezone, partitioned into
//! pre-market [04:00, 09:30), regular [09:30, 16:00) and after-hours
//! [16:00, 20:00). All boundaries are half-open. Classification always
//! resolves against local wall-clock time so DST transitions are handled by
//! the timezone database, not offset arithmetic.

use crate::error::{NotifierError, Result};
use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

/// Reference timezone used when none is configured.
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Trading sub-session applicable at an instant. Exactly one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    Pre,
    Regular,
    Post,
    Closed,
}

impl Session {
    /// True for any sub-session inside the extended-hours window.
    pub fn is_open(self) -> bool {
        self != Session::Closed
    }
}

/// Classification of one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub weekday: Weekday,
    pub in_window: bool,
    pub session: Session,
}

/// Classify an instant against the trading calendar in the reference zone.
pub fn classify(instant: DateTime<Utc>, tz: Tz) -> SessionWindow {
    let local = instant.with_timezone(&tz);
    let weekday = local.weekday();
    let time = local.time();

    let open = NaiveTime::from_hms_opt(4, 0, 0).unwrap();
    let regular_open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    let regular_close = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
    let close = NaiveTime::from_hms_opt(20, 0, 0).unwrap();

    let weekend = matches!(weekday, Weekday::Sat | Weekday::Sun);
    let session = if weekend || time < open || time >= close {
        Session::Closed
    } else if time < regular_open {
        Session::Pre
    } else if time < regular_close {
        Session::Regular
    } else {
        Session::Post
    };

    SessionWindow {
        weekday,
        in_window: session.is_open(),
        session,
    }
}

/// Sub-session whose extended-hours price applies at an instant.
///
/// Regular hours have none. Outside the window (ad-hoc checks can run while
/// closed) the pre-market price applies before 09:30 local and the
/// after-hours price otherwise.
pub fn extended_session(instant: DateTime<Utc>, tz: Tz) -> Option<Session> {
    let regular_open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    match classify(instant, tz).session {
        Session::Regular => None,
        Session::Pre => Some(Session::Pre),
        Session::Post => Some(Session::Post),
        Session::Closed => {
            if instant.with_timezone(&tz).time() < regular_open {
                Some(Session::Pre)
            } else {
                Some(Session::Post)
            }
        }
    }
}

/// Resolve a timezone name against the tz database.
pub fn resolve_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| NotifierError::Config(format!("unknown timezone '{}'", name)))
}
