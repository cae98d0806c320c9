use chrono::{DateTime, Duration, Utc};

use crate::error::{ApiError, Result};

/// Lower bound for "changed since" queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Since {
    Days(u32),
    Hours(u32),
    At(DateTime<Utc>),
}

impl Since {
    /// Build from the loose day/hour/timestamp triple the managers accept.
    /// Days win over hours, and hours over an explicit timestamp.
    pub fn from_parts(
        days: Option<u32>,
        hours: Option<u32>,
        at: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        match (days, hours, at) {
            (Some(d), _, _) => Ok(Since::Days(d)),
            (None, Some(h), _) => Ok(Since::Hours(h)),
            (None, None, Some(ts)) => Ok(Since::At(ts)),
            (None, None, None) => Err(ApiError::Validation(
                "must specify days, hours, or since".into(),
            )),
        }
    }

    /// Absolute cutoff relative to `now`. Windows reaching past the
    /// representable range clamp to the earliest instant.
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let window = match *self {
            Since::Days(d) => Duration::days(i64::from(d)),
            Since::Hours(h) => Duration::hours(i64::from(h)),
            Since::At(ts) => return ts,
        };
        now.checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl From<DateTime<Utc>> for Since {
    fn from(ts: DateTime<Utc>) -> Self {
        Since::At(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn resolves_relative_and_absolute() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(
            Since::Days(7).resolve(now),
            Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap()
        );
        assert_eq!(
            Since::Hours(2).resolve(now),
            Utc.with_ymd_and_hms(2024, 3, 10, 10, 0, 0).unwrap()
        );
        let at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(Since::At(at).resolve(now), at);
    }

    #[test]
    fn huge_windows_clamp_instead_of_overflowing() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(Since::Days(u32::MAX).resolve(now), DateTime::<Utc>::MIN_UTC);
        assert!(Since::Hours(u32::MAX).resolve(now) < now);
    }

    #[test]
    fn from_parts_requires_one_value() {
        let err = Since::from_parts(None, None, None).unwrap_err();
        assert!(err.to_string().contains("must specify days, hours, or since"));
        assert_eq!(
            Since::from_parts(Some(3), Some(5), None).unwrap(),
            Since::Days(3)
        );
        assert_eq!(Since::from_parts(None, Some(5), None).unwrap(), Since::Hours(5));
    }
}
