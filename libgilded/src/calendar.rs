use chrono::{DateTime, Local, NaiveDate, Utc};

/// Time zone used to cut timestamps into calendar days.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Calendar {
    Utc,
    #[default]
    Local,
}

impl Calendar {
    pub fn day_of(&self, unix_seconds: i64) -> Option<NaiveDate> {
        let utc = DateTime::<Utc>::from_timestamp(unix_seconds, 0)?;
        Some(match self {
            Calendar::Utc => utc.date_naive(),
            Calendar::Local => utc.with_timezone(&Local).date_naive(),
        })
    }

    pub fn today(&self) -> NaiveDate {
        match self {
            Calendar::Utc => Utc::now().date_naive(),
            Calendar::Local => Local::now().date_naive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::calendar::Calendar;
    use chrono::NaiveDate;

    #[test]
    fn utc_day_boundaries() {
        // 2024-06-01T23:59:59Z and the following second
        assert_eq!(
            Calendar::Utc.day_of(1_717_286_399),
            NaiveDate::from_ymd_opt(2024, 6, 1)
        );
        assert_eq!(
            Calendar::Utc.day_of(1_717_286_400),
            NaiveDate::from_ymd_opt(2024, 6, 2)
        );
    }
}
