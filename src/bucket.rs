//! Purpose: Derive time-bucket names for lines ingested without an explicit key.
//! Exports: `TimeBucket`, `bucket_for`.
//! Role: Partition discrete log writes by UTC date (directory) and hour (name).
//! Invariants: Directory is `YYYYMMDD`, name is the zero-padded hour `HH`.
//! Invariants: Buckets are computed in UTC regardless of the local timezone.
use time::OffsetDateTime;

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct TimeBucket {
    pub(crate) directory: String,
    pub(crate) name: String,
}

pub(crate) fn bucket_for(at: OffsetDateTime) -> TimeBucket {
    let at = at.to_offset(time::UtcOffset::UTC);
    TimeBucket {
        directory: format!("{:04}{:02}{:02}", at.year(), u8::from(at.month()), at.day()),
        name: format!("{:02}", at.hour()),
    }
}

pub(crate) fn current_bucket() -> TimeBucket {
    bucket_for(OffsetDateTime::now_utc())
}
