//! The runtime's packed wall-clock timestamp.
//!
//! A timestamp is a single `u64`: the top two bits say what kind of time it
//! is, the low 62 bits count 100ns ticks since 0001-01-01T00:00:00.

use std::fmt;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, TimeZone};

pub const KIND_MASK: u64 = 0xC000_0000_0000_0000;
pub const TICKS_MASK: u64 = 0x3FFF_FFFF_FFFF_FFFF;
const KIND_SHIFT: u32 = 62;

pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// Last tick of 9999-12-31, the largest value the runtime will construct.
pub const MAX_TICKS: u64 = 3_155_378_975_999_999_999;

/// Name of the `u64` field holding the packed value inside the timestamp
/// value type.
pub const BACKING_FIELD: &str = "_dateData";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimestampKind {
    Unspecified,
    Local,
    Utc,
}

impl TimestampKind {
    /// Flag `0b11` is reserved and reads as unspecified.
    fn from_flag(flag: u64) -> Self {
        match flag {
            0b01 => TimestampKind::Local,
            0b10 => TimestampKind::Utc,
            _ => TimestampKind::Unspecified,
        }
    }

    fn flag(self) -> u64 {
        match self {
            TimestampKind::Unspecified => 0b00,
            TimestampKind::Local => 0b01,
            TimestampKind::Utc => 0b10,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Timestamp {
    ticks: u64,
    kind: TimestampKind,
}

impl Timestamp {
    /// Ticks beyond 62 bits are discarded.
    pub fn new(ticks: u64, kind: TimestampKind) -> Self {
        Self { ticks: ticks & TICKS_MASK, kind }
    }

    pub fn unpack(packed: u64) -> Self {
        Self {
            ticks: packed & TICKS_MASK,
            kind: TimestampKind::from_flag((packed & KIND_MASK) >> KIND_SHIFT),
        }
    }

    pub fn pack(self) -> u64 {
        (self.kind.flag() << KIND_SHIFT) | self.ticks
    }

    pub fn ticks(self) -> u64 {
        self.ticks
    }

    pub fn kind(self) -> TimestampKind {
        self.kind
    }

    /// Calendar time to whole-second precision, or `None` past year 9999.
    pub fn to_naive(self) -> Option<NaiveDateTime> {
        if self.ticks > MAX_TICKS {
            return None;
        }
        let secs = i64::try_from(self.ticks / TICKS_PER_SECOND).ok()?;
        NaiveDate::from_ymd_opt(1, 1, 1)?
            .and_hms_opt(0, 0, 0)?
            .checked_add_signed(Duration::seconds(secs))
    }
}

/// Round-trip form, `yyyy-MM-ddTHH:mm:ss.fffffff` plus a kind suffix: `Z`
/// for UTC, the host's UTC offset for local, nothing for unspecified.
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Some(naive) = self.to_naive() else {
            return write!(f, "<out of range: {} ticks>", self.ticks);
        };
        write!(
            f,
            "{}.{:07}",
            naive.format("%Y-%m-%dT%H:%M:%S"),
            self.ticks % TICKS_PER_SECOND,
        )?;
        match self.kind {
            TimestampKind::Unspecified => Ok(()),
            TimestampKind::Utc => f.write_str("Z"),
            TimestampKind::Local => {
                let Some(offset) = Local.offset_from_local_datetime(&naive).earliest() else {
                    return Ok(());
                };
                let secs = offset.local_minus_utc();
                let sign = if secs < 0 { '-' } else { '+' };
                let mins = secs.unsigned_abs() / 60;
                write!(f, "{sign}{:02}:{:02}", mins / 60, mins % 60)
            }
        }
    }
}
