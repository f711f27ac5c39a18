// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Temporal value types.

use std::time::Duration as StdDuration;

use chrono::Duration as ChronoDuration;
use thiserror::Error;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// A signed span of time with nanosecond resolution.
///
/// The nanosecond component is normalized to `0..1_000_000_000`; negative
/// spans borrow from the seconds component, mirroring how the server encodes
/// durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration {
    seconds: i64,
    nanoseconds: u32,
}

/// Used when a duration conversion would overflow the representable range.
#[derive(Debug, Error)]
#[error("duration is out of range")]
pub struct DurationOutOfRangeError;

impl Duration {
    pub fn new(seconds: i64, nanoseconds: u32) -> Option<Self> {
        if nanoseconds >= NANOS_PER_SECOND as u32 {
            return None;
        }
        Some(Self {
            seconds,
            nanoseconds,
        })
    }

    #[inline]
    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    #[inline]
    pub fn nanoseconds(&self) -> u32 {
        self.nanoseconds
    }

    /// Whole milliseconds, rounding towards negative infinity.
    pub fn as_millis(&self) -> i64 {
        self.seconds
            .saturating_mul(1_000)
            .saturating_add((self.nanoseconds / 1_000_000) as i64)
    }
}

impl TryFrom<ChronoDuration> for Duration {
    type Error = DurationOutOfRangeError;

    fn try_from(value: ChronoDuration) -> Result<Self, Self::Error> {
        let seconds = value.num_seconds();
        let sub_second = value - ChronoDuration::seconds(seconds);
        let nanoseconds = sub_second
            .num_nanoseconds()
            .expect("sub-second remainder cannot overflow");
        let (seconds, nanoseconds) = if nanoseconds < 0 {
            (
                seconds.checked_sub(1).ok_or(DurationOutOfRangeError)?,
                (nanoseconds + NANOS_PER_SECOND) as u32,
            )
        } else {
            (seconds, nanoseconds as u32)
        };
        Ok(Self {
            seconds,
            nanoseconds,
        })
    }
}

impl TryFrom<StdDuration> for Duration {
    type Error = DurationOutOfRangeError;

    fn try_from(value: StdDuration) -> Result<Self, Self::Error> {
        let seconds = i64::try_from(value.as_secs()).map_err(|_| DurationOutOfRangeError)?;
        Ok(Self {
            seconds,
            nanoseconds: value.subsec_nanos(),
        })
    }
}
