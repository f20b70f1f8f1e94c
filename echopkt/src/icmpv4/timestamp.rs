use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{ByteOrder, NetworkEndian};
use bytes::BufMut;
use log::trace;

/// Byte length of the BSD timestamp that may follow the echo header.
pub const ECHO_TIMESTAMP_LEN: usize = 8;

/// Largest microseconds value a plausible timestamp may carry.
pub const MAX_MICROS: u32 = 999_999;

/// Earliest calendar year a plausible timestamp may fall in.
pub const UNIX_EPOCH_YEAR: u32 = 1970;

const SECS_PER_DAY: u64 = 86_400;

/// The send time that BSD-derived `ping` implementations place between the
/// echo header and the echo data.
///
/// Nothing in the message says whether it is present, so a decoder guesses:
/// see [`detect`](Self::detect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EchoTimestamp {
    /// Seconds since the Unix epoch.
    pub secs: u32,
    /// Microseconds within the second.
    pub micros: u32,
}

impl EchoTimestamp {
    #[inline]
    pub fn new(secs: u32, micros: u32) -> Self {
        Self { secs, micros }
    }

    /// The current wall-clock time.
    ///
    /// A clock set before 1970 yields the epoch. Seconds wrap modulo 2^32
    /// after early 2106.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            secs: elapsed.as_secs() as u32,
            micros: elapsed.subsec_micros(),
        }
    }

    /// Read a timestamp from the first 8 bytes of `buf`, seconds first, both
    /// in network order.
    ///
    /// # Panics
    /// Panics if `buf` is shorter than 8 bytes.
    #[inline]
    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            secs: NetworkEndian::read_u32(&buf[0..4]),
            micros: NetworkEndian::read_u32(&buf[4..8]),
        }
    }

    /// Append the wire form to `buf`.
    #[inline]
    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(self.secs);
        buf.put_u32(self.micros);
    }

    #[inline]
    pub fn to_bytes(&self) -> [u8; ECHO_TIMESTAMP_LEN] {
        let mut buf = [0; ECHO_TIMESTAMP_LEN];
        NetworkEndian::write_u32(&mut buf[0..4], self.secs);
        NetworkEndian::write_u32(&mut buf[4..8], self.micros);
        buf
    }

    /// UTC calendar year of `secs`.
    #[inline]
    pub fn year(&self) -> u32 {
        unix_year(u64::from(self.secs))
    }

    /// Whether the value looks like a real send time when the current year is `now_year`.
    ///
    /// The year of `secs` must lie in `[1970, now_year]` and `micros` must
    /// not exceed 999999.
    pub fn plausible_at(&self, now_year: u32) -> bool {
        let year = self.year();
        (UNIX_EPOCH_YEAR..=now_year).contains(&year) && self.micros <= MAX_MICROS
    }

    /// Same as [`plausible_at`](Self::plausible_at) with the current UTC year.
    pub fn is_plausible(&self) -> bool {
        self.plausible_at(current_year())
    }

    /// Guess whether `buf`, the bytes that follow an echo header, starts
    /// with a timestamp.
    ///
    /// Returns `None` when `buf` is shorter than 8 bytes or when its first 8
    /// bytes are not a plausible timestamp for `now_year`. Either answer can
    /// be wrong: echo data that happens to look like a recent time is taken
    /// for a timestamp.
    pub fn detect(buf: &[u8], now_year: u32) -> Option<Self> {
        if buf.len() < ECHO_TIMESTAMP_LEN {
            return None;
        }

        let ts = Self::from_bytes(buf);
        if ts.plausible_at(now_year) {
            trace!("echo timestamp accepted: {}.{:06}", ts.secs, ts.micros);
            Some(ts)
        } else {
            trace!(
                "echo timestamp rejected: secs {} (year {}), micros {}",
                ts.secs,
                ts.year(),
                ts.micros
            );
            None
        }
    }
}

/// The current UTC calendar year. A clock set before 1970 yields 1970.
pub(crate) fn current_year() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| unix_year(elapsed.as_secs()))
        .unwrap_or(UNIX_EPOCH_YEAR)
}

// Proleptic Gregorian year of a Unix time, using the days-to-civil
// conversion that counts eras of 400 years starting on March 1st.
fn unix_year(secs: u64) -> u32 {
    let days = (secs / SECS_PER_DAY) as i64;

    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;

    let year = yoe + era * 400;
    // Months are counted from March, so January and February belong to the next year.
    if mp >= 10 {
        (year + 1) as u32
    } else {
        year as u32
    }
}
