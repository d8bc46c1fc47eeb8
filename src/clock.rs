// Date formatting is *heavily* adapted from:
// https://github.com/errantmind/faf/blob/2b1456d3fb492811c173c1c467f656df543ffdc6/src/http_date.rs
//
// MIT License
//
// Copyright (c) 2018 James Bates
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Shared `Date` header cache (spec §3: Clock), updated at most once per
//! second. The teacher keeps this cache thread-local since each thread owns
//! one connection at a time; this crate's `Clock` is instead a single
//! mutex-guarded cache shared by the whole `Application` (spec §6), since
//! one process usually runs many more connections than the date changes per
//! second — a shared cache amortizes the formatting cost across all of them
//! instead of paying it once per thread per second.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const DATE_LEN: usize = 29;
const BASE: [u8; DATE_LEN] = *b"Mon, 00 Jan 0000 00:00:00 GMT";

struct Cached {
    buf: [u8; DATE_LEN],
    last_sec: i64,
}

pub struct Clock {
    cache: Mutex<Cached>,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(Cached {
                buf: BASE,
                last_sec: i64::MIN,
            }),
        }
    }

    /// Returns the current HTTP-date string, reformatting only when the
    /// wall-clock second has advanced since the last call.
    pub fn now(&self) -> String {
        let now = now_unix_sec();
        let mut cache = self.cache.lock().unwrap();
        if cache.last_sec != now {
            format_http_date(&mut cache.buf, now);
            cache.last_sec = now;
        }
        String::from_utf8_lossy(&cache.buf).into_owned()
    }
}

/// Formats an arbitrary unix timestamp as an HTTP-date string, for headers
/// like `Last-Modified` that aren't tied to "now" (spec §4.6: static files).
pub fn format_date(secs_since_epoch: i64) -> String {
    let mut buf = BASE;
    format_http_date(&mut buf, secs_since_epoch);
    String::from_utf8_lossy(&buf).into_owned()
}

fn now_unix_sec() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn divmod_i64(n: i64, d: i64) -> (i64, i64) {
    (n.div_euclid(d), n.rem_euclid(d))
}

fn format_http_date(buf: &mut [u8; DATE_LEN], secs_since_epoch: i64) {
    *buf = BASE;

    const SECS_PER_MIN: i64 = 60;
    const SECS_PER_HOUR: i64 = 3600;
    const SECS_PER_DAY: i64 = 86400;

    const LEAPOCH: i64 = 11017;
    const DAYS_PER_400Y: i64 = 365 * 400 + 97;
    const DAYS_PER_100Y: i64 = 365 * 100 + 24;
    const DAYS_PER_4Y: i64 = 365 * 4 + 1;

    let (days_total, secs_of_day) = {
        let (d, r) = divmod_i64(secs_since_epoch, SECS_PER_DAY);
        (d - LEAPOCH, r)
    };

    let mut wday = (3 + days_total).rem_euclid(7);
    if wday <= 0 {
        wday += 7;
    }
    let woff = ((wday as usize) - 1) * 3;

    let qc_cycles = days_total.div_euclid(DAYS_PER_400Y);
    let mut remdays = days_total.rem_euclid(DAYS_PER_400Y);

    let mut c_cycles = remdays / DAYS_PER_100Y;
    if c_cycles == 4 {
        c_cycles -= 1;
    }
    remdays -= c_cycles * DAYS_PER_100Y;

    let mut q_cycles = remdays / DAYS_PER_4Y;
    if q_cycles == 25 {
        q_cycles -= 1;
    }
    remdays -= q_cycles * DAYS_PER_4Y;

    let mut remyears = remdays / 365;
    if remyears == 4 {
        remyears -= 1;
    }
    remdays -= remyears * 365;

    let mut year = 2000 + remyears + 4 * q_cycles + 100 * c_cycles + 400 * qc_cycles;

    const WDAY_STRS: &[u8; 21] = b"MonTueWedThuFriSatSun";
    const MON_STRS: &[u8; 36] = b"JanFebMarAprMayJunJulAugSepOctNovDec";
    const MONTHS: [i64; 12] = [31, 30, 31, 30, 31, 31, 30, 31, 30, 31, 31, 29];

    let mut mon_idx = 0;
    let mut rd = remdays;
    while mon_idx < 12 {
        let ml = MONTHS[mon_idx];
        if rd < ml {
            break;
        }
        rd -= ml;
        mon_idx += 1;
    }

    let mday = (rd + 1) as u8;

    let mut mon = mon_idx + 3;
    if mon > 12 {
        year += 1;
        mon -= 12;
    }
    let mon = mon as u8;

    let (hour, rem) = divmod_i64(secs_of_day, SECS_PER_HOUR);
    let (min, sec) = divmod_i64(rem, SECS_PER_MIN);
    let hour = hour as u8;
    let min = min as u8;
    let sec = sec as u8;

    buf[0..3].copy_from_slice(&WDAY_STRS[woff..woff + 3]);

    write_2d(&mut buf[5..7], mday);

    let moff = ((mon as usize) - 1) * 3;
    buf[8..11].copy_from_slice(&MON_STRS[moff..moff + 3]);

    write_4d(&mut buf[12..16], year as u16);

    write_2d(&mut buf[17..19], hour);
    write_2d(&mut buf[20..22], min);
    write_2d(&mut buf[23..25], sec);
}

fn write_2d(buf: &mut [u8], v: u8) {
    buf[0] = b'0' + (v / 10);
    buf[1] = b'0' + (v % 10);
}

fn write_4d(buf: &mut [u8], v: u16) {
    buf[0] = b'0' + ((v / 1000) as u8);
    buf[1] = b'0' + ((v / 100 % 10) as u8);
    buf[2] = b'0' + ((v / 10 % 10) as u8);
    buf[3] = b'0' + ((v % 10) as u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_known_epoch_second() {
        // 2024-01-01T00:00:00Z
        let mut buf = BASE;
        format_http_date(&mut buf, 1704067200);
        assert_eq!(&buf[..], b"Mon, 01 Jan 2024 00:00:00 GMT");
    }

    #[test]
    fn clock_now_produces_well_formed_date_string() {
        let clock = Clock::new();
        let s = clock.now();
        assert_eq!(s.len(), DATE_LEN);
        assert!(s.ends_with("GMT"));
    }
}
