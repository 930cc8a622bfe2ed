//! 日历计算工具
//!
//! 时间间隔的累加都在本地时区上进行，月份间隔按当前月份的天数推进。

use chrono::{DateTime, Datelike, Duration, NaiveDate, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use jobrunner_core::models::IntervalType;

/// 指定月份的天数，`month` 取值1到12
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1)
        .zip(NaiveDate::from_ymd_opt(next_year, next_month, 1))
        .map(|(first, next)| (next - first).num_days() as u32)
        .unwrap_or(31)
}

/// 按间隔类型推进时间，超出可表示的时间范围时返回 `None`
///
/// MINUTE、HOUR、DAY 为固定时长；MONTH 每一步推进当前（本地）月份的天数，
/// 共推进 `value` 次。
pub fn increment(
    dts: DateTime<Tz>,
    interval_type: IntervalType,
    value: u32,
) -> Option<DateTime<Tz>> {
    let value = i64::from(value);
    match interval_type {
        IntervalType::Minute => dts.checked_add_signed(Duration::minutes(value)),
        IntervalType::Hour => dts.checked_add_signed(Duration::hours(value)),
        IntervalType::Day => dts.checked_add_signed(Duration::days(value)),
        IntervalType::Month => {
            let mut result = dts;
            for _ in 0..value {
                let days = days_in_month(result.year(), result.month());
                result = result.checked_add_signed(Duration::days(i64::from(days)))?;
            }
            Some(result)
        }
    }
}

/// 修正参考时间和候选时间之间的夏令时差
///
/// 候选时间加上两者UTC偏移量之差，使重新调度的本地钟点与参考时间一致。
pub fn correct_dst_offset(
    reference: DateTime<Utc>,
    candidate: DateTime<Utc>,
    tz: Tz,
) -> DateTime<Utc> {
    let reference_offset = utc_offset_seconds(reference, tz);
    let candidate_offset = utc_offset_seconds(candidate, tz);

    candidate
        .checked_add_signed(Duration::seconds(i64::from(reference_offset - candidate_offset)))
        .unwrap_or(candidate)
}

fn utc_offset_seconds(dts: DateTime<Utc>, tz: Tz) -> i32 {
    tz.offset_from_utc_datetime(&dts.naive_utc())
        .fix()
        .local_minus_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Amsterdam;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Tz> {
        Tz::UTC.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2023, 1), 31);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 4), 30);
        assert_eq!(days_in_month(2023, 12), 31);
    }

    #[test]
    fn test_fixed_increments() {
        let start = utc(2023, 6, 1, 10);
        assert_eq!(
            increment(start, IntervalType::Minute, 15),
            Some(start + Duration::minutes(15))
        );
        assert_eq!(increment(start, IntervalType::Hour, 2), Some(utc(2023, 6, 1, 12)));
        assert_eq!(increment(start, IntervalType::Day, 3), Some(utc(2023, 6, 4, 10)));
    }

    #[test]
    fn test_month_increment_uses_current_month_length() {
        assert_eq!(
            increment(utc(2023, 1, 1, 0), IntervalType::Month, 1),
            Some(utc(2023, 2, 1, 0))
        );
        assert_eq!(
            increment(utc(2023, 12, 1, 0), IntervalType::Month, 1),
            Some(utc(2024, 1, 1, 0))
        );
        assert_eq!(
            increment(utc(2023, 1, 31, 0), IntervalType::Month, 1),
            Some(utc(2023, 3, 3, 0))
        );
        assert_eq!(
            increment(utc(2023, 1, 1, 0), IntervalType::Month, 2),
            Some(utc(2023, 3, 1, 0))
        );
    }

    #[test]
    fn test_increment_out_of_range() {
        let start = utc(2024, 1, 1, 0);
        assert_eq!(increment(start, IntervalType::Day, i32::MAX as u32), None);
        assert_eq!(increment(start, IntervalType::Month, i32::MAX as u32), None);
        assert!(increment(start, IntervalType::Minute, i32::MAX as u32).is_some());
    }

    #[test]
    fn test_dst_correction_keeps_local_hour() {
        // 2024-03-31 欧洲夏令时开始
        let reference = Amsterdam
            .with_ymd_and_hms(2024, 3, 30, 4, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        let candidate = reference + Duration::days(1);
        assert_eq!(candidate.with_timezone(&Amsterdam).format("%H:%M").to_string(), "05:00");

        let corrected = correct_dst_offset(reference, candidate, Amsterdam);
        let local = corrected.with_timezone(&Amsterdam);
        assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2024-03-31 04:00");
    }

    #[test]
    fn test_dst_correction_without_offset_change() {
        let reference = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let candidate = reference + Duration::days(1);
        assert_eq!(correct_dst_offset(reference, candidate, Amsterdam), candidate);
    }
}
