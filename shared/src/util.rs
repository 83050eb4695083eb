/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a Snowflake-style i64 for use as resource ID.
///
/// Layout (53 bits, fits in JavaScript's Number.MAX_SAFE_INTEGER):
///   - 41 bits: milliseconds since 2024-01-01 UTC (~69 years)
///   - 12 bits: random (4096 values per ms, collision-free at marketplace scale)
pub fn snowflake_id() -> i64 {
    use rand::Rng;
    // Custom epoch: 2024-01-01 00:00:00 UTC
    const EPOCH_MS: i64 = 1_704_067_200_000;
    let now = now_millis();
    let ts = (now - EPOCH_MS) & 0x1FF_FFFF_FFFF; // 41 bits
    let rand_bits: i64 = rand::thread_rng().gen_range(0..0x1000); // 12 bits
    (ts << 12) | rand_bits
}

/// UTC calendar day key (`YYYYMMDD`) used to scope daily order counters.
pub fn today_utc() -> String {
    chrono::Utc::now().format("%Y%m%d").to_string()
}

/// Zero-padded display form of a daily order number (`#007`).
///
/// Numbers above 999 simply widen, they are never truncated.
pub fn format_display_number(n: i64) -> String {
    format!("#{n:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_ids_are_positive_and_distinct() {
        let a = snowflake_id();
        let b = snowflake_id();
        assert!(a > 0);
        assert!(b > 0);
        // Same millisecond collisions are possible but vanishingly unlikely
        // across two consecutive calls with 12 random bits.
        let ids: Vec<i64> = (0..64).map(|_| snowflake_id()).collect();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert!(unique.len() > 1);
    }

    #[test]
    fn test_today_utc_format() {
        let day = today_utc();
        assert_eq!(day.len(), 8);
        assert!(day.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_format_display_number() {
        assert_eq!(format_display_number(1), "#001");
        assert_eq!(format_display_number(42), "#042");
        assert_eq!(format_display_number(999), "#999");
        assert_eq!(format_display_number(1000), "#1000");
    }
}
