use chrono::{DateTime, Months, TimeDelta, Utc};
use core::time::Duration;

/// Log target for pagination decisions
const LOG_TARGET: &str = "  paginate";

/// Above this many expected results the client fetches in time partitions.
pub const PARTITION_THRESHOLD: u64 = 5_000;

const HIGH_LATENCY: Duration = Duration::from_millis(1000);
const LOW_LATENCY: Duration = Duration::from_millis(200);
const HIGH_LATENCY_PAGE_SIZE: u32 = 500;
const LOW_LATENCY_PAGE_SIZE: u32 = 50;

const LARGE_RESULT_SET: u64 = 10_000;
const LARGE_RESULT_PAGE_SIZE: u32 = 1_000;
const SMALL_RESULT_SET: u64 = 100;
const MIN_PAGE_SIZE: u32 = 10;

const MONTHLY_ABOVE: TimeDelta = TimeDelta::days(90);
const WEEKLY_ABOVE: TimeDelta = TimeDelta::days(30);

/// How a query is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Follow continuation tokens over the whole query.
    Standard,

    /// Split the creation-date range into slices and page through each.
    TimePartitioned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionGranularity {
    Single,
    Weekly,
    Monthly,
}

/// A half-open interval of creation dates, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    #[must_use]
    pub fn span(&self) -> TimeDelta {
        self.end - self.start
    }
}

/// Page size and traversal decisions for the listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationStrategy {
    base_page_size: u32,
    max_page_size: u32,
}

impl PaginationStrategy {
    #[must_use]
    pub fn new(base_page_size: u32, max_page_size: u32) -> Self {
        let max_page_size = max_page_size.max(1);
        Self {
            base_page_size: base_page_size.clamp(1, max_page_size),
            max_page_size,
        }
    }

    /// Picks a page size from the observed latency and the expected result count.
    ///
    /// Slow responses favor fewer, larger pages; fast ones favor smaller pages. Very large result
    /// sets use the largest pages, tiny ones a page just big enough. The result never exceeds the
    /// configured maximum.
    #[must_use]
    pub fn calculate_optimal_page_size(&self, endpoint: &str, estimated_total: Option<u64>, latency: Duration) -> u32 {
        let mut size = self.base_page_size;

        if latency > HIGH_LATENCY {
            size = HIGH_LATENCY_PAGE_SIZE;
        } else if latency < LOW_LATENCY {
            size = LOW_LATENCY_PAGE_SIZE;
        }

        match estimated_total {
            Some(total) if total > LARGE_RESULT_SET => size = LARGE_RESULT_PAGE_SIZE,
            Some(total) if total < SMALL_RESULT_SET => {
                size = u32::try_from(total).unwrap_or(u32::MAX).max(MIN_PAGE_SIZE);
            }
            _ => {}
        }

        let size = size.clamp(1, self.max_page_size);
        log::debug!(
            target: LOG_TARGET,
            "Page size {size} for {endpoint} (estimated total {}, latency {}ms)",
            estimated_total.map_or_else(|| "unknown".to_string(), |t| t.to_string()),
            latency.as_millis()
        );
        size
    }

    #[must_use]
    pub const fn select_strategy(estimated_total: Option<u64>) -> FetchStrategy {
        match estimated_total {
            Some(total) if total > PARTITION_THRESHOLD => FetchStrategy::TimePartitioned,
            _ => FetchStrategy::Standard,
        }
    }

    #[must_use]
    pub fn granularity(range: &TimeRange) -> PartitionGranularity {
        let span = range.span();
        if span > MONTHLY_ABOVE {
            PartitionGranularity::Monthly
        } else if span > WEEKLY_ABOVE {
            PartitionGranularity::Weekly
        } else {
            PartitionGranularity::Single
        }
    }

    /// Splits a range into contiguous, non-overlapping slices that exactly cover it.
    #[must_use]
    pub fn partition(range: TimeRange) -> Vec<TimeRange> {
        if range.end <= range.start {
            return vec![range];
        }

        let step: fn(DateTime<Utc>) -> Option<DateTime<Utc>> = match Self::granularity(&range) {
            PartitionGranularity::Single => return vec![range],
            PartitionGranularity::Weekly => |t| t.checked_add_signed(TimeDelta::weeks(1)),
            PartitionGranularity::Monthly => |t| t.checked_add_months(Months::new(1)),
        };

        let mut partitions = Vec::new();
        let mut cursor = range.start;
        while cursor < range.end {
            let next = step(cursor).map_or(range.end, |t| t.min(range.end));
            partitions.push(TimeRange::new(cursor, next));
            cursor = next;
        }
        partitions
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ENDPOINT: &str = "pullrequests";

    fn strategy() -> PaginationStrategy {
        PaginationStrategy::new(100, 1000)
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_base_size_for_ordinary_conditions() {
        assert_eq!(strategy().calculate_optimal_page_size(ENDPOINT, Some(500), ms(500)), 100);
        assert_eq!(strategy().calculate_optimal_page_size(ENDPOINT, None, ms(500)), 100);
    }

    #[test]
    fn test_latency_adjustments() {
        assert_eq!(strategy().calculate_optimal_page_size(ENDPOINT, Some(500), ms(1500)), 500);
        assert_eq!(strategy().calculate_optimal_page_size(ENDPOINT, Some(500), ms(50)), 50);
    }

    #[test]
    fn test_result_set_adjustments() {
        assert_eq!(strategy().calculate_optimal_page_size(ENDPOINT, Some(20_000), ms(500)), 1000);
        assert_eq!(strategy().calculate_optimal_page_size(ENDPOINT, Some(42), ms(500)), 42);
        assert_eq!(strategy().calculate_optimal_page_size(ENDPOINT, Some(3), ms(500)), 10);
        assert_eq!(strategy().calculate_optimal_page_size(ENDPOINT, Some(0), ms(1500)), 10);
    }

    #[test]
    fn test_clamped_to_maximum() {
        let strategy = PaginationStrategy::new(100, 200);
        assert_eq!(strategy.calculate_optimal_page_size(ENDPOINT, Some(20_000), ms(500)), 200);
        assert_eq!(strategy.calculate_optimal_page_size(ENDPOINT, Some(500), ms(1500)), 200);
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(PaginationStrategy::select_strategy(None), FetchStrategy::Standard);
        assert_eq!(PaginationStrategy::select_strategy(Some(5_000)), FetchStrategy::Standard);
        assert_eq!(PaginationStrategy::select_strategy(Some(5_001)), FetchStrategy::TimePartitioned);
    }

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn assert_exact_cover(range: TimeRange, partitions: &[TimeRange]) {
        assert_eq!(partitions.first().unwrap().start, range.start);
        assert_eq!(partitions.last().unwrap().end, range.end);
        for pair in partitions.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert!(partitions.iter().all(|p| p.start < p.end));
    }

    #[test]
    fn test_short_range_is_single() {
        let range = TimeRange::new(day(2024, 1, 1), day(2024, 1, 31));
        assert_eq!(PaginationStrategy::partition(range), vec![range]);
    }

    #[test]
    fn test_weekly_partitions() {
        let range = TimeRange::new(day(2024, 1, 1), day(2024, 2, 15));
        assert_eq!(PaginationStrategy::granularity(&range), PartitionGranularity::Weekly);
        let partitions = PaginationStrategy::partition(range);
        assert_eq!(partitions.len(), 7);
        assert_exact_cover(range, &partitions);
        assert_eq!(partitions[0].span(), TimeDelta::weeks(1));
    }

    #[test]
    fn test_monthly_partitions() {
        let range = TimeRange::new(day(2023, 1, 31), day(2024, 1, 15));
        assert_eq!(PaginationStrategy::granularity(&range), PartitionGranularity::Monthly);
        let partitions = PaginationStrategy::partition(range);
        assert_eq!(partitions.len(), 12);
        assert_exact_cover(range, &partitions);
    }

    #[test]
    fn test_every_instant_in_exactly_one_partition() {
        let range = TimeRange::new(day(2023, 6, 1), day(2024, 6, 1));
        let partitions = PaginationStrategy::partition(range);
        let mut instant = range.start;
        while instant < range.end {
            assert_eq!(partitions.iter().filter(|p| p.contains(instant)).count(), 1, "{instant}");
            instant += TimeDelta::hours(13);
        }
    }
}
