//! Shared cursor handing out contiguous index ranges to replicas

use std::fmt;
use tokio::sync::Mutex;

/// Inclusive index range `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexRange {
    pub start: i64,
    pub end: i64,
}

impl IndexRange {
    pub fn width(&self) -> i64 {
        self.end - self.start + 1
    }

    pub fn overlaps(&self, other: &IndexRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.start, self.end)
    }
}

#[derive(Debug, Default)]
struct Cursor {
    next: Option<i64>,
    /// Set once a range ended at `i64::MAX`; nothing is left to hand out
    exhausted: bool,
}

/// Range allocator over a single mutex-guarded cursor
///
/// The cursor holds the next unallocated start index. Every read-modify-write
/// happens under the lock, so concurrent callers never see the same start.
#[derive(Debug, Default)]
pub struct RangeAllocator {
    cursor: Mutex<Cursor>,
}

impl RangeAllocator {
    /// `seed` is the first start index handed out; `None` defers to the
    /// caller's default on the first allocation
    pub fn new(seed: Option<i64>) -> Self {
        Self {
            cursor: Mutex::new(Cursor {
                next: seed,
                exhausted: false,
            }),
        }
    }

    /// Claim the next `width` indexes
    ///
    /// `default_start` is used only while the cursor is unset. No upper
    /// bound is enforced here. Returns `None` once the `i64` index space is
    /// used up; a range that would overflow is cut at `i64::MAX`.
    pub async fn allocate(&self, width: i64, default_start: i64) -> Option<IndexRange> {
        let mut cursor = self.cursor.lock().await;
        if cursor.exhausted {
            return None;
        }

        let start = cursor.next.unwrap_or(default_start);
        let end = start.saturating_add(width.max(1) - 1);
        match end.checked_add(1) {
            Some(next) => cursor.next = Some(next),
            None => cursor.exhausted = true,
        }

        tracing::trace!(start, end, "Allocated index range");
        Some(IndexRange { start, end })
    }

    /// Reset the cursor
    pub async fn seed(&self, next: Option<i64>) {
        let mut cursor = self.cursor.lock().await;
        cursor.next = next;
        cursor.exhausted = false;
    }

    /// Next start index that would be handed out, if the cursor is set
    pub async fn peek(&self) -> Option<i64> {
        let cursor = self.cursor.lock().await;
        if cursor.exhausted {
            None
        } else {
            cursor.next
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_allocation_uses_default_start() {
        let allocator = RangeAllocator::new(None);
        assert_eq!(allocator.peek().await, None);

        let range = allocator.allocate(10, 0).await;
        assert_eq!(range, Some(IndexRange { start: 0, end: 9 }));
        assert_eq!(allocator.peek().await, Some(10));

        // default is ignored once the cursor is set
        let range = allocator.allocate(5, 1000).await;
        assert_eq!(range, Some(IndexRange { start: 10, end: 14 }));
    }

    #[tokio::test]
    async fn test_seeded_cursor_wins() {
        let allocator = RangeAllocator::new(Some(40));
        let range = allocator.allocate(10, 0).await.unwrap();
        assert_eq!(range.to_string(), "[40,49]");

        allocator.seed(Some(7)).await;
        assert_eq!(
            allocator.allocate(1, 0).await,
            Some(IndexRange { start: 7, end: 7 })
        );
    }

    #[tokio::test]
    async fn test_allocation_near_max_does_not_overflow() {
        let allocator = RangeAllocator::new(Some(i64::MAX - 4));

        let range = allocator.allocate(10, 0).await;
        assert_eq!(
            range,
            Some(IndexRange {
                start: i64::MAX - 4,
                end: i64::MAX
            })
        );
        assert_eq!(allocator.allocate(10, 0).await, None);
        assert_eq!(allocator.peek().await, None);

        allocator.seed(Some(0)).await;
        assert_eq!(
            allocator.allocate(2, 0).await,
            Some(IndexRange { start: 0, end: 1 })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocations_never_overlap() {
        let allocator = Arc::new(RangeAllocator::new(None));
        let mut handles = Vec::new();
        for _ in 0..64 {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move { allocator.allocate(10, 0).await }));
        }

        let mut ranges = Vec::new();
        for handle in handles {
            ranges.push(handle.await.unwrap().unwrap());
        }
        ranges.sort_by_key(|r| r.start);

        for (i, range) in ranges.iter().enumerate() {
            assert_eq!(range.start, i as i64 * 10);
            assert_eq!(range.width(), 10);
        }
    }

    proptest! {
        #[test]
        fn prop_ranges_are_contiguous(
            seed in -1_000i64..1_000,
            widths in proptest::collection::vec(1i64..500, 1..40),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let ranges: Vec<IndexRange> = rt.block_on(async {
                let allocator = RangeAllocator::new(Some(seed));
                let mut ranges = Vec::new();
                for width in &widths {
                    ranges.push(allocator.allocate(*width, 0).await.unwrap());
                }
                ranges
            });

            prop_assert_eq!(ranges[0].start, seed);
            for (range, width) in ranges.iter().zip(&widths) {
                prop_assert_eq!(range.width(), *width);
            }
            for pair in ranges.windows(2) {
                prop_assert_eq!(pair[0].end + 1, pair[1].start);
                prop_assert!(!pair[0].overlaps(&pair[1]));
            }
        }
    }
}
