use std::ops::Range;

/// Contiguous half-open range of renderable items assigned to one worker for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub worker: usize,
    pub start: usize,
    pub end: usize,
}

impl WorkItem {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Split `[0, item_count)` into `workers` contiguous ranges of near-equal size.
///
/// Each range holds at most `ceil(item_count / workers)` items. Ranges are
/// filled front to back, so trailing workers may get an empty range and the
/// last non-empty range takes whatever is left. The ranges are disjoint and
/// cover every index once.
///
/// # Panics
///
/// Panics if `workers` is zero.
pub fn partition(item_count: usize, workers: usize) -> Vec<WorkItem> {
    assert!(workers > 0, "partition needs at least one worker");

    let per_worker = item_count.div_ceil(workers);
    (0..workers)
        .map(|worker| {
            let start = (worker * per_worker).min(item_count);
            let end = if worker + 1 == workers {
                item_count
            } else {
                (start + per_worker).min(item_count)
            };
            WorkItem { worker, start, end }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_cover(items: &[WorkItem], item_count: usize) {
        let mut seen = vec![0u32; item_count];
        let mut next = 0;
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item.worker, i);
            assert_eq!(item.start, next, "ranges must be contiguous");
            assert!(item.start <= item.end);
            for index in item.range() {
                seen[index] += 1;
            }
            next = item.end;
        }
        assert_eq!(next, item_count);
        assert!(seen.iter().all(|&count| count == 1));
    }

    #[test]
    fn test_partition_covers_exactly_once() {
        for workers in 1..=17 {
            for item_count in 0..=70 {
                let items = partition(item_count, workers);
                assert_eq!(items.len(), workers);
                assert_exact_cover(&items, item_count);
            }
        }
    }

    #[test]
    fn test_last_range_takes_remainder() {
        let items = partition(10, 4);
        let lengths: Vec<_> = items.iter().map(WorkItem::len).collect();
        assert_eq!(lengths, vec![3, 3, 3, 1]);
    }

    #[test]
    fn test_fewer_items_than_workers() {
        let items = partition(3, 8);
        assert_eq!(items[0].range(), 0..1);
        assert_eq!(items[1].range(), 1..2);
        assert_eq!(items[2].range(), 2..3);
        assert!(items[3..].iter().all(WorkItem::is_empty));
    }

    #[test]
    fn test_nine_items_over_sixteen_workers() {
        let items = partition(9, 16);
        assert_exact_cover(&items, 9);
        assert!(items[..9].iter().all(|item| item.len() == 1));
        assert!(items[9..].iter().all(WorkItem::is_empty));
    }

    #[test]
    fn test_no_range_exceeds_ceiling_share() {
        for workers in 1..=17 {
            for item_count in 0usize..=70 {
                let ceiling = item_count.div_ceil(workers);
                let items = partition(item_count, workers);
                assert!(
                    items.iter().all(|item| item.len() <= ceiling),
                    "{item_count} items over {workers} workers exceeded {ceiling}"
                );
            }
        }
    }

    #[test]
    #[should_panic(expected = "at least one worker")]
    fn test_zero_workers_panics() {
        partition(5, 0);
    }
}
