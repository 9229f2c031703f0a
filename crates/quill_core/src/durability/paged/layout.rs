//! Leaf packing and page allocation.
//!
//! A dirty table or index is rewritten as a chain of leaf nodes. Cells are
//! appended to the current leaf until the next one would push it past
//! `usable_page_bytes * fill`, at which point the leaf is split off and a new
//! one started. A leaf always takes at least one cell; a cell bigger than a
//! page gets a multi-page run of its own.

use super::node::{PageRun, NODE_HEADER};
use quill_storage::PageId;
use std::collections::BTreeSet;

/// Lowest fill ratio the paged backend will honour.
pub(super) const MIN_FILL_PERCENT: f64 = 0.1;

/// Highest fill ratio the paged backend will honour.
pub(super) const MAX_FILL_PERCENT: f64 = 1.0;

/// Resolves a hint against the default and clamps it to the supported range.
pub(super) fn effective_fill(hint: Option<f64>, default: f64) -> f64 {
    let requested = hint.filter(|p| p.is_finite()).unwrap_or(default);
    if requested.is_finite() {
        requested.clamp(MIN_FILL_PERCENT, MAX_FILL_PERCENT)
    } else {
        crate::tuning::DEFAULT_FILL_PERCENT
    }
}

/// Splits encoded cells into leaf payloads.
pub(super) fn pack_leaves(cells: Vec<Vec<u8>>, page_size: usize, fill: f64) -> Vec<Vec<u8>> {
    let usable = page_size.saturating_sub(NODE_HEADER);
    let threshold = ((usable as f64 * fill) as usize).max(1);

    let mut leaves = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    for cell in cells {
        if !current.is_empty() && current.len() + cell.len() > threshold {
            leaves.push(std::mem::take(&mut current));
        }
        current.extend_from_slice(&cell);
    }
    if !current.is_empty() {
        leaves.push(current);
    }
    leaves
}

/// Pages that no reachable node uses.
#[derive(Debug, Clone, Default)]
pub(super) struct FreeList {
    pages: BTreeSet<PageId>,
}

impl FreeList {
    pub(super) fn from_pages(pages: impl IntoIterator<Item = PageId>) -> Self {
        Self {
            pages: pages.into_iter().collect(),
        }
    }

    /// Takes `count` contiguous free pages, or grows the store from `end`.
    pub(super) fn allocate(&mut self, count: u64, end: &mut u64) -> PageRun {
        if let Some(start) = self.find_run(count) {
            for page in start..start + count {
                self.pages.remove(&page);
            }
            return PageRun {
                start,
                pages: count,
            };
        }

        let start = *end;
        *end += count;
        PageRun {
            start,
            pages: count,
        }
    }

    pub(super) fn release(&mut self, run: PageRun) {
        self.pages.extend(run.page_ids());
    }

    pub(super) fn len(&self) -> u64 {
        self.pages.len() as u64
    }

    /// Counts the free pages directly below `end`.
    pub(super) fn trailing(&self, end: u64) -> u64 {
        self.pages
            .iter()
            .rev()
            .zip((0..end).rev())
            .take_while(|(free, page)| *free == page)
            .count() as u64
    }

    /// Forgets every page at or past `end`.
    pub(super) fn truncate(&mut self, end: u64) {
        self.pages.retain(|&page| page < end);
    }

    fn find_run(&self, count: u64) -> Option<PageId> {
        let mut run_start = None;
        let mut run_len = 0u64;
        let mut previous = None;

        for &page in &self.pages {
            if previous.is_some_and(|p: PageId| p + 1 == page) {
                run_len += 1;
            } else {
                run_start = Some(page);
                run_len = 1;
            }
            if run_len == count {
                return run_start;
            }
            previous = Some(page);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_defaults_and_clamps() {
        assert_eq!(effective_fill(None, 0.5), 0.5);
        assert_eq!(effective_fill(Some(0.9), 0.5), 0.9);
        assert_eq!(effective_fill(Some(3.0), 0.5), MAX_FILL_PERCENT);
        assert_eq!(effective_fill(Some(0.0), 0.5), MIN_FILL_PERCENT);
        assert_eq!(effective_fill(Some(f64::NAN), 0.7), 0.7);
        assert_eq!(effective_fill(None, f64::NAN), 0.5);
    }

    #[test]
    fn higher_fill_packs_fewer_leaves() {
        let cells = vec![vec![0u8; 50]; 40];
        let loose = pack_leaves(cells.clone(), 512, 0.5);
        let tight = pack_leaves(cells, 512, 1.0);
        assert!(tight.len() < loose.len());
        assert_eq!(tight.iter().map(Vec::len).sum::<usize>(), 2000);
        assert!(tight.iter().all(|leaf| leaf.len() <= 500));
    }

    #[test]
    fn oversized_cell_gets_its_own_leaf() {
        let cells = vec![vec![1u8; 10], vec![2u8; 2000], vec![3u8; 10]];
        let leaves = pack_leaves(cells, 512, 1.0);
        assert_eq!(leaves.len(), 3);
        assert_eq!(leaves[1].len(), 2000);
    }

    #[test]
    fn no_cells_no_leaves() {
        assert!(pack_leaves(Vec::new(), 512, 0.5).is_empty());
    }

    #[test]
    fn allocate_prefers_contiguous_free_pages() {
        let mut free = FreeList::from_pages([3, 5, 6, 7, 10]);
        let mut end = 11;

        let run = free.allocate(3, &mut end);
        assert_eq!(run, PageRun { start: 5, pages: 3 });
        assert_eq!(free.len(), 2);

        let grown = free.allocate(2, &mut end);
        assert_eq!(grown, PageRun { start: 11, pages: 2 });
        assert_eq!(end, 13);

        free.release(run);
        assert_eq!(free.len(), 5);
    }

    #[test]
    fn trailing_counts_only_the_free_tail() {
        let mut free = FreeList::from_pages([3, 8, 9, 10]);
        assert_eq!(free.trailing(11), 3);
        assert_eq!(free.trailing(12), 0);
        assert_eq!(FreeList::default().trailing(5), 0);

        free.truncate(8);
        assert_eq!(free.len(), 1);
        assert_eq!(free.trailing(4), 1);
    }
}
