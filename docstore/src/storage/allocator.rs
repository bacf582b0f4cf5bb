//! In-memory page allocation map.
//!
//! Nothing here is persisted. Opening a store rebuilds the map from the
//! pages reachable through the index, so pages released before a crash, or
//! written by an operation that never committed, come back as free.

// Page ids index a Vec; stores never approach usize::MAX pages.
#![allow(clippy::cast_possible_truncation)]

use crate::storage::page::PageId;

/// Pages that are never allocated or freed: the superblock.
pub const RESERVED_PAGES: u64 = 1;

const WORD_BITS: u64 = u64::BITS as u64;

/// One bit per page, set while the page is in use.
#[derive(Debug)]
pub struct PageAllocator {
    words: Vec<u64>,
    total_pages: u64,
    used: u64,
    /// No free page lives in a word before this one.
    first_candidate_word: usize,
}

impl PageAllocator {
    /// An allocator tracking `total_pages` pages with only the reserved
    /// ones in use.
    #[must_use]
    pub fn new(total_pages: u64) -> Self {
        let mut allocator = Self {
            words: Vec::new(),
            total_pages: 0,
            used: 0,
            first_candidate_word: 0,
        };
        allocator.grow(total_pages.max(RESERVED_PAGES));
        for page_id in 0..RESERVED_PAGES {
            allocator.mark_used(page_id);
        }
        allocator
    }

    /// Take the lowest free page, or `None` when every tracked page is in
    /// use and the caller has to grow first.
    pub fn allocate(&mut self) -> Option<PageId> {
        let start = self.first_candidate_word;
        let (offset, word) = self.words[start..]
            .iter()
            .enumerate()
            .find(|(_, word)| **word != u64::MAX)?;
        let page_id = (start + offset) as u64 * WORD_BITS + u64::from(word.trailing_ones());
        if page_id >= self.total_pages {
            return None;
        }

        self.first_candidate_word = start + offset;
        self.set(page_id, true);
        Some(page_id)
    }

    /// Release a page. Returns `false` for reserved, untracked or already
    /// free pages.
    pub fn free(&mut self, page_id: PageId) -> bool {
        if page_id < RESERVED_PAGES || !self.is_allocated(page_id) {
            return false;
        }
        self.set(page_id, false);
        self.first_candidate_word = self.first_candidate_word.min(word_index(page_id));
        true
    }

    /// Claim a specific page, tracking more pages if it lies past the end.
    pub fn mark_used(&mut self, page_id: PageId) {
        if page_id >= self.total_pages {
            self.grow(page_id + 1);
        }
        if !self.is_allocated(page_id) {
            self.set(page_id, true);
        }
    }

    #[must_use]
    pub fn is_allocated(&self, page_id: PageId) -> bool {
        page_id < self.total_pages && self.words[word_index(page_id)] & bit(page_id) != 0
    }

    #[must_use]
    pub const fn free_count(&self) -> u64 {
        self.total_pages - self.used
    }

    /// Pages in use, reserved pages included.
    #[must_use]
    pub const fn used_count(&self) -> u64 {
        self.used
    }

    #[must_use]
    pub const fn total_pages(&self) -> u64 {
        self.total_pages
    }

    /// Track `new_total_pages` pages; the added ones are free.
    pub fn grow(&mut self, new_total_pages: u64) {
        if new_total_pages <= self.total_pages {
            return;
        }
        self.words
            .resize(new_total_pages.div_ceil(WORD_BITS) as usize, 0);
        self.first_candidate_word = self.first_candidate_word.min(word_index(self.total_pages));
        self.total_pages = new_total_pages;
    }

    fn set(&mut self, page_id: PageId, in_use: bool) {
        let word = &mut self.words[word_index(page_id)];
        if in_use {
            *word |= bit(page_id);
            self.used += 1;
        } else {
            *word &= !bit(page_id);
            self.used -= 1;
        }
    }
}

const fn word_index(page_id: PageId) -> usize {
    (page_id / WORD_BITS) as usize
}

const fn bit(page_id: PageId) -> u64 {
    1 << (page_id % WORD_BITS)
}
