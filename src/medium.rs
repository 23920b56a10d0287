//! The physical flash, as seen by the stores.

use crate::{
    address::{Page, Region, WORD_SIZE},
    completion::Outcome,
};

/// Geometry of the flash area managed by a store. Fixed for the lifetime of the medium.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediumConfig {
    /// Absolute address of the first byte
    pub start_address: u32,
    /// Absolute address one past the last byte
    pub end_address: u32,
    pub page_size_words: u32,
    pub num_pages: u16,
}

impl MediumConfig {
    /// Geometry of `num_pages` pages at `start_address`.
    ///
    /// A window that does not fit the 32 bit address space is clamped to its end, see
    /// [`Self::is_valid`].
    pub const fn new(start_address: u32, page_size_words: u32, num_pages: u16) -> Self {
        let size = page_size_words
            .saturating_mul(WORD_SIZE)
            .saturating_mul(num_pages as u32);
        Self {
            start_address,
            end_address: start_address.saturating_add(size),
            page_size_words,
            num_pages,
        }
    }

    /// Whether the pages fit the address space and `end_address` matches them
    pub fn is_valid(&self) -> bool {
        self.page_size_words
            .checked_mul(WORD_SIZE)
            .and_then(|page| page.checked_mul(self.num_pages as u32))
            .and_then(|size| self.start_address.checked_add(size))
            == Some(self.end_address)
    }

    /// Size of the managed area in bytes
    pub const fn span(&self) -> u32 {
        self.end_address - self.start_address
    }

    pub const fn page_size(&self) -> u32 {
        self.page_size_words.saturating_mul(WORD_SIZE)
    }

    /// Location of a page relative to `start_address`, `None` past the last page
    pub fn page(&self, page: Page) -> Option<Region> {
        if page.0 >= self.num_pages {
            return None;
        }
        Some(Region::new(page.0 as u32 * self.page_size(), self.page_size()))
    }
}

/// What happened to a submitted program or erase operation
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The operation already ran to completion
    Completed(Outcome),
    /// The operation was accepted, its outcome will be signaled from the event context
    Pending,
}

/// A word-aligned, page-erasable flash.
///
/// All addresses are absolute and multiples of 4. Only one program or erase operation is submitted
/// at a time and the next one only after the previous completion was signaled.
pub trait FlashMedium {
    type Error: core::fmt::Debug;

    fn config(&self) -> MediumConfig;

    /// One shot initialization, before any other operation
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Read `words.len()` words at `address`. Completes immediately.
    fn read_words(&mut self, address: u32, words: &mut [u32]) -> Result<(), Self::Error>;

    /// Program `words` at `address`. An `Err` means the operation was not accepted.
    fn submit_write(&mut self, address: u32, words: &[u32]) -> Result<Submission, Self::Error>;

    /// Erase `page_count` pages starting at the page at `address`.
    fn submit_erase(&mut self, address: u32, page_count: u16) -> Result<Submission, Self::Error>;
}

impl<M: FlashMedium + ?Sized> FlashMedium for &mut M {
    type Error = M::Error;

    fn config(&self) -> MediumConfig {
        M::config(self)
    }

    fn init(&mut self) -> Result<(), Self::Error> {
        M::init(self)
    }

    fn read_words(&mut self, address: u32, words: &mut [u32]) -> Result<(), Self::Error> {
        M::read_words(self, address, words)
    }

    fn submit_write(&mut self, address: u32, words: &[u32]) -> Result<Submission, Self::Error> {
        M::submit_write(self, address, words)
    }

    fn submit_erase(&mut self, address: u32, page_count: u16) -> Result<Submission, Self::Error> {
        M::submit_erase(self, address, page_count)
    }
}
