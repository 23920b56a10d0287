#![cfg_attr(not(test), no_std)]
//! Byte addressable storage on top of word-aligned, page-erasable NOR flash such as the internal
//! flash of the nRF52 series.
//!
//! The flash can only be programmed by whole 32 bit words and a bit can only go from 1 to 0 until
//! its page is erased. The stores in this crate accept reads and writes of any length at any
//! offset and take care of:
//! * widening requests to whole words, see [`address`]
//! * refusing writes over bytes that are not erased, see [`erase`]
//! * waiting for program and erase operations that complete from an interrupt or event handler,
//!   see [`completion`]
//! * bringing up a competing radio stack around flash operations if needed, see [`guard`]
//!
//! Two kinds of flash access are supported through the [`medium::FlashMedium`] trait:
//! * [`nvmc::NvmcMedium`] drives the flash controller directly through a blocking
//!   [`embedded_storage::nor_flash::NorFlash`] driver.
//! * [`fstorage::EventMedium`] queues operations on an event driven vendor API, e.g. when a
//!   SoftDevice owns the flash controller.
//!
//! Both can be used with the [`blocking::FlashStore`] or the [`asynchronous::AsyncFlashStore`].

pub mod address;
pub mod asynchronous;
pub mod blocking;
pub mod completion;
pub mod erase;
pub mod error;
pub mod fstorage;
pub mod guard;
pub mod medium;
pub mod nvmc;

use crate::{
    address::{project, words_to_bytes, AlignedRequest, Region},
    completion::Outcome,
    error::Error,
    medium::{FlashMedium, MediumConfig},
};

pub use crate::erase::ERASED_BYTE;

/// Words handled per program operation and per read of the medium
pub(crate) const SCRATCH_WORDS: usize = 64;
pub(crate) const SCRATCH_BYTES: usize = SCRATCH_WORDS * address::WORD_SIZE as usize;

/// Run time options of a store
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreConfig {
    /// Give up waiting for a completion after this many polls. `None` waits forever.
    ///
    /// A timed out operation is still owned by the medium, the store returns [`Error::Busy`] until
    /// its completion arrives.
    pub completion_poll_limit: Option<u32>,
}

impl StoreConfig {
    pub const fn new() -> Self {
        Self {
            completion_poll_limit: None,
        }
    }

    pub const fn completion_poll_limit(mut self, polls: u32) -> Self {
        self.completion_poll_limit = Some(polls);
        self
    }
}

/// Validate a byte access, returns its length
pub(crate) fn check_access<E>(
    config: &MediumConfig,
    offset: u32,
    length: usize,
) -> Result<u16, Error<E>> {
    if length == 0 || length > u16::MAX as usize {
        return Err(Error::InvalidArgument);
    }
    if !Region::new(offset, length as u32).fits(config.span()) {
        return Err(Error::OutOfBounds);
    }
    Ok(length as u16)
}

/// Validate a page erase, returns the absolute address of the first page
pub(crate) fn check_erase<E>(config: &MediumConfig, page: u8, count: u8) -> Result<u32, Error<E>> {
    if count == 0 {
        return Err(Error::InvalidArgument);
    }
    let end = (page as u32 + count as u32).checked_mul(config.page_size());
    match end {
        Some(end) if end <= config.span() => {
            Ok(config.start_address + page as u32 * config.page_size())
        }
        _ => Err(Error::OutOfBounds),
    }
}

/// Bounds check of a `ReadNorFlash` read, which may be longer than a single store access
pub(crate) fn check_read<E>(capacity: usize, offset: u32, length: usize) -> Result<(), Error<E>> {
    if length > capacity || offset as usize > capacity - length {
        return Err(Error::OutOfBounds);
    }
    Ok(())
}

pub(crate) fn check_outcome<E>(outcome: Outcome) -> Result<(), Error<E>> {
    match outcome {
        Outcome::Success => Ok(()),
        Outcome::Failure => Err(Error::HardwareFault),
    }
}

/// Read `length` bytes at `offset` into `buff`
pub(crate) fn read_region<M: FlashMedium>(
    medium: &mut M,
    config: &MediumConfig,
    offset: u32,
    length: u16,
    buff: &mut [u8],
) -> Result<(), Error<M::Error>> {
    let req = AlignedRequest::expand(offset, length);
    let mut words = [0u32; SCRATCH_WORDS];
    let mut bytes = [0u8; SCRATCH_BYTES];
    for chunk in req.chunks(SCRATCH_WORDS) {
        let words = &mut words[..chunk.word_count];
        let bytes = &mut bytes[..chunk.byte_len()];
        medium
            .read_words(config.start_address + chunk.word_address, words)
            .map_err(Error::Medium)?;
        words_to_bytes(words, bytes);
        buff[chunk.data.clone()].copy_from_slice(project(bytes, chunk.pre_skip(), chunk.length()));
    }
    Ok(())
}

/// Check that the whole destination of a write is erased, before anything is programmed
pub(crate) fn verify_region<M: FlashMedium>(
    medium: &mut M,
    config: &MediumConfig,
    req: &AlignedRequest,
) -> Result<(), Error<M::Error>> {
    let mut words = [0u32; SCRATCH_WORDS];
    let mut bytes = [0u8; SCRATCH_BYTES];
    for chunk in req.chunks(SCRATCH_WORDS) {
        let words = &mut words[..chunk.word_count];
        let bytes = &mut bytes[..chunk.byte_len()];
        let address = config.start_address + chunk.word_address;
        medium.read_words(address, words).map_err(Error::Medium)?;
        words_to_bytes(words, bytes);
        if !erase::verify_erased(bytes, chunk.pre_skip(), chunk.length()) {
            #[cfg(feature = "defmt")]
            defmt::warn!("Flash not empty at {=u32:#x}", address);
            return Err(Error::NotErased);
        }
    }
    Ok(())
}
