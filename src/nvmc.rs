//! Direct flash controller backend.
//!
//! Drives any blocking [`NorFlash`] implementation, typically the NVMC driver of a HAL. The
//! controller is busy-waited by the driver, so operations have completed when `submit_*` returns.

use embedded_storage::nor_flash::NorFlash;

use crate::{
    address::{bytes_to_words, words_to_bytes, WORD_SIZE},
    completion::Outcome,
    medium::{FlashMedium, MediumConfig, Submission},
};

/// Words moved per driver call
const CHUNK_WORDS: usize = 16;
const CHUNK_BYTES: usize = CHUNK_WORDS * WORD_SIZE as usize;

/// Errors of the NVMC backend
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NvmcError<E> {
    /// Error of the underlying driver
    Flash(E),

    /// The configured window is not page aligned or does not fit in the flash
    Layout,
}

/// A window of `num_pages` pages of a [`NorFlash`], starting at `start_address` in its offset space
pub struct NvmcMedium<F> {
    flash: F,
    config: MediumConfig,
}

impl<F: NorFlash> NvmcMedium<F> {
    pub fn new(flash: F, start_address: u32, num_pages: u16) -> Self {
        let page_size_words = F::ERASE_SIZE as u32 / WORD_SIZE;
        Self {
            flash,
            config: MediumConfig::new(start_address, page_size_words, num_pages),
        }
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn into_inner(self) -> F {
        self.flash
    }
}

impl<F: NorFlash> FlashMedium for NvmcMedium<F> {
    type Error = NvmcError<F::Error>;

    fn config(&self) -> MediumConfig {
        self.config
    }

    fn init(&mut self) -> Result<(), Self::Error> {
        let word = WORD_SIZE as usize;
        let page_aligned = self.config.start_address as usize % F::ERASE_SIZE == 0;
        let fits = self.config.end_address as usize <= self.flash.capacity();
        let word_granular = word % F::WRITE_SIZE == 0 && word % F::READ_SIZE == 0;
        let valid = self.config.is_valid() && self.config.num_pages > 0;
        if !valid || !page_aligned || !fits || !word_granular {
            #[cfg(feature = "defmt")]
            defmt::error!("Invalid NVMC window {:?}", self.config);
            return Err(NvmcError::Layout);
        }
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "NVMC window {=u32:#x}..{=u32:#x}",
            self.config.start_address,
            self.config.end_address
        );
        Ok(())
    }

    fn read_words(&mut self, address: u32, words: &mut [u32]) -> Result<(), Self::Error> {
        let mut buf = [0u8; CHUNK_BYTES];
        let mut cursor = address;
        for chunk in words.chunks_mut(CHUNK_WORDS) {
            let bytes = &mut buf[..chunk.len() * WORD_SIZE as usize];
            self.flash.read(cursor, bytes).map_err(NvmcError::Flash)?;
            bytes_to_words(bytes, chunk);
            cursor += bytes.len() as u32;
        }
        Ok(())
    }

    fn submit_write(&mut self, address: u32, words: &[u32]) -> Result<Submission, Self::Error> {
        let mut buf = [0u8; CHUNK_BYTES];
        let mut cursor = address;
        for chunk in words.chunks(CHUNK_WORDS) {
            let bytes = &mut buf[..chunk.len() * WORD_SIZE as usize];
            words_to_bytes(chunk, bytes);
            if let Err(_e) = self.flash.write(cursor, bytes) {
                #[cfg(feature = "defmt")]
                defmt::error!("NVMC write at {=u32:#x} failed: {:?}", cursor, defmt::Debug2Format(&_e));
                return Ok(Submission::Completed(Outcome::Failure));
            }
            cursor += bytes.len() as u32;
        }
        Ok(Submission::Completed(Outcome::Success))
    }

    fn submit_erase(&mut self, address: u32, page_count: u16) -> Result<Submission, Self::Error> {
        let to = address + page_count as u32 * self.config.page_size();
        let outcome = match self.flash.erase(address, to) {
            Ok(()) => Outcome::Success,
            Err(_e) => {
                #[cfg(feature = "defmt")]
                defmt::error!("NVMC erase at {=u32:#x} failed: {:?}", address, defmt::Debug2Format(&_e));
                Outcome::Failure
            }
        };
        Ok(Submission::Completed(outcome))
    }
}
