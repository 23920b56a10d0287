use crate::{
    address::{bytes_to_words, AlignedRequest, Page, Region},
    check_access, check_erase, check_outcome,
    completion::CompletionSynchronizer,
    erase,
    error::Error,
    guard::{Access, ExclusiveAccess, Unguarded},
    medium::{FlashMedium, MediumConfig, Submission},
    read_region, verify_region, StoreConfig, SCRATCH_BYTES, SCRATCH_WORDS,
};

/// Blocking byte addressable store over a [`FlashMedium`].
///
/// Offsets are relative to the start of the medium. Program and erase operations busy-poll the
/// [`CompletionSynchronizer`] until the medium signals them done, so every call is synchronous end
/// to end. Taking `&mut self` keeps a single operation in flight; wrap the store in a mutex to
/// share it between threads.
pub struct FlashStore<'s, M, G = Unguarded> {
    medium: M,
    sync: &'s CompletionSynchronizer,
    guard: G,
    config: MediumConfig,
    store_config: StoreConfig,
}

impl<'s, M, E> FlashStore<'s, M, Unguarded>
where
    M: FlashMedium<Error = E>,
{
    /// Create a store for a medium that does not need exclusive access
    pub fn new(medium: M, sync: &'s CompletionSynchronizer) -> Self {
        Self::with_guard(medium, sync, Unguarded)
    }
}

impl<'s, M, G, E> FlashStore<'s, M, G>
where
    M: FlashMedium<Error = E>,
    G: ExclusiveAccess,
{
    /// Create a store acquiring `guard` around every program and erase operation
    pub fn with_guard(medium: M, sync: &'s CompletionSynchronizer, guard: G) -> Self {
        let config = medium.config();
        Self {
            medium,
            sync,
            guard,
            config,
            store_config: StoreConfig::new(),
        }
    }

    pub fn with_config(mut self, store_config: StoreConfig) -> Self {
        self.store_config = store_config;
        self
    }

    /// Initialize the medium. Call once, before any other operation.
    pub fn init(&mut self) -> Result<(), Error<E>> {
        self.medium.init().map_err(Error::Medium)?;
        if !self.config.is_valid() {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    /// Absolute start and end address of the medium
    pub fn bounds(&self) -> (u32, u32) {
        (self.config.start_address, self.config.end_address)
    }

    /// Size of the medium in bytes
    pub fn capacity(&self) -> usize {
        self.config.span() as usize
    }

    pub fn page_count(&self) -> u16 {
        self.config.num_pages
    }

    pub fn page_size(&self) -> u32 {
        self.config.page_size()
    }

    /// Location of a page, relative to the start of the medium
    pub fn page(&self, page: Page) -> Option<Region> {
        self.config.page(page)
    }

    pub fn config(&self) -> MediumConfig {
        self.config
    }

    /// Give back the medium and the guard
    pub fn release(self) -> (M, G) {
        (self.medium, self.guard)
    }

    /// Read `buff.len()` bytes at `offset`
    pub fn read(&mut self, offset: u32, buff: &mut [u8]) -> Result<(), Error<E>> {
        let length = check_access(&self.config, offset, buff.len())?;
        read_region(&mut self.medium, &self.config, offset, length, buff)?;

        #[cfg(feature = "defmt")]
        defmt::trace!("Read from {=u32:#x}, {=usize}: {:?}", offset, buff.len(), buff);
        Ok(())
    }

    /// Write `data` at `offset`. Every byte of the destination must be erased, otherwise
    /// [`Error::NotErased`] is returned and the medium is left untouched.
    pub fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), Error<E>> {
        let length = check_access(&self.config, offset, data.len())?;
        self.settle()?;
        let req = AlignedRequest::expand(offset, length);

        verify_region(&mut self.medium, &self.config, &req)?;

        let (mut op, _access) = self.begin()?;
        let res = op.program(&req, data);

        #[cfg(feature = "defmt")]
        defmt::debug!("Write to {=u32:#x} len {=usize}, ok: {=bool}", offset, data.len(), res.is_ok());
        res
    }

    /// Erase a single page
    pub fn erase_page(&mut self, page: u8) -> Result<(), Error<E>> {
        self.erase_pages(page, 1)
    }

    /// Erase `count` pages starting at `page`
    pub fn erase_pages(&mut self, page: u8, count: u8) -> Result<(), Error<E>> {
        let address = check_erase(&self.config, page, count)?;
        self.settle()?;

        let (mut op, _access) = self.begin()?;
        let res = op.erase(address, count as u16);

        #[cfg(feature = "defmt")]
        defmt::debug!("Erase {=u8} page(s) at {=u32:#x}, ok: {=bool}", count, address, res.is_ok());
        res
    }

    /// Acquire the guard for a program or erase operation, released when the access is dropped
    fn begin(&mut self) -> Result<(Operation<'_, 's, M>, Access<'_, G>), Error<E>> {
        let access = Access::acquire(&mut self.guard).ok_or(Error::ResourceUnavailable)?;
        let op = Operation {
            medium: &mut self.medium,
            sync: self.sync,
            start_address: self.config.start_address,
            poll_limit: self.store_config.completion_poll_limit,
        };
        Ok((op, access))
    }

    /// Consume the completion of an operation that timed out earlier
    fn settle(&mut self) -> Result<(), Error<E>> {
        if !self.sync.is_pending() {
            return Ok(());
        }
        match self.sync.try_complete() {
            Some(_stale) => {
                #[cfg(feature = "defmt")]
                defmt::info!("Late flash completion: {:?}", _stale);
                Ok(())
            }
            None => Err(Error::Busy),
        }
    }
}

/// The medium and synchronizer, borrowed for one program or erase operation
struct Operation<'a, 's, M> {
    medium: &'a mut M,
    sync: &'s CompletionSynchronizer,
    start_address: u32,
    poll_limit: Option<u32>,
}

impl<M, E> Operation<'_, '_, M>
where
    M: FlashMedium<Error = E>,
{
    fn program(&mut self, req: &AlignedRequest, data: &[u8]) -> Result<(), Error<E>> {
        let mut words = [0u32; SCRATCH_WORDS];
        let mut bytes = [0u8; SCRATCH_BYTES];
        for chunk in req.chunks(SCRATCH_WORDS) {
            let words = &mut words[..chunk.word_count];
            let bytes = &mut bytes[..chunk.byte_len()];
            erase::assemble(bytes, chunk.span.start, &data[chunk.data.clone()]);
            bytes_to_words(bytes, words);

            self.sync.begin_operation();
            let submission = self
                .medium
                .submit_write(self.start_address + chunk.word_address, words);
            self.complete(submission)?;
        }
        Ok(())
    }

    fn erase(&mut self, address: u32, page_count: u16) -> Result<(), Error<E>> {
        self.sync.begin_operation();
        let submission = self.medium.submit_erase(address, page_count);
        self.complete(submission)
    }

    /// Wait for a submitted operation
    fn complete(&mut self, submission: Result<Submission, E>) -> Result<(), Error<E>> {
        match submission {
            Ok(Submission::Completed(outcome)) => self.sync.signal_completion(outcome),
            Ok(Submission::Pending) => {}
            Err(e) => {
                self.sync.rejected();
                return Err(Error::Medium(e));
            }
        }

        let outcome = match self.poll_limit {
            None => self.sync.await_completion(),
            Some(limit) => match self.sync.await_completion_bounded(limit) {
                Some(outcome) => outcome,
                None => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Flash operation timed out after {=u32} polls", limit);
                    return Err(Error::Timeout);
                }
            },
        };
        check_outcome(outcome)
    }
}

/// Implementation of the `ReadNorFlash` trait of the `embedded_storage` crate. Offsets are
/// relative to the start of the medium.
mod es {
    use super::*;
    use core::fmt::Debug;
    use embedded_storage::nor_flash::{check_read, ErrorType, ReadNorFlash};

    impl<'s, M, G, E> ErrorType for FlashStore<'s, M, G>
    where
        M: FlashMedium<Error = E>,
        E: Debug,
    {
        type Error = Error<E>;
    }

    impl<'s, M, G, E> ReadNorFlash for FlashStore<'s, M, G>
    where
        M: FlashMedium<Error = E>,
        G: ExclusiveAccess,
        E: Debug,
    {
        const READ_SIZE: usize = 1;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            check_read(self, offset, bytes.len())?;
            let mut cursor = offset;
            for chunk in bytes.chunks_mut(u16::MAX as usize) {
                FlashStore::read(self, cursor, chunk)?;
                cursor += chunk.len() as u32;
            }
            Ok(())
        }

        fn capacity(&self) -> usize {
            self.config.span() as usize
        }
    }
}
