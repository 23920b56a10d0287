use crate::{
    address::{bytes_to_words, AlignedRequest, Page, Region},
    check_access, check_erase, check_outcome, check_read,
    completion::CompletionSynchronizer,
    erase,
    error::Error,
    guard::{Access, ExclusiveAccess, Unguarded},
    medium::{FlashMedium, MediumConfig, Submission},
    read_region, verify_region, SCRATCH_BYTES, SCRATCH_WORDS,
};
use embassy_futures::select::{select, Either};
use embedded_hal_async::delay::DelayNs;

/// A delay that never elapses, completions are awaited without timeout
#[derive(Debug, Default, Clone, Copy)]
pub struct Unbounded;

impl DelayNs for Unbounded {
    async fn delay_ns(&mut self, _ns: u32) {
        core::future::pending::<()>().await
    }
}

/// Async byte addressable store over a [`FlashMedium`].
///
/// Same operations as [`crate::blocking::FlashStore`], but completions are awaited instead of
/// polled. Reads, erase checks and submissions still run to completion on the caller's task.
pub struct AsyncFlashStore<'s, M, G = Unguarded, D = Unbounded> {
    medium: M,
    sync: &'s CompletionSynchronizer,
    guard: G,
    config: MediumConfig,
    delay: D,
    timeout_us: u32,
}

impl<'s, M, E> AsyncFlashStore<'s, M, Unguarded, Unbounded>
where
    M: FlashMedium<Error = E>,
{
    pub fn new(medium: M, sync: &'s CompletionSynchronizer) -> Self {
        Self::with_guard(medium, sync, Unguarded)
    }
}

impl<'s, M, G, E> AsyncFlashStore<'s, M, G, Unbounded>
where
    M: FlashMedium<Error = E>,
    G: ExclusiveAccess,
{
    pub fn with_guard(medium: M, sync: &'s CompletionSynchronizer, guard: G) -> Self {
        let config = medium.config();
        Self {
            medium,
            sync,
            guard,
            config,
            delay: Unbounded,
            timeout_us: 0,
        }
    }
}

impl<'s, M, G, D, E> AsyncFlashStore<'s, M, G, D>
where
    M: FlashMedium<Error = E>,
    G: ExclusiveAccess,
    D: DelayNs,
{
    /// Fail operations whose completion takes longer than `timeout_us` with [`Error::Timeout`].
    ///
    /// A timed out operation is still owned by the medium, the store returns [`Error::Busy`] until
    /// its completion arrives.
    pub fn with_timeout<D2: DelayNs>(self, delay: D2, timeout_us: u32) -> AsyncFlashStore<'s, M, G, D2> {
        AsyncFlashStore {
            medium: self.medium,
            sync: self.sync,
            guard: self.guard,
            config: self.config,
            delay,
            timeout_us,
        }
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

    pub fn capacity(&self) -> usize {
        self.config.span() as usize
    }

    pub fn page_count(&self) -> u16 {
        self.config.num_pages
    }

    pub fn page_size(&self) -> u32 {
        self.config.page_size()
    }

    pub fn page(&self, page: Page) -> Option<Region> {
        self.config.page(page)
    }

    pub fn config(&self) -> MediumConfig {
        self.config
    }

    pub fn release(self) -> (M, G) {
        (self.medium, self.guard)
    }

    /// Read `buff.len()` bytes at `offset`
    pub async fn read(&mut self, offset: u32, buff: &mut [u8]) -> Result<(), Error<E>> {
        let length = check_access(&self.config, offset, buff.len())?;
        read_region(&mut self.medium, &self.config, offset, length, buff)
    }

    /// Write `data` at `offset`, the destination must be erased
    pub async fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), Error<E>> {
        let length = check_access(&self.config, offset, data.len())?;
        self.settle()?;
        let req = AlignedRequest::expand(offset, length);

        verify_region(&mut self.medium, &self.config, &req)?;

        let (mut op, _access) = self.begin()?;
        let res = op.program(&req, data).await;

        #[cfg(feature = "defmt")]
        defmt::debug!("Write to {=u32:#x} len {=usize}, ok: {=bool}", offset, data.len(), res.is_ok());
        res
    }

    pub async fn erase_page(&mut self, page: u8) -> Result<(), Error<E>> {
        self.erase_pages(page, 1).await
    }

    /// Erase `count` pages starting at `page`
    pub async fn erase_pages(&mut self, page: u8, count: u8) -> Result<(), Error<E>> {
        let address = check_erase(&self.config, page, count)?;
        self.settle()?;

        let (mut op, _access) = self.begin()?;
        let res = op.erase(address, count as u16).await;

        #[cfg(feature = "defmt")]
        defmt::debug!("Erase {=u8} page(s) at {=u32:#x}, ok: {=bool}", count, address, res.is_ok());
        res
    }

    /// Acquire the guard for a program or erase operation. The access is held by the operation's
    /// future, dropping the future releases it.
    fn begin(&mut self) -> Result<(Operation<'_, 's, M, D>, Access<'_, G>), Error<E>> {
        let access = Access::acquire(&mut self.guard).ok_or(Error::ResourceUnavailable)?;
        let op = Operation {
            medium: &mut self.medium,
            sync: self.sync,
            start_address: self.config.start_address,
            delay: &mut self.delay,
            timeout_us: self.timeout_us,
        };
        Ok((op, access))
    }

    fn settle(&mut self) -> Result<(), Error<E>> {
        if !self.sync.is_pending() {
            return Ok(());
        }
        match self.sync.try_complete() {
            Some(_stale) => Ok(()),
            None => Err(Error::Busy),
        }
    }
}

struct Operation<'a, 's, M, D> {
    medium: &'a mut M,
    sync: &'s CompletionSynchronizer,
    start_address: u32,
    delay: &'a mut D,
    timeout_us: u32,
}

impl<M, D, E> Operation<'_, '_, M, D>
where
    M: FlashMedium<Error = E>,
    D: DelayNs,
{
    async fn program(&mut self, req: &AlignedRequest, data: &[u8]) -> Result<(), Error<E>> {
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
            self.complete(submission).await?;
        }
        Ok(())
    }

    async fn erase(&mut self, address: u32, page_count: u16) -> Result<(), Error<E>> {
        self.sync.begin_operation();
        let submission = self.medium.submit_erase(address, page_count);
        self.complete(submission).await
    }

    async fn complete(&mut self, submission: Result<Submission, E>) -> Result<(), Error<E>> {
        let sync = self.sync;
        match submission {
            Ok(Submission::Completed(outcome)) => sync.signal_completion(outcome),
            Ok(Submission::Pending) => {}
            Err(e) => {
                sync.rejected();
                return Err(Error::Medium(e));
            }
        }

        match select(sync.completion(), self.delay.delay_us(self.timeout_us)).await {
            Either::First(outcome) => check_outcome(outcome),
            Either::Second(()) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Flash operation timed out after {=u32}us", self.timeout_us);
                Err(Error::Timeout)
            }
        }
    }
}

impl<'s, M, G, D> embedded_storage_async::nor_flash::ErrorType for AsyncFlashStore<'s, M, G, D>
where
    M: FlashMedium,
{
    type Error = Error<M::Error>;
}

impl<'s, M, G, D> embedded_storage_async::nor_flash::ReadNorFlash for AsyncFlashStore<'s, M, G, D>
where
    M: FlashMedium,
    G: ExclusiveAccess,
    D: DelayNs,
{
    const READ_SIZE: usize = 1;

    async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(self.capacity(), offset, bytes.len())?;
        let mut cursor = offset;
        for chunk in bytes.chunks_mut(u16::MAX as usize) {
            AsyncFlashStore::read(self, cursor, chunk).await?;
            cursor += chunk.len() as u32;
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.config.span() as usize
    }
}
