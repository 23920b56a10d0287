//! Event driven backend for vendor flash APIs.
//!
//! APIs in the style of Nordic's fstorage or the SoftDevice flash calls only queue an operation
//! and report its result later through an event. The application forwards those events to
//! [`dispatch`] from its event handler:
//!
//! ```
//! use nvm_store::completion::CompletionSynchronizer;
//! use nvm_store::fstorage::{dispatch, EventId, FlashEvent};
//!
//! static SYNC: CompletionSynchronizer = CompletionSynchronizer::new();
//!
//! // Registered with the vendor event dispatcher
//! fn on_flash_event(evt: &FlashEvent) {
//!     dispatch(&SYNC, evt);
//! }
//!
//! SYNC.begin_operation();
//! on_flash_event(&FlashEvent { id: EventId::WriteResult, success: true });
//! assert!(SYNC.try_complete().is_some());
//! ```

use crate::{
    completion::{CompletionSynchronizer, Outcome},
    medium::{FlashMedium, MediumConfig, Submission},
};

/// Asynchronous flash API of a vendor SDK.
///
/// Write and erase only queue the operation; its result is delivered as a [`FlashEvent`].
pub trait FstorageApi {
    type Error: core::fmt::Debug;

    fn init(&mut self) -> Result<(), Self::Error>;

    /// Read words at an absolute address. Flash is memory mapped, this completes immediately.
    fn read(&mut self, address: u32, dest: &mut [u32]) -> Result<(), Self::Error>;

    /// Queue programming `src` at an absolute address
    fn write(&mut self, address: u32, src: &[u32]) -> Result<(), Self::Error>;

    /// Queue the erase of `page_count` pages starting at an absolute page address
    fn erase(&mut self, page_address: u32, page_count: u16) -> Result<(), Self::Error>;
}

/// Kind of operation an event reports on
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventId {
    ReadResult,
    WriteResult,
    EraseResult,
}

/// Event delivered by the vendor API once an operation finished
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashEvent {
    pub id: EventId,
    pub success: bool,
}

/// Forward a vendor event to the synchronizer of the store waiting on it.
///
/// Failed operations are signaled too, the waiting caller gets [`Outcome::Failure`].
pub fn dispatch(sync: &CompletionSynchronizer, event: &FlashEvent) {
    match event.id {
        EventId::WriteResult | EventId::EraseResult => {
            #[cfg(feature = "defmt")]
            if !event.success {
                defmt::error!("Flash event {:?} reported a failure", event.id);
            }
            sync.signal_completion(Outcome::from_success(event.success));
        }
        // Reads are done synchronously, nobody waits on those
        EventId::ReadResult => {}
    }
}

/// [`FlashMedium`] over a [`FstorageApi`]
pub struct EventMedium<A> {
    api: A,
    config: MediumConfig,
}

impl<A: FstorageApi> EventMedium<A> {
    pub fn new(api: A, config: MediumConfig) -> Self {
        Self { api, config }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut A {
        &mut self.api
    }

    pub fn into_inner(self) -> A {
        self.api
    }
}

impl<A: FstorageApi> FlashMedium for EventMedium<A> {
    type Error = A::Error;

    fn config(&self) -> MediumConfig {
        self.config
    }

    fn init(&mut self) -> Result<(), Self::Error> {
        let res = self.api.init();
        #[cfg(feature = "defmt")]
        match &res {
            Ok(()) => defmt::debug!("fstorage initialized"),
            Err(e) => defmt::error!("fstorage init failed: {:?}", defmt::Debug2Format(e)),
        }
        res
    }

    fn read_words(&mut self, address: u32, words: &mut [u32]) -> Result<(), Self::Error> {
        self.api.read(address, words)
    }

    fn submit_write(&mut self, address: u32, words: &[u32]) -> Result<Submission, Self::Error> {
        self.api.write(address, words)?;
        Ok(Submission::Pending)
    }

    fn submit_erase(&mut self, address: u32, page_count: u16) -> Result<Submission, Self::Error> {
        self.api.erase(address, page_count)?;
        Ok(Submission::Pending)
    }
}
