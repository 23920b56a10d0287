#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use embedded_hal_async::delay::DelayNs;
use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash,
};
use nvm_store::{
    address::{bytes_to_words, words_to_bytes},
    completion::CompletionSynchronizer,
    fstorage::{dispatch, EventId, FlashEvent, FstorageApi},
    guard::PeerStack,
    medium::MediumConfig,
    nvmc::NvmcMedium,
    ERASED_BYTE,
};

pub const PAGE_SIZE: usize = 0x1000;
pub const FLASH_PAGES: usize = 5;

/// Stores use pages 1 to 3 of the flash, so there is flash on both sides of the window
pub const WINDOW_START: u32 = 0x1000;
pub const WINDOW_PAGES: u16 = 3;
pub const WINDOW: MediumConfig =
    MediumConfig::new(WINDOW_START, (PAGE_SIZE / 4) as u32, WINDOW_PAGES);

/// Byte written right after the window, must never change
pub const GUARD_BYTE: u8 = 0x3C;

/// In memory NOR flash. Programming can only clear bits.
pub struct RamFlash {
    pub mem: Vec<u8>,
    pub writes: usize,
    pub erases: usize,
    pub fail: bool,
}

impl RamFlash {
    pub fn new() -> Self {
        let mut mem = vec![ERASED_BYTE; PAGE_SIZE * FLASH_PAGES];
        mem[WINDOW.end_address as usize] = GUARD_BYTE;
        Self {
            mem,
            writes: 0,
            erases: 0,
            fail: false,
        }
    }
}

impl ErrorType for RamFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for RamFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(self, offset, bytes.len())?;
        let start = offset as usize;
        bytes.copy_from_slice(&self.mem[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.mem.len()
    }
}

impl NorFlash for RamFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = PAGE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(self, from, to)?;
        if self.fail {
            return Err(NorFlashErrorKind::Other);
        }
        self.erases += 1;
        self.mem[from as usize..to as usize].fill(ERASED_BYTE);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(self, offset, bytes.len())?;
        if self.fail {
            return Err(NorFlashErrorKind::Other);
        }
        self.writes += 1;
        program(&mut self.mem[offset as usize..], bytes);
        Ok(())
    }
}

fn program(cells: &mut [u8], bytes: &[u8]) {
    for (cell, byte) in cells.iter_mut().zip(bytes) {
        *cell &= byte;
    }
}

pub fn nvmc() -> NvmcMedium<RamFlash> {
    NvmcMedium::new(RamFlash::new(), WINDOW_START, WINDOW_PAGES)
}

/// How the simulated vendor API reports operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Apply and report success from another thread, shortly after the submission
    Deferred,
    /// Apply and report success before the submission returns
    Immediate,
    /// Report a failure from another thread, nothing is applied
    Fail,
    /// Apply but keep the event until [`EventFlash::deliver_held`]
    Hold,
    /// Do not accept operations
    Refuse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    Refused,
    OutOfBounds,
}

struct Shared {
    mem: Mutex<Vec<u8>>,
    behavior: Mutex<Behavior>,
    held: Mutex<Option<FlashEvent>>,
    submissions: AtomicUsize,
}

/// Event driven flash API, reporting to the flash event handler of the application
#[derive(Clone)]
pub struct EventFlash {
    shared: Arc<Shared>,
    sync: &'static CompletionSynchronizer,
}

impl EventFlash {
    pub fn new(sync: &'static CompletionSynchronizer, behavior: Behavior) -> Self {
        let mut mem = vec![ERASED_BYTE; PAGE_SIZE * FLASH_PAGES];
        mem[WINDOW.end_address as usize] = GUARD_BYTE;
        Self {
            shared: Arc::new(Shared {
                mem: Mutex::new(mem),
                behavior: Mutex::new(behavior),
                held: Mutex::new(None),
                submissions: AtomicUsize::new(0),
            }),
            sync,
        }
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.shared.behavior.lock().unwrap() = behavior;
    }

    /// Deliver the event of a held operation, returns false if there was none
    pub fn deliver_held(&self) -> bool {
        match self.shared.held.lock().unwrap().take() {
            Some(event) => {
                on_flash_event(self.sync, &event);
                true
            }
            None => false,
        }
    }

    pub fn submissions(&self) -> usize {
        self.shared.submissions.load(Ordering::SeqCst)
    }

    /// Raw byte at an absolute address
    pub fn byte(&self, address: u32) -> u8 {
        self.shared.mem.lock().unwrap()[address as usize]
    }

    fn submit<F>(&self, id: EventId, apply: F) -> Result<(), SimError>
    where
        F: FnOnce(&mut [u8]) + Send + 'static,
    {
        let behavior = *self.shared.behavior.lock().unwrap();
        if behavior == Behavior::Refuse {
            return Err(SimError::Refused);
        }
        self.shared.submissions.fetch_add(1, Ordering::SeqCst);

        match behavior {
            Behavior::Immediate => {
                apply(&mut self.shared.mem.lock().unwrap()[..]);
                on_flash_event(self.sync, &FlashEvent { id, success: true });
            }
            Behavior::Hold => {
                apply(&mut self.shared.mem.lock().unwrap()[..]);
                *self.shared.held.lock().unwrap() = Some(FlashEvent { id, success: true });
            }
            Behavior::Deferred | Behavior::Fail => {
                let shared = self.shared.clone();
                let sync = self.sync;
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(1));
                    let success = behavior == Behavior::Deferred;
                    if success {
                        apply(&mut shared.mem.lock().unwrap()[..]);
                    }
                    on_flash_event(sync, &FlashEvent { id, success });
                });
            }
            Behavior::Refuse => unreachable!(),
        }
        Ok(())
    }

    fn check(&self, address: u32, len: usize) -> Result<usize, SimError> {
        let start = address as usize;
        if start + len > PAGE_SIZE * FLASH_PAGES {
            return Err(SimError::OutOfBounds);
        }
        Ok(start)
    }
}

/// The application's flash event handler
fn on_flash_event(sync: &CompletionSynchronizer, event: &FlashEvent) {
    dispatch(sync, event);
}

impl FstorageApi for EventFlash {
    type Error = SimError;

    fn init(&mut self) -> Result<(), SimError> {
        Ok(())
    }

    fn read(&mut self, address: u32, dest: &mut [u32]) -> Result<(), SimError> {
        let start = self.check(address, dest.len() * 4)?;
        let mem = self.shared.mem.lock().unwrap();
        bytes_to_words(&mem[start..start + dest.len() * 4], dest);
        Ok(())
    }

    fn write(&mut self, address: u32, src: &[u32]) -> Result<(), SimError> {
        let start = self.check(address, src.len() * 4)?;
        let mut bytes = vec![0u8; src.len() * 4];
        words_to_bytes(src, &mut bytes);
        self.submit(EventId::WriteResult, move |mem| {
            program(&mut mem[start..], &bytes)
        })
    }

    fn erase(&mut self, page_address: u32, page_count: u16) -> Result<(), SimError> {
        let len = page_count as usize * PAGE_SIZE;
        let start = self.check(page_address, len)?;
        self.submit(EventId::EraseResult, move |mem| {
            mem[start..start + len].fill(ERASED_BYTE)
        })
    }
}

/// Radio stack that counts its bring ups
#[derive(Debug, Default)]
pub struct FakeRadio {
    pub active: bool,
    pub fail: bool,
    pub activations: u32,
    pub deactivations: u32,
}

impl PeerStack for FakeRadio {
    type Error = ();

    fn is_active(&self) -> bool {
        self.active
    }

    fn activate(&mut self) -> Result<(), ()> {
        if self.fail {
            return Err(());
        }
        self.active = true;
        self.activations += 1;
        Ok(())
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.deactivations += 1;
    }
}

/// Delay elapsing after a number of executor polls
pub struct YieldDelay(pub u32);

impl DelayNs for YieldDelay {
    async fn delay_ns(&mut self, _ns: u32) {
        for _ in 0..self.0 {
            embassy_futures::yield_now().await;
        }
    }
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
