//! Exclusive access around program and erase operations.
//!
//! On chips where a radio stack owns the flash controller timing (e.g. a BLE SoftDevice), flash
//! operations may only run while that stack is up and able to schedule them.

/// Hook acquired before and released after each program or erase operation
pub trait ExclusiveAccess {
    /// Returns `false` if the operation must not be started
    fn acquire(&mut self) -> bool;

    /// Undo whatever [`Self::acquire`] set up
    fn release(&mut self);
}

/// An acquired [`ExclusiveAccess`], released when dropped.
///
/// An async operation can be dropped while it waits for its completion, the guard is released all
/// the same.
pub struct Access<'g, G: ExclusiveAccess> {
    guard: &'g mut G,
}

impl<'g, G: ExclusiveAccess> Access<'g, G> {
    /// `None` if the guard refused, nothing to release then
    pub fn acquire(guard: &'g mut G) -> Option<Self> {
        if !guard.acquire() {
            return None;
        }
        Some(Self { guard })
    }
}

impl<G: ExclusiveAccess> Drop for Access<'_, G> {
    fn drop(&mut self) {
        self.guard.release();
    }
}

/// For mediums without a competing peripheral, always succeeds
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Default, Clone, Copy)]
pub struct Unguarded;

impl ExclusiveAccess for Unguarded {
    fn acquire(&mut self) -> bool {
        true
    }

    fn release(&mut self) {}
}

/// A radio or peripheral stack that has to be running while the flash is busy
pub trait PeerStack {
    type Error: core::fmt::Debug;

    /// Whether the stack was brought up by someone else
    fn is_active(&self) -> bool;

    /// Bring the stack up, including whatever event processing context it needs
    fn activate(&mut self) -> Result<(), Self::Error>;

    /// Tear down what [`Self::activate`] set up
    fn deactivate(&mut self);
}

/// Brings a [`PeerStack`] up for the duration of a single operation if it is not already running.
///
/// A stack activated by someone else is never torn down.
pub struct PeerGuard<P> {
    peer: P,
    owned: bool,
}

impl<P: PeerStack> PeerGuard<P> {
    pub fn new(peer: P) -> Self {
        Self { peer, owned: false }
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    /// Whether the running stack was activated by this guard
    pub fn owns_peer(&self) -> bool {
        self.owned
    }

    pub fn into_inner(self) -> P {
        self.peer
    }
}

impl<P: PeerStack> ExclusiveAccess for PeerGuard<P> {
    fn acquire(&mut self) -> bool {
        if self.peer.is_active() {
            // The stack's own scheduler interleaves the flash operation
            self.owned = false;
            return true;
        }

        match self.peer.activate() {
            Ok(()) => {
                self.owned = true;
                true
            }
            Err(_e) => {
                #[cfg(feature = "defmt")]
                defmt::error!("Peer stack activation failed: {:?}", defmt::Debug2Format(&_e));
                self.owned = false;
                false
            }
        }
    }

    fn release(&mut self) {
        if self.owned {
            self.peer.deactivate();
            self.owned = false;
        }
    }
}
