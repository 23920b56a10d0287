/// All possible errors emitted by the store
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<MediumError> {
    /// Error reported by the flash medium while reading or accepting an operation
    Medium(MediumError),

    /// Empty or oversized buffer, or a zero page count
    InvalidArgument,

    /// The destination still holds programmed bits, erase it first
    NotErased,

    /// Address or page range outside of the medium
    OutOfBounds,

    /// The exclusive access guard could not be acquired
    ResourceUnavailable,

    /// The medium signaled that a program or erase operation failed
    HardwareFault,

    /// The completion was not signaled within the configured limit
    Timeout,

    /// A timed out operation is still in flight on the medium
    Busy,
}

mod es {
    use super::Error;
    use core::fmt::Debug;
    use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

    impl<E> From<NorFlashErrorKind> for Error<E> {
        fn from(e: NorFlashErrorKind) -> Self {
            match e {
                NorFlashErrorKind::OutOfBounds => Error::OutOfBounds,
                _ => Error::InvalidArgument,
            }
        }
    }

    impl<E> NorFlashError for Error<E>
    where
        E: Debug,
    {
        fn kind(&self) -> NorFlashErrorKind {
            match self {
                Error::OutOfBounds => NorFlashErrorKind::OutOfBounds,
                _ => NorFlashErrorKind::Other,
            }
        }
    }

}
