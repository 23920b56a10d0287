//! Erase state checks and program buffer assembly.
//!
//! NOR flash can only clear bits. Programming over bytes that are not erased would be accepted by
//! the controller but leave a mix of old and new bits, so every write is checked first.

/// Value of a byte after its page was erased
pub const ERASED_BYTE: u8 = 0xFF;

/// Check that the `length` bytes at `pre_skip` in an aligned buffer are all erased.
///
/// Bytes outside of that range are ignored, they will be reprogrammed with [`ERASED_BYTE`].
pub fn verify_erased(aligned: &[u8], pre_skip: u8, length: u16) -> bool {
    let start = pre_skip as usize;
    aligned[start..start + length as usize]
        .iter()
        .all(|&b| b == ERASED_BYTE)
}

/// Fill an aligned program buffer: `data` at `pre_skip`, [`ERASED_BYTE`] everywhere else.
pub fn assemble(aligned: &mut [u8], pre_skip: usize, data: &[u8]) {
    let end = pre_skip + data.len();
    aligned[..pre_skip].fill(ERASED_BYTE);
    aligned[pre_skip..end].copy_from_slice(data);
    aligned[end..].fill(ERASED_BYTE);
}
