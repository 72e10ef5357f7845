use crate::types::{CsrError, Result};

/// Allocates a fixed-length buffer of `len` freshly initialized cells.
///
/// Reports [`CsrError::AllocationFailure`] instead of aborting when the
/// allocator refuses the request or `len` exceeds `limit`.
pub(crate) fn zeroed_slots<T>(
    len: usize,
    what: &'static str,
    limit: Option<usize>,
    mut init: impl FnMut() -> T,
) -> Result<Box<[T]>> {
    if limit.is_some_and(|max| len > max) {
        return Err(CsrError::AllocationFailure { what, len });
    }
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(len)
        .map_err(|_| CsrError::AllocationFailure { what, len })?;
    slots.resize_with(len, &mut init);
    Ok(slots.into_boxed_slice())
}

/// Converts a caller-supplied count into a buffer length.
pub(crate) fn checked_len(count: i64, what: &'static str) -> Result<usize> {
    usize::try_from(count)
        .map_err(|_| CsrError::invalid(format!("{what} must be non-negative, got {count}")))
}
