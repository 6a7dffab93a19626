//! Low-level I/O primitives shared by the container parser.
//!
//! Each function reads exactly the bytes it promises or returns an error -
//! there is no partial-read ambiguity. The container format is big-endian
//! only (§3), so unlike a multi-platform parser there is no per-call
//! endianness argument to thread through.

use std::io::Read;

use crate::{Error, Result};

/// Read one byte.
#[inline]
pub(crate) fn u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b).map_err(|_| Error::TruncatedInput)?;
    Ok(b[0])
}

/// Read a big-endian `u16`.
#[inline]
pub(crate) fn be_u16<R: Read>(r: &mut R) -> Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b).map_err(|_| Error::TruncatedInput)?;
    Ok(u16::from_be_bytes(b))
}

/// Read a big-endian `u32`.
#[inline]
pub(crate) fn be_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b).map_err(|_| Error::TruncatedInput)?;
    Ok(u32::from_be_bytes(b))
}

/// Read a big-endian `i16`.
#[inline]
pub(crate) fn be_i16<R: Read>(r: &mut R) -> Result<i16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b).map_err(|_| Error::TruncatedInput)?;
    Ok(i16::from_be_bytes(b))
}

/// Read exactly `N` bytes into a fixed-size array.
#[inline]
pub(crate) fn bytesa<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut b = [0u8; N];
    r.read_exact(&mut b).map_err(|_| Error::TruncatedInput)?;
    Ok(b)
}

/// Read exactly `len` bytes into a `Vec`.
#[inline]
pub(crate) fn bytesv<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut b = vec![0u8; len];
    r.read_exact(&mut b).map_err(|_| Error::TruncatedInput)?;
    Ok(b)
}
