//! Per-row run-length coding of 8-bpp slices.
//!
//! Each row is encoded independently as `(value, run_length)` byte pairs;
//! a new run starts whenever the pixel value changes, runs are capped at
//! 255, and the stream ends with the pair `(0xFF, 0xFF)`. Rows never merge
//! runs across the row boundary, which bounds per-slice decode latency and
//! lets rows be verified independently.
//!
//! The terminator is reserved: a run of the pixel value `0xFF` is capped at
//! 254 so `(0xFF, 0xFF)` can never occur as data. With that reservation the
//! codec round-trips every input, and the encoded length is at most
//! `2 * len + 2` (reached only by strictly alternating input).

use crate::error::FramecastError;

/// End-of-stream marker pair.
pub const TERMINATOR: [u8; 2] = [0xFF, 0xFF];

/// Longest run representable for any value other than `0xFF`.
const MAX_RUN: usize = 255;
/// Longest run of `0xFF`, kept one short of the terminator pair.
const MAX_RUN_FF: usize = 254;

/// Bytes consumed from and produced into the buffers of a [`decode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStats {
    /// Encoded bytes consumed, terminator included.
    pub enc_bytes: usize,
    /// Pixel bytes written to the output.
    pub out_bytes: usize,
}

/// Encode `src` (rows of `row_len` bytes) into `dst`.
///
/// Returns the encoded length. Fails with `SliceTooLarge` if `dst` cannot
/// hold the result; sizing `dst` to `2 * src.len() + 2` always succeeds.
pub fn encode(src: &[u8], row_len: usize, dst: &mut [u8]) -> Result<usize, FramecastError> {
    debug_assert!(row_len > 0);
    let mut w = 0usize;

    let mut emit = |value: u8, run: usize, w: &mut usize| -> Result<(), FramecastError> {
        if *w + 2 > dst.len() {
            return Err(FramecastError::SliceTooLarge {
                size: *w + 2,
                max: dst.len(),
            });
        }
        dst[*w] = value;
        dst[*w + 1] = run as u8;
        *w += 2;
        Ok(())
    };

    for row in src.chunks(row_len) {
        let mut value = row[0];
        let mut run = 0usize;
        for &px in row {
            let cap = if value == 0xFF { MAX_RUN_FF } else { MAX_RUN };
            if px == value && run < cap {
                run += 1;
            } else {
                emit(value, run, &mut w)?;
                value = px;
                run = 1;
            }
        }
        emit(value, run, &mut w)?;
    }

    if w + 2 > dst.len() {
        return Err(FramecastError::SliceTooLarge {
            size: w + 2,
            max: dst.len(),
        });
    }
    dst[w..w + 2].copy_from_slice(&TERMINATOR);
    Ok(w + 2)
}

/// Expand `(value, run)` pairs from `src` into `dst`.
///
/// Stops at the terminator pair or when `dst` is full; a run that would
/// overflow `dst` is truncated without touching bytes past the end.
pub fn decode(src: &[u8], dst: &mut [u8]) -> DecodeStats {
    let mut r = 0usize;
    let mut w = 0usize;

    while r + 2 <= src.len() {
        let value = src[r];
        let run = src[r + 1];
        r += 2;
        if [value, run] == TERMINATOR {
            break;
        }

        let run = (run as usize).min(dst.len() - w);
        dst[w..w + run].fill(value);
        w += run;
        if w == dst.len() {
            break;
        }
    }

    DecodeStats {
        enc_bytes: r,
        out_bytes: w,
    }
}
