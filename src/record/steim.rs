//! Sample payload decoding.
//!
//! Steim compressed data is a series of 64 byte frames, each a nibble word followed by
//! 15 data words. The 2 bit nibbles describe how differences are packed in the matching
//! data word. The first frame's words 1 and 2 are the forward and reverse integration
//! constants, i.e., the first and last sample of the record.
use tracing::debug;

use super::RecordError;

pub const INT16: u8 = 1;
pub const INT32: u8 = 3;
pub const STEIM1: u8 = 10;
pub const STEIM2: u8 = 11;

const FRAME_LEN: usize = 64;
const WORDS_PER_FRAME: usize = 16;

/// Decode `count` samples from `data`.
///
/// # Errors
/// [RecordError::UnsupportedEncoding] for encodings other than INT16, INT32, Steim1 and
/// Steim2, or [RecordError::Decompression] if `data` does not hold `count` samples.
pub fn decode(
    encoding: u8,
    data: &[u8],
    count: usize,
    big_endian: bool,
) -> Result<Vec<i32>, RecordError> {
    match encoding {
        INT16 => decode_fixed::<2>(data, count, |b| {
            i32::from(if big_endian {
                i16::from_be_bytes(b)
            } else {
                i16::from_le_bytes(b)
            })
        }),
        INT32 => decode_fixed::<4>(data, count, |b| {
            if big_endian {
                i32::from_be_bytes(b)
            } else {
                i32::from_le_bytes(b)
            }
        }),
        STEIM1 => decode_steim(data, count, big_endian, false),
        STEIM2 => decode_steim(data, count, big_endian, true),
        _ => Err(RecordError::UnsupportedEncoding(encoding)),
    }
}

fn decode_fixed<const N: usize>(
    data: &[u8],
    count: usize,
    convert: impl Fn([u8; N]) -> i32,
) -> Result<Vec<i32>, RecordError> {
    if data.len() < count * N {
        return Err(RecordError::Decompression(format!(
            "expected {count} samples, data holds {}",
            data.len() / N
        )));
    }
    Ok(data
        .chunks_exact(N)
        .take(count)
        .map(|chunk| {
            let mut word = [0u8; N];
            word.copy_from_slice(chunk);
            convert(word)
        })
        .collect())
}

fn word(frame: &[u8], idx: usize, big_endian: bool) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&frame[idx * 4..idx * 4 + 4]);
    if big_endian {
        u32::from_be_bytes(buf)
    } else {
        u32::from_le_bytes(buf)
    }
}

/// Unpack `n` sign extended values of `bits` width from the low end of `word`, most
/// significant first.
fn unpack(word: u32, n: u32, bits: u32, out: &mut Vec<i32>) {
    let mask = if bits == 32 {
        u32::MAX
    } else {
        (1 << bits) - 1
    };
    for j in 0..n {
        let value = (word >> (bits * (n - 1 - j))) & mask;
        out.push(((value << (32 - bits)) as i32) >> (32 - bits));
    }
}

fn unpack_word(nibble: u32, word: u32, steim2: bool, out: &mut Vec<i32>) -> Result<(), RecordError> {
    let dnib = word >> 30;
    match (nibble, steim2) {
        (0, _) => {}
        (1, _) => unpack(word, 4, 8, out),
        (2, false) => unpack(word, 2, 16, out),
        (3, false) => unpack(word, 1, 32, out),
        (2, true) => match dnib {
            1 => unpack(word, 1, 30, out),
            2 => unpack(word, 2, 15, out),
            3 => unpack(word, 3, 10, out),
            _ => return Err(RecordError::Decompression(format!("invalid dnib {dnib} for nibble 2"))),
        },
        (_, true) => match dnib {
            0 => unpack(word, 5, 6, out),
            1 => unpack(word, 6, 5, out),
            2 => unpack(word, 7, 4, out),
            _ => return Err(RecordError::Decompression(format!("invalid dnib {dnib} for nibble 3"))),
        },
        _ => unreachable!("nibbles are 2 bits"),
    }
    Ok(())
}

fn decode_steim(
    data: &[u8],
    count: usize,
    big_endian: bool,
    steim2: bool,
) -> Result<Vec<i32>, RecordError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if data.len() < FRAME_LEN {
        return Err(RecordError::NotEnoughData {
            actual: data.len(),
            minimum: FRAME_LEN,
        });
    }

    let mut diffs: Vec<i32> = Vec::with_capacity(count + 7);
    let mut forward = 0;
    let mut reverse = 0;
    'frames: for (frame_idx, frame) in data.chunks_exact(FRAME_LEN).enumerate() {
        let nibbles = word(frame, 0, big_endian);
        for idx in 1..WORDS_PER_FRAME {
            let value = word(frame, idx, big_endian);
            if frame_idx == 0 && idx == 1 {
                forward = value as i32;
                continue;
            }
            if frame_idx == 0 && idx == 2 {
                reverse = value as i32;
                continue;
            }
            let nibble = (nibbles >> (30 - 2 * idx)) & 0x3;
            unpack_word(nibble, value, steim2, &mut diffs)?;
            if diffs.len() >= count {
                break 'frames;
            }
        }
    }
    if diffs.len() < count {
        return Err(RecordError::Decompression(format!(
            "expected {count} samples, decoded {}",
            diffs.len()
        )));
    }

    // The first difference is relative to the previous record and is not used
    let mut samples = Vec::with_capacity(count);
    let mut last = forward;
    samples.push(last);
    for diff in &diffs[1..count] {
        last = last.wrapping_add(*diff);
        samples.push(last);
    }
    if last != reverse {
        debug!(
            expected = reverse,
            actual = last,
            "reverse integration constant mismatch"
        );
    }
    Ok(samples)
}
