use serde::Serialize;

use super::{BTime, Words};

pub const RECORD_INFO: u16 = 1000;
pub const TIMING_QUALITY: u16 = 1001;
pub const CALIBRATION: u16 = 320;

/// Data only SEED blockette 1000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordInfo {
    pub encoding: u8,
    /// Word order of the data payload.
    pub big_endian: bool,
    /// Record length as a power of 2.
    pub exponent: u8,
}

impl RecordInfo {
    pub const MIN_EXPONENT: u8 = 8;
    pub const MAX_EXPONENT: u8 = 14;

    /// Total record length in bytes, if the exponent is within the supported range.
    #[must_use]
    pub fn record_length(&self) -> Option<usize> {
        (Self::MIN_EXPONENT..=Self::MAX_EXPONENT)
            .contains(&self.exponent)
            .then(|| 1 << self.exponent)
    }
}

/// Data extension blockette 1001.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimingQuality {
    /// Vendor specific clock quality, 0 to 100%.
    pub quality: u8,
    pub usecs: i8,
    pub frame_count: u8,
}

/// Pseudo-random calibration blockette 320.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationMarker {
    pub start: BTime,
    pub flags: u8,
    /// Duration in ten-thousandths of a second.
    pub duration: u32,
    /// Peak-to-peak amplitude of the steps.
    pub peak_amplitude: f32,
    /// Channel containing the calibration input, empty if none.
    pub input_channel: String,
    pub reference_amplitude: u32,
    pub coupling: String,
    pub rolloff: String,
    pub noise: String,
}

impl CalibrationMarker {
    pub const LEN: usize = 64;

    /// Calibration start in epoch microseconds.
    #[must_use]
    pub fn start_time(&self) -> Option<i64> {
        self.start.to_micros()
    }

    #[must_use]
    pub fn duration_micros(&self) -> i64 {
        i64::from(self.duration) * 100
    }

    #[must_use]
    pub fn is_automatic(&self) -> bool {
        self.flags & 0x04 != 0
    }

    #[must_use]
    pub fn is_continued(&self) -> bool {
        self.flags & 0x08 != 0
    }

    #[must_use]
    pub fn has_random_amplitudes(&self) -> bool {
        self.flags & 0x10 != 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Blockette {
    RecordInfo(RecordInfo),
    TimingQuality(TimingQuality),
    Calibration(CalibrationMarker),
    Unknown { kind: u16 },
}

fn ascii(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).trim().to_string()
}

impl Blockette {
    /// Decode the blockette at the start of `words`. Returns `None` if there are not
    /// enough bytes for the blockette's type.
    pub(crate) fn decode(words: &Words) -> Option<Self> {
        let kind = words.u16(0)?;
        let blockette = match kind {
            RECORD_INFO => Blockette::RecordInfo(RecordInfo {
                encoding: words.u8(4)?,
                big_endian: words.u8(5)? != 0,
                exponent: words.u8(6)?,
            }),
            TIMING_QUALITY => Blockette::TimingQuality(TimingQuality {
                quality: words.u8(4)?,
                usecs: words.u8(5)? as i8,
                frame_count: words.u8(7)?,
            }),
            CALIBRATION => {
                let buf = words.bytes(0, CalibrationMarker::LEN)?;
                Blockette::Calibration(CalibrationMarker {
                    start: BTime::decode(words, 4)?,
                    flags: buf[15],
                    duration: words.u32(16)?,
                    peak_amplitude: f32::from_bits(words.u32(20)?),
                    input_channel: ascii(&buf[24..27]),
                    reference_amplitude: words.u32(28)?,
                    coupling: ascii(&buf[32..44]),
                    rolloff: ascii(&buf[44..56]),
                    noise: ascii(&buf[56..64]),
                })
            }
            kind => Blockette::Unknown { kind },
        };
        Some(blockette)
    }

    #[must_use]
    pub fn kind(&self) -> u16 {
        match self {
            Blockette::RecordInfo(_) => RECORD_INFO,
            Blockette::TimingQuality(_) => TIMING_QUALITY,
            Blockette::Calibration(_) => CALIBRATION,
            Blockette::Unknown { kind } => *kind,
        }
    }
}
