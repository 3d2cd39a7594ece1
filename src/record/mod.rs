//! SEED 2.4 data record decoding.
//!
//! A record starts with a 48 byte fixed header followed by a chain of blockettes and the
//! sample payload. Only records carrying a blockette 1000 are supported, which is what
//! makes the record length discoverable from the record itself.
mod blockette;
mod error;
pub mod steim;

use serde::Serialize;

use crate::time::btime_to_micros;

pub use blockette::{
    Blockette, CalibrationMarker, RecordInfo, TimingQuality, CALIBRATION, RECORD_INFO,
    TIMING_QUALITY,
};
pub use error::RecordError;

/// Length of the fixed section of the data header.
pub const FIXED_HEADER_LEN: usize = 48;

/// Accepted data quality indicators.
pub const INDICATORS: [u8; 3] = *b"DMQ";

const MAX_BLOCKETTES: usize = 32;

/// Endian aware reads of a byte slice. Reads past the end return `None`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Words<'a> {
    buf: &'a [u8],
    big_endian: bool,
}

impl<'a> Words<'a> {
    pub(crate) fn new(buf: &'a [u8], big_endian: bool) -> Self {
        Words { buf, big_endian }
    }

    pub(crate) fn at(&self, offset: usize) -> Option<Words<'a>> {
        Some(Words {
            buf: self.buf.get(offset..)?,
            big_endian: self.big_endian,
        })
    }

    pub(crate) fn bytes(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        self.buf.get(offset..offset.checked_add(len)?)
    }

    fn array<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.bytes(offset, N)?);
        if !self.big_endian {
            buf.reverse();
        }
        Some(buf)
    }

    pub(crate) fn u8(&self, offset: usize) -> Option<u8> {
        self.buf.get(offset).copied()
    }

    pub(crate) fn u16(&self, offset: usize) -> Option<u16> {
        self.array(offset).map(u16::from_be_bytes)
    }

    pub(crate) fn i16(&self, offset: usize) -> Option<i16> {
        self.array(offset).map(i16::from_be_bytes)
    }

    pub(crate) fn u32(&self, offset: usize) -> Option<u32> {
        self.array(offset).map(u32::from_be_bytes)
    }

    pub(crate) fn i32(&self, offset: usize) -> Option<i32> {
        self.array(offset).map(i32::from_be_bytes)
    }
}

/// SEED binary time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BTime {
    pub year: u16,
    pub day: u16,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub tenth_millis: u16,
}

impl BTime {
    pub const LEN: usize = 10;

    pub(crate) fn decode(words: &Words, offset: usize) -> Option<Self> {
        Some(BTime {
            year: words.u16(offset)?,
            day: words.u16(offset + 2)?,
            hour: words.u8(offset + 4)?,
            minute: words.u8(offset + 5)?,
            second: words.u8(offset + 6)?,
            tenth_millis: words.u16(offset + 8)?,
        })
    }

    fn is_plausible(&self) -> bool {
        (1900..=2100).contains(&self.year) && (1..=366).contains(&self.day)
    }

    /// Epoch microseconds, or `None` if this is not a valid time.
    #[must_use]
    pub fn to_micros(&self) -> Option<i64> {
        btime_to_micros(
            self.year,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.tenth_millis,
        )
    }
}

fn ascii(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).trim().to_string()
}

/// Fixed section of the data header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordHeader {
    pub sequence_number: String,
    pub indicator: char,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub network: String,
    pub start: BTime,
    pub num_samples: u16,
    pub rate_factor: i16,
    pub rate_multiplier: i16,
    pub activity_flags: u8,
    pub io_flags: u8,
    pub quality_flags: u8,
    pub num_blockettes: u8,
    /// Time correction in ten-thousandths of a second.
    pub time_correction: i32,
    pub data_offset: u16,
    pub first_blockette: u16,
    /// Word order of the header, detected from the start time.
    pub big_endian: bool,
}

impl RecordHeader {
    /// Decode the fixed header at the start of `buf`.
    ///
    /// The header word order is not recorded in the header itself, so it is detected by
    /// checking which order produces a sensible start year and day.
    ///
    /// # Errors
    /// If there are fewer than [FIXED_HEADER_LEN] bytes, the quality indicator is not
    /// one of [INDICATORS], or the start time is not sensible in either word order.
    pub fn decode(buf: &[u8]) -> Result<Self, RecordError> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(RecordError::NotEnoughData {
                actual: buf.len(),
                minimum: FIXED_HEADER_LEN,
            });
        }
        if !INDICATORS.contains(&buf[6]) {
            return Err(RecordError::BadIndicator(buf[6]));
        }

        let big_endian = [true, false]
            .into_iter()
            .find(|be| {
                BTime::decode(&Words::new(buf, *be), 20).is_some_and(|t| t.is_plausible())
            })
            .ok_or(RecordError::BadHeader("start time is not sensible in either word order"))?;
        let words = Words::new(buf, big_endian);
        let short = RecordError::NotEnoughData {
            actual: buf.len(),
            minimum: FIXED_HEADER_LEN,
        };

        Ok(RecordHeader {
            sequence_number: ascii(&buf[0..6]),
            indicator: char::from(buf[6]),
            station: ascii(&buf[8..13]),
            location: ascii(&buf[13..15]),
            channel: ascii(&buf[15..18]),
            network: ascii(&buf[18..20]),
            start: BTime::decode(&words, 20).ok_or(short.clone())?,
            num_samples: words.u16(30).ok_or(short.clone())?,
            rate_factor: words.i16(32).ok_or(short.clone())?,
            rate_multiplier: words.i16(34).ok_or(short.clone())?,
            activity_flags: buf[36],
            io_flags: buf[37],
            quality_flags: buf[38],
            num_blockettes: buf[39],
            time_correction: words.i32(40).ok_or(short.clone())?,
            data_offset: words.u16(44).ok_or(short.clone())?,
            first_blockette: words.u16(46).ok_or(short)?,
            big_endian,
        })
    }

    /// Sample rate in Hz from the rate factor and multiplier. A factor of 0 yields 0.
    #[must_use]
    pub fn sample_rate(&self) -> f64 {
        let factor = f64::from(self.rate_factor);
        let multiplier = if self.rate_multiplier == 0 {
            1.0
        } else {
            f64::from(self.rate_multiplier)
        };
        match (factor > 0.0, multiplier > 0.0) {
            _ if self.rate_factor == 0 => 0.0,
            (true, true) => factor * multiplier,
            (true, false) => -factor / multiplier,
            (false, true) => -multiplier / factor,
            (false, false) => 1.0 / (factor * multiplier),
        }
    }

    /// Decode the blockette chain.
    ///
    /// The chain is followed from the first blockette offset until an offset of 0, an
    /// offset that does not move forward, or the end of `buf`.
    #[must_use]
    pub fn blockettes(&self, buf: &[u8]) -> Vec<Blockette> {
        let words = Words::new(buf, self.big_endian);
        let mut blockettes = Vec::new();
        let mut offset = usize::from(self.first_blockette);
        while offset >= FIXED_HEADER_LEN && blockettes.len() < MAX_BLOCKETTES {
            let Some(blockette) = words.at(offset).and_then(|w| Blockette::decode(&w)) else {
                break;
            };
            blockettes.push(blockette);
            let next = words.u16(offset + 2).map_or(0, usize::from);
            if next <= offset {
                break;
            }
            offset = next;
        }
        blockettes
    }
}

/// Total length of the record whose header is at the start of `buf`, from its
/// blockette 1000. `buf` must hold at least the header and blockette chain.
///
/// # Errors
/// If the header is corrupt, there is no blockette 1000, or the record length is not
/// between 256 and 16384 bytes.
pub fn record_length(buf: &[u8]) -> Result<usize, RecordError> {
    let header = RecordHeader::decode(buf)?;
    let info = header
        .blockettes(buf)
        .into_iter()
        .find_map(|b| match b {
            Blockette::RecordInfo(info) => Some(info),
            _ => None,
        })
        .ok_or(RecordError::NoRecordInfo)?;
    info.record_length()
        .ok_or(RecordError::RecordLength(info.exponent))
}

/// A decoded data record.
#[derive(Debug, Clone)]
pub struct Record {
    header: RecordHeader,
    blockettes: Vec<Blockette>,
    start_time: i64,
    data: Vec<u8>,
}

impl Record {
    /// Decode the header and blockettes of the record in `data`. The sample payload is
    /// decoded on demand with [Record::samples].
    ///
    /// # Errors
    /// If the header is corrupt or the start time is not a valid time.
    pub fn decode(data: Vec<u8>) -> Result<Self, RecordError> {
        let header = RecordHeader::decode(&data)?;
        let start_time = header
            .start
            .to_micros()
            .ok_or(RecordError::BadHeader("invalid start time"))?;
        let blockettes = header.blockettes(&data);
        Ok(Record {
            header,
            blockettes,
            start_time,
            data,
        })
    }

    #[must_use]
    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    #[must_use]
    pub fn blockettes(&self) -> &[Blockette] {
        &self.blockettes
    }

    /// Start time in epoch microseconds.
    #[must_use]
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    #[must_use]
    pub fn sample_rate(&self) -> f64 {
        self.header.sample_rate()
    }

    #[must_use]
    pub fn num_samples(&self) -> usize {
        usize::from(self.header.num_samples)
    }

    /// Records without samples, e.g., log or heartbeat records.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.header.num_samples == 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn record_info(&self) -> Option<&RecordInfo> {
        self.blockettes.iter().find_map(|b| match b {
            Blockette::RecordInfo(info) => Some(info),
            _ => None,
        })
    }

    /// Timing quality from blockette 1001, if present.
    #[must_use]
    pub fn timing_quality(&self) -> Option<u8> {
        self.blockettes.iter().find_map(|b| match b {
            Blockette::TimingQuality(tq) => Some(tq.quality),
            _ => None,
        })
    }

    pub fn calibrations(&self) -> impl Iterator<Item = &CalibrationMarker> {
        self.blockettes.iter().filter_map(|b| match b {
            Blockette::Calibration(cal) => Some(cal),
            _ => None,
        })
    }

    /// Decode the sample payload.
    ///
    /// # Errors
    /// If there is no blockette 1000, the encoding is not supported, or the payload does
    /// not decode to the number of samples declared in the header.
    pub fn samples(&self) -> Result<Vec<i32>, RecordError> {
        let info = self.record_info().ok_or(RecordError::NoRecordInfo)?;
        let offset = usize::from(self.header.data_offset);
        let payload = self
            .data
            .get(offset..)
            .filter(|_| offset >= FIXED_HEADER_LEN)
            .ok_or(RecordError::BadHeader("data offset outside of record"))?;
        steim::decode(info.encoding, payload, self.num_samples(), info.big_endian)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordBuilder;

    #[test]
    fn decode_header() {
        let data = RecordBuilder::new("IU", "ANMO", "00", "BHZ")
            .start(2012, 61, 12, 30, 15, 2500)
            .rate(20, 1)
            .sequence(42)
            .samples(&[1, 2, 3])
            .build();

        let record = Record::decode(data).unwrap();
        let hdr = record.header();
        assert_eq!(hdr.sequence_number, "000042");
        assert_eq!(hdr.indicator, 'D');
        assert_eq!(hdr.network, "IU");
        assert_eq!(hdr.station, "ANMO");
        assert_eq!(hdr.location, "00");
        assert_eq!(hdr.channel, "BHZ");
        assert!(hdr.big_endian);
        assert_eq!(record.sample_rate(), 20.0);
        assert_eq!(record.num_samples(), 3);
        assert_eq!(
            crate::time::format_timestamp(record.start_time()),
            "2012/03/01 12:30:15.250000"
        );
        assert_eq!(record.samples().unwrap(), vec![1, 2, 3]);
        assert_eq!(record.len(), 512);
    }

    #[test]
    fn decode_little_endian_header() {
        let data = RecordBuilder::new("IU", "ANMO", "", "LHZ")
            .little_endian()
            .rate(1, 1)
            .samples(&[5, -5])
            .build();

        let record = Record::decode(data).unwrap();
        assert!(!record.header().big_endian);
        assert_eq!(record.header().location, "");
        assert_eq!(record.sample_rate(), 1.0);
        assert_eq!(record.samples().unwrap(), vec![5, -5]);
    }

    #[test]
    fn sample_rates() {
        let rate = |factor, multiplier| {
            let data = RecordBuilder::new("IU", "ANMO", "00", "BHZ")
                .rate(factor, multiplier)
                .build();
            Record::decode(data).unwrap().sample_rate()
        };
        assert_eq!(rate(20, 2), 40.0);
        assert_eq!(rate(20, -2), 10.0);
        assert_eq!(rate(-10, 1), 0.1);
        assert_eq!(rate(-10, -10), 0.01);
        assert_eq!(rate(0, 1), 0.0);
    }

    #[test]
    fn bad_indicator() {
        let mut data = RecordBuilder::new("IU", "ANMO", "00", "BHZ").build();
        data[6] = b'X';
        assert_eq!(
            RecordHeader::decode(&data),
            Err(RecordError::BadIndicator(b'X'))
        );
    }

    #[test]
    fn implausible_start() {
        let data = RecordBuilder::new("IU", "ANMO", "00", "BHZ")
            .start(1850, 1, 0, 0, 0, 0)
            .build();
        assert!(matches!(
            RecordHeader::decode(&data),
            Err(RecordError::BadHeader(_))
        ));
    }

    #[test]
    fn length_from_blockette_1000() {
        let data = RecordBuilder::new("IU", "ANMO", "00", "BHZ")
            .exponent(12)
            .build();
        assert_eq!(data.len(), 4096);
        assert_eq!(record_length(&data[..256]), Ok(4096));

        let data = RecordBuilder::new("IU", "ANMO", "00", "BHZ")
            .exponent(7)
            .build();
        assert_eq!(record_length(&data), Err(RecordError::RecordLength(7)));

        let data = RecordBuilder::new("IU", "ANMO", "00", "BHZ")
            .without_record_info()
            .build();
        assert_eq!(record_length(&data), Err(RecordError::NoRecordInfo));
    }

    #[test]
    fn extension_blockettes() {
        let data = RecordBuilder::new("IU", "ANMO", "00", "BHZ")
            .timing_quality(87)
            .calibration(2012, 61, 600)
            .samples(&[1])
            .build();

        let record = Record::decode(data).unwrap();
        assert_eq!(record.timing_quality(), Some(87));
        let cals: Vec<_> = record.calibrations().collect();
        assert_eq!(cals.len(), 1);
        assert_eq!(cals[0].duration, 600);
        let kinds: Vec<u16> = record.blockettes().iter().map(Blockette::kind).collect();
        assert_eq!(kinds, vec![RECORD_INFO, TIMING_QUALITY, CALIBRATION]);
    }

    #[test]
    fn heartbeat() {
        let data = RecordBuilder::new("IU", "ANMO", "00", "LOG").build();
        let record = Record::decode(data).unwrap();
        assert!(record.is_heartbeat());
        assert_eq!(record.samples().unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn steim1_samples() {
        let data = RecordBuilder::new("IU", "ANMO", "00", "BHZ")
            .steim1()
            .samples(&[10, 12, 9, 9, 100])
            .build();
        let record = Record::decode(data).unwrap();
        assert_eq!(record.record_info().unwrap().encoding, steim::STEIM1);
        assert_eq!(record.samples().unwrap(), vec![10, 12, 9, 9, 100]);
    }
}
