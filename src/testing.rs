//! Synthetic data records for unit tests.
use chrono::{Datelike, Timelike};

use crate::record::steim::{INT32, STEIM1};
use crate::time::to_datetime;

pub(crate) struct RecordBuilder {
    network: String,
    station: String,
    location: String,
    channel: String,
    sequence: u32,
    start: (u16, u16, u8, u8, u8, u16),
    rate: (i16, i16),
    exponent: u8,
    encoding: u8,
    big_endian: bool,
    record_info: bool,
    timing_quality: Option<u8>,
    calibration: Option<(u16, u16, u32)>,
    samples: Vec<i32>,
}

impl RecordBuilder {
    pub(crate) fn new(network: &str, station: &str, location: &str, channel: &str) -> Self {
        RecordBuilder {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
            channel: channel.to_string(),
            sequence: 1,
            start: (2012, 61, 0, 0, 0, 0),
            rate: (20, 1),
            exponent: 9,
            encoding: INT32,
            big_endian: true,
            record_info: true,
            timing_quality: None,
            calibration: None,
            samples: Vec::new(),
        }
    }

    pub(crate) fn start(
        mut self,
        year: u16,
        day: u16,
        hour: u8,
        minute: u8,
        second: u8,
        tenth_millis: u16,
    ) -> Self {
        self.start = (year, day, hour, minute, second, tenth_millis);
        self
    }

    pub(crate) fn start_micros(mut self, micros: i64) -> Self {
        let dt = to_datetime(micros).expect("valid test time");
        self.start = (
            dt.year() as u16,
            dt.ordinal() as u16,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            (dt.timestamp_subsec_micros() / 100) as u16,
        );
        self
    }

    pub(crate) fn rate(mut self, factor: i16, multiplier: i16) -> Self {
        self.rate = (factor, multiplier);
        self
    }

    pub(crate) fn sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    pub(crate) fn exponent(mut self, exponent: u8) -> Self {
        self.exponent = exponent;
        self
    }

    pub(crate) fn steim1(mut self) -> Self {
        self.encoding = STEIM1;
        self
    }

    pub(crate) fn little_endian(mut self) -> Self {
        self.big_endian = false;
        self
    }

    pub(crate) fn without_record_info(mut self) -> Self {
        self.record_info = false;
        self
    }

    pub(crate) fn timing_quality(mut self, quality: u8) -> Self {
        self.timing_quality = Some(quality);
        self
    }

    pub(crate) fn calibration(mut self, year: u16, day: u16, duration: u32) -> Self {
        self.calibration = Some((year, day, duration));
        self
    }

    pub(crate) fn samples(mut self, samples: &[i32]) -> Self {
        self.samples = samples.to_vec();
        self
    }

    fn u16(&self, buf: &mut [u8], offset: usize, value: u16) {
        let bytes = if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        buf[offset..offset + 2].copy_from_slice(&bytes);
    }

    fn u32(&self, buf: &mut [u8], offset: usize, value: u32) {
        let bytes = if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        buf[offset..offset + 4].copy_from_slice(&bytes);
    }

    fn btime(&self, buf: &mut [u8], offset: usize, time: (u16, u16, u8, u8, u8, u16)) {
        self.u16(buf, offset, time.0);
        self.u16(buf, offset + 2, time.1);
        buf[offset + 4] = time.2;
        buf[offset + 5] = time.3;
        buf[offset + 6] = time.4;
        self.u16(buf, offset + 8, time.5);
    }

    fn ascii(buf: &mut [u8], offset: usize, len: usize, value: &str) {
        let field = format!("{value:<len$}");
        buf[offset..offset + len].copy_from_slice(&field.as_bytes()[..len]);
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let len = 1usize << self.exponent.clamp(6, 14);
        let mut buf = vec![0u8; len.max(256)];

        Self::ascii(&mut buf, 0, 6, &format!("{:06}", self.sequence));
        buf[6] = b'D';
        buf[7] = b' ';
        Self::ascii(&mut buf, 8, 5, &self.station);
        Self::ascii(&mut buf, 13, 2, &self.location);
        Self::ascii(&mut buf, 15, 3, &self.channel);
        Self::ascii(&mut buf, 18, 2, &self.network);
        self.btime(&mut buf, 20, self.start);
        self.u16(&mut buf, 30, self.samples.len() as u16);
        self.u16(&mut buf, 32, self.rate.0 as u16);
        self.u16(&mut buf, 34, self.rate.1 as u16);

        // blockette chain
        let mut offsets = Vec::new();
        let mut offset: usize = 48;
        if self.record_info {
            offsets.push((offset, 8));
            offset += 8;
        }
        if self.timing_quality.is_some() {
            offsets.push((offset, 8));
            offset += 8;
        }
        if self.calibration.is_some() {
            offsets.push((offset, 64));
            offset += 64;
        }
        let data_offset = offset.div_ceil(64) * 64;
        buf[39] = offsets.len() as u8;
        self.u16(&mut buf, 44, data_offset as u16);
        self.u16(&mut buf, 46, offsets.first().map_or(0, |o| o.0) as u16);

        let mut blockettes = offsets.iter();
        let mut next = |buf: &mut Vec<u8>, kind: u16, builder: &Self| {
            let (at, size) = *blockettes.next().expect("blockette offset");
            builder.u16(buf, at, kind);
            let next = if at + size < offset { at + size } else { 0 };
            builder.u16(buf, at + 2, next as u16);
            at
        };
        if self.record_info {
            let at = next(&mut buf, 1000, &self);
            buf[at + 4] = self.encoding;
            buf[at + 5] = u8::from(self.big_endian);
            buf[at + 6] = self.exponent;
        }
        if let Some(quality) = self.timing_quality {
            let at = next(&mut buf, 1001, &self);
            buf[at + 4] = quality;
        }
        if let Some((year, day, duration)) = self.calibration {
            let at = next(&mut buf, 320, &self);
            self.btime(&mut buf, at + 4, (year, day, 0, 0, 0, 0));
            self.u32(&mut buf, at + 16, duration);
            Self::ascii(&mut buf, at + 32, 12, "Resistive");
        }

        match self.encoding {
            STEIM1 => self.steim1_payload(&mut buf, data_offset),
            _ => {
                for (idx, sample) in self.samples.iter().enumerate() {
                    self.u32(&mut buf, data_offset + idx * 4, *sample as u32);
                }
            }
        }
        buf
    }

    // Every difference is stored as a full 32 bit word.
    fn steim1_payload(&self, buf: &mut [u8], data_offset: usize) {
        if self.samples.is_empty() {
            return;
        }
        let mut diffs = vec![0u32];
        for pair in self.samples.windows(2) {
            diffs.push(pair[1].wrapping_sub(pair[0]) as u32);
        }
        let mut diffs = diffs.into_iter();
        let mut frame = data_offset;
        let mut first = true;
        while frame + 64 <= buf.len() {
            let mut nibbles = 0u32;
            for idx in 1..16 {
                let at = frame + idx * 4;
                if first && idx == 1 {
                    self.u32(buf, at, self.samples[0] as u32);
                    continue;
                }
                if first && idx == 2 {
                    self.u32(buf, at, *self.samples.last().unwrap() as u32);
                    continue;
                }
                let Some(diff) = diffs.next() else {
                    break;
                };
                nibbles |= 3 << (30 - 2 * idx);
                self.u32(buf, at, diff);
            }
            self.u32(buf, frame, nibbles);
            first = false;
            frame += 64;
            if diffs.len() == 0 {
                break;
            }
        }
    }
}
