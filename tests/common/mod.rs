#![allow(dead_code)]
use std::fs;
use std::path::{Path, PathBuf};

/// Base time used by tests, 2012-03-01T00:00:00Z, in epoch microseconds.
pub const BASE: i64 = 1_330_560_000_000_000;

/// Day of year of [BASE].
const BASE_DAY: u16 = 61;

#[derive(Clone, Copy, Debug)]
pub enum Encoding {
    Int32,
    Steim1,
    Steim2,
}

/// Builds synthetic big-endian SEED data records with a blockette 1000.
pub struct RecordBuilder {
    network: String,
    station: String,
    location: String,
    channel: String,
    sequence: u32,
    offset: i64,
    rate: (i16, i16),
    encoding: Encoding,
    exponent: u8,
    samples: Vec<i32>,
}

impl RecordBuilder {
    pub fn new(network: &str, station: &str, location: &str, channel: &str) -> Self {
        RecordBuilder {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
            channel: channel.to_string(),
            sequence: 1,
            offset: 0,
            rate: (20, 1),
            encoding: Encoding::Int32,
            exponent: 9,
            samples: Vec::new(),
        }
    }

    /// Start time as microseconds after [BASE]. Must be less than a day and a multiple
    /// of 100us.
    pub fn offset(mut self, micros: i64) -> Self {
        self.offset = micros;
        self
    }

    pub fn sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn rate(mut self, factor: i16, multiplier: i16) -> Self {
        self.rate = (factor, multiplier);
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn exponent(mut self, exponent: u8) -> Self {
        self.exponent = exponent;
        self
    }

    pub fn samples(mut self, samples: &[i32]) -> Self {
        self.samples = samples.to_vec();
        self
    }

    fn put(buf: &mut [u8], at: usize, bytes: &[u8]) {
        buf[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn ascii(buf: &mut [u8], at: usize, len: usize, value: &str) {
        let field = format!("{value:<len$}");
        Self::put(buf, at, &field.as_bytes()[..len]);
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 1 << self.exponent];
        let secs = self.offset / 1_000_000;
        let tenths = (self.offset % 1_000_000) / 100;

        Self::ascii(&mut buf, 0, 6, &format!("{:06}", self.sequence));
        buf[6] = b'D';
        buf[7] = b' ';
        Self::ascii(&mut buf, 8, 5, &self.station);
        Self::ascii(&mut buf, 13, 2, &self.location);
        Self::ascii(&mut buf, 15, 3, &self.channel);
        Self::ascii(&mut buf, 18, 2, &self.network);
        Self::put(&mut buf, 20, &2012u16.to_be_bytes());
        Self::put(&mut buf, 22, &BASE_DAY.to_be_bytes());
        buf[24] = (secs / 3600) as u8;
        buf[25] = ((secs / 60) % 60) as u8;
        buf[26] = (secs % 60) as u8;
        Self::put(&mut buf, 28, &(tenths as u16).to_be_bytes());
        Self::put(&mut buf, 30, &(self.samples.len() as u16).to_be_bytes());
        Self::put(&mut buf, 32, &self.rate.0.to_be_bytes());
        Self::put(&mut buf, 34, &self.rate.1.to_be_bytes());
        buf[39] = 1;
        Self::put(&mut buf, 44, &64u16.to_be_bytes());
        Self::put(&mut buf, 46, &48u16.to_be_bytes());

        // blockette 1000
        Self::put(&mut buf, 48, &1000u16.to_be_bytes());
        buf[52] = match self.encoding {
            Encoding::Int32 => 3,
            Encoding::Steim1 => 10,
            Encoding::Steim2 => 11,
        };
        buf[53] = 1;
        buf[54] = self.exponent;

        let payload = match self.encoding {
            Encoding::Int32 => self.samples.iter().flat_map(|s| s.to_be_bytes()).collect(),
            Encoding::Steim1 => self.steim(|diff| (3, diff as u32)),
            Encoding::Steim2 => self.steim(|diff| (2, (1 << 30) | (diff as u32 & 0x3fff_ffff))),
        };
        Self::put(&mut buf, 64, &payload);
        buf
    }

    // One difference per data word; `pack` returns the nibble and word for a difference.
    fn steim(&self, pack: impl Fn(i32) -> (u32, u32)) -> Vec<u8> {
        let mut words: Vec<(u32, u32)> = Vec::new();
        if let (Some(first), Some(last)) = (self.samples.first(), self.samples.last()) {
            words.push((0, *first as u32));
            words.push((0, *last as u32));
            words.push(pack(0));
            for pair in self.samples.windows(2) {
                words.push(pack(pair[1].wrapping_sub(pair[0])));
            }
        }
        let mut payload = Vec::new();
        for frame in words.chunks(15) {
            let mut nibbles = 0u32;
            let mut data = Vec::with_capacity(60);
            for (idx, (nibble, word)) in frame.iter().enumerate() {
                nibbles |= nibble << (30 - 2 * (idx + 1));
                data.extend(word.to_be_bytes());
            }
            payload.extend(nibbles.to_be_bytes());
            payload.extend(data);
            payload.resize(payload.len().div_ceil(64) * 64, 0);
        }
        payload
    }
}

/// Contiguous one-sample-per-record stream of `count` records for `channel` at 20Hz.
pub fn contiguous(channel: &str, first: i64, count: usize) -> Vec<u8> {
    let mut dat = Vec::new();
    for idx in 0..count {
        dat.extend(
            RecordBuilder::new("IU", "ANMO", "00", channel)
                .sequence(idx as u32 + 1)
                .offset(first + idx as i64 * 50_000)
                .samples(&[idx as i32])
                .build(),
        );
    }
    dat
}

pub fn write_file(dir: &Path, name: &str, dat: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, dat).expect("writing test file");
    path
}
