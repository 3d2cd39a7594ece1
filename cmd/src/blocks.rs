use std::io::{stdout, Write};
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Serialize;

use seedsplit::time::format_timestamp;
use seedsplit::{BlockLocator, ContiguousBlock, SplitConfig};

use crate::split::run_split;
use crate::Format;

/// Channel identifier without a sample rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelKey {
    network: String,
    station: String,
    location: String,
    channel: String,
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}_{} {}-{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Z0-9]{1,2})_([A-Z0-9]{1,5}) ([A-Z0-9]{2}|--)-([A-Z0-9]{3})$")
            .expect("key pattern is valid")
    })
}

/// Parse `NET_STA LOC-CHA`.
pub fn parse_key(s: &str) -> std::result::Result<ChannelKey, String> {
    let caps = key_pattern()
        .captures(s)
        .ok_or_else(|| format!("{s:?} is not of the form NET_STA LOC-CHA"))?;
    Ok(ChannelKey {
        network: caps[1].to_string(),
        station: caps[2].to_string(),
        location: caps[3].to_string(),
        channel: caps[4].to_string(),
    })
}

#[derive(Debug, Serialize)]
struct Block {
    start: String,
    end: String,
    samples: usize,
}

pub fn blocks(inputs: &[PathBuf], keys: &[ChannelKey], format: &Format) -> Result<()> {
    let result = run_split(inputs, SplitConfig::default())?;

    let mut channels = Vec::with_capacity(keys.len());
    for want in keys {
        let mut matches = result.tracks.iter().filter(|(key, _)| {
            key.same_channel(&want.network, &want.station, &want.location, &want.channel)
        });
        let Some((key, segments)) = matches.next() else {
            bail!("no data for {want}");
        };
        if let Some((other, _)) = matches.next() {
            bail!("{want} has more than one sample rate: {key} and {other}");
        }
        let spans: Vec<ContiguousBlock> = segments
            .iter()
            .map(|s| ContiguousBlock::new(s.start_time(), s.end_time(), s.interval()))
            .collect();
        channels.push(spans);
    }

    let Some(located) = BlockLocator::new()
        .locate(&channels)
        .context("locating common blocks")?
    else {
        bail!("locating was cancelled");
    };
    let located: Vec<Block> = located
        .iter()
        .map(|b| Block {
            start: format_timestamp(b.start()),
            end: format_timestamp(b.end()),
            samples: b.len(),
        })
        .collect();

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), &located).context("serializing to json")
        }
        Format::Text => {
            let mut out = stdout().lock();
            for block in &located {
                writeln!(out, "{}  {}  {}", block.start, block.end, block.samples)
                    .context("writing to stdout")?;
            }
            Ok(())
        }
    }
}
