use std::io::{stdout, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use seedsplit::time::format_timestamp;
use seedsplit::{SplitConfig, SplitResult, SplitStats, Splitter};

use crate::Format;

pub struct FilterArgs {
    pub network: Option<String>,
    pub station: Option<String>,
    pub location: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Segment {
    start: String,
    end: String,
    samples: usize,
    digest: String,
}

#[derive(Debug, Clone, Serialize)]
struct Track {
    key: String,
    sample_rate: f64,
    samples: usize,
    gaps: usize,
    segments: Vec<Segment>,
    timing_quality: Option<u8>,
    calibrations: usize,
}

#[derive(Debug, Clone, Serialize)]
struct Input {
    filename: String,
    bytes: u64,
    records: u64,
    skipped: u64,
    digest: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Report {
    inputs: Vec<Input>,
    tracks: Vec<Track>,
    stats: SplitStats,
}

/// Run a split over `inputs` to completion.
pub fn run_split(inputs: &[PathBuf], config: SplitConfig) -> Result<SplitResult> {
    let splitter = Splitter::new(config).context("invalid filter")?;
    let handle = splitter.start_files(inputs).context("opening inputs")?;
    info!(
        "splitting {} files, {} bytes",
        inputs.len(),
        handle.total_bytes().unwrap_or_default()
    );
    match handle.join().context("splitting")? {
        Some(result) => Ok(result),
        None => bail!("split was cancelled"),
    }
}

fn report(inputs: &[PathBuf], result: &SplitResult) -> Result<Report> {
    let mut tracks = Vec::with_capacity(result.tracks.len());
    for (key, segments) in &result.tracks {
        let mut track = Track {
            key: key.to_string(),
            sample_rate: key.sample_rate(),
            samples: 0,
            gaps: segments.len().saturating_sub(1),
            segments: Vec::with_capacity(segments.len()),
            timing_quality: None,
            calibrations: result.calibrations.get(key).map_or(0, Vec::len),
        };
        for seg in segments {
            track.samples += seg.len();
            track.segments.push(Segment {
                start: format_timestamp(seg.start_time()),
                end: format_timestamp(seg.end_time()),
                samples: seg.len(),
                digest: seg.digest().context("computing segment digest")?,
            });
        }
        if let Some(quality) = result.timing_quality.get(key) {
            if !quality.is_empty() {
                let sum: u64 = quality.iter().map(|q| u64::from(*q)).sum();
                track.timing_quality = Some((sum / quality.len() as u64) as u8);
            }
        }
        tracks.push(track);
    }

    let inputs = result
        .streams
        .iter()
        .map(|s| Input {
            filename: inputs
                .get(s.stream)
                .map_or_else(String::new, |p| p.to_string_lossy().to_string()),
            bytes: s.bytes,
            records: s.records,
            skipped: s.skipped,
            digest: s.digest.clone(),
        })
        .collect();

    Ok(Report {
        inputs,
        tracks,
        stats: result.stats.clone(),
    })
}

pub fn split(inputs: &[PathBuf], filters: FilterArgs, readers: usize, format: &Format) -> Result<()> {
    for input in inputs {
        if !input.exists() {
            bail!("{input:?} does not exist");
        }
    }
    let config = SplitConfig::builder().readers(readers).build();
    let config = SplitConfig {
        network: filters.network,
        station: filters.station,
        location: filters.location,
        channel: filters.channel,
        ..config
    };
    let result = run_split(inputs, config)?;
    if result.stats.decode_failures > 0 {
        warn!(
            "{} records could not be decompressed",
            result.stats.decode_failures
        );
    }
    let report = report(inputs, &result)?;

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), &report).context("serializing to json")
        }
        Format::Text => {
            let data = render_text(&report)?;
            stdout()
                .write_all(data.as_bytes())
                .context("writing to stdout")
        }
    }
}

fn render_text(report: &Report) -> Result<String> {
    let mut hb = handlebars::Handlebars::new();
    hb.register_template_string("split", TEXT_TEMPLATE)
        .context("registering template")?;
    hb.render("split", report).context("rendering text")
}

const TEXT_TEMPLATE: &str = r"{{ #each inputs }}{{ filename }}: {{ records }} records, {{ bytes }} bytes, {{ skipped }} skipped{{ #if digest }} md5:{{ digest }}{{ /if }}
{{ /each }}
===========================================================================================
Kept:       {{ stats.kept }}
Discarded:  {{ stats.discarded }} (filtered {{ stats.filtered }}, heartbeats {{ stats.heartbeats }}, illegal rates {{ stats.illegal_rates }}, corrupt {{ stats.corrupt }})
Undecoded:  {{ stats.decode_failures }}
Corrected:  {{ stats.timing_corrections }}
{{ #each tracks }}-------------------------------------------------------------------------------------------
{{ key }}  samples:{{ samples }}  gaps:{{ gaps }}{{ #if timing_quality }}  quality:{{ timing_quality }}{{ /if }}
{{ #each segments }}  {{ start }}  {{ end }}  {{ samples }}
{{ /each }}{{ /each }}";
