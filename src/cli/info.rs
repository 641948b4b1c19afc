use std::collections::BTreeMap;
use std::io::{Read, Seek};

use anyhow::Result;
use indicatif::MultiProgress;
use log::Level;
use serde::Serialize;

use super::command::{Cli, InfoArgs};
use crate::timestamp::time_str;
use dsd::source::dff::DffReader;
use dsd::source::dsf::DsfReader;
use dsd::source::{self, DsdSource, ReaderOptions, SampleSource};
use dsd::structs::tags::TrackTags;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing DSD stream: {}", args.input.display());

    let fail_level = if cli.strict {
        Level::Warn
    } else {
        Level::Error
    };
    let source = source::open(
        &args.input,
        ReaderOptions {
            fail_level,
            ..Default::default()
        },
    )?;
    let info = StreamInfo::from_source(&source);

    let print = || -> Result<()> {
        if args.yaml {
            print!("{}", serde_yaml_ng::to_string(&info)?);
        } else {
            display_stream_info(&info);
        }
        Ok(())
    };

    match multi {
        Some(multi) => multi.suspend(print),
        None => print(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamInfo {
    container: &'static str,
    sampling_frequency: u32,
    channels: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_layout: Option<String>,
    total_samples: u64,
    duration_seconds: f64,
    compression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dst: Option<DstSummary>,
    tracks: Vec<TrackSummary>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    comments: Vec<CommentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    edited_master_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DstSummary {
    frame_count: u32,
    frame_rate: u16,
    indexed_frames: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackSummary {
    number: usize,
    start_sample: u64,
    end_sample: u64,
    start: String,
    end: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommentSummary {
    timestamp: String,
    kind: String,
    text: String,
}

fn tag_map(tags: Option<&TrackTags>) -> BTreeMap<String, String> {
    tags.map(|t| {
        t.entries()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    })
    .unwrap_or_default()
}

impl StreamInfo {
    fn from_source(source: &DsdSource) -> Self {
        let fs = source.sampling_frequency() as f64;
        let tracks = (0..source.track_count())
            .map(|n| {
                let (start, end) = (source.track_start(n), source.track_end(n));
                TrackSummary {
                    number: n + 1,
                    start_sample: start,
                    end_sample: end,
                    start: time_str(start as f64 / fs),
                    end: time_str(end as f64 / fs),
                    tags: if source.track_count() > 1 {
                        tag_map(source.tags_for(n))
                    } else {
                        BTreeMap::new()
                    },
                }
            })
            .collect();

        let mut info = Self {
            container: source.kind().name(),
            sampling_frequency: source.sampling_frequency(),
            channels: source.channel_count(),
            channel_layout: None,
            total_samples: source.total_length(),
            duration_seconds: source.length_seconds(),
            compression: "DSD".to_string(),
            dst: None,
            tracks,
            tags: BTreeMap::new(),
            comments: Vec::new(),
            edited_master_id: None,
        };

        match source {
            DsdSource::Dsf(r) => info.fill_dsf(r),
            DsdSource::Dff(r) => info.fill_dff(r),
        }
        info
    }

    fn fill_dsf<R: Read + Seek>(&mut self, reader: &DsfReader<R>) {
        self.channel_layout = Some(reader.header().channel_layout().to_string());
        self.tags = tag_map(reader.tags_for(0));
    }

    fn fill_dff<R: Read + Seek>(&mut self, reader: &DffReader<R>) {
        let header = reader.header();
        self.channel_layout = Some(header.channel_ids.join(" "));
        self.compression = format!(
            "{} ({})",
            reader.compression().name(),
            header.compression_name.trim()
        );
        self.dst = reader.dst_info().map(|dst| DstSummary {
            frame_count: dst.frame_count,
            frame_rate: dst.frame_rate,
            indexed_frames: header.dst_index.len(),
        });
        if reader.track_count() <= 1 {
            self.tags = tag_map(reader.tags_for(0));
        }
        self.comments = header
            .comments
            .iter()
            .map(|c| CommentSummary {
                timestamp: c.timestamp(),
                kind: format!("{:?}", c.comment_type),
                text: c.text.clone(),
            })
            .collect();
        self.edited_master_id = header.edited_master_id.clone();
    }
}

fn display_stream_info(info: &StreamInfo) {
    println!();
    println!("DSD Stream Information");
    println!("======================");
    println!();
    println!("  Container                 {}", info.container);
    println!("  Sampling rate             {} Hz", info.sampling_frequency);
    println!("  Channels                  {}", info.channels);
    if let Some(layout) = &info.channel_layout {
        println!("  Channel layout            {layout}");
    }
    println!("  Compression               {}", info.compression);
    if let Some(dst) = &info.dst {
        println!(
            "  DST frames                {} at {} fps ({} indexed)",
            dst.frame_count, dst.frame_rate, dst.indexed_frames
        );
    }
    println!("  Samples per channel       {}", info.total_samples);
    println!("  Duration                  {}", time_str(info.duration_seconds));
    if let Some(id) = &info.edited_master_id {
        println!("  Edited master ID          {id}");
    }
    println!();

    if !info.tags.is_empty() {
        println!("Tags");
        display_tags(&info.tags, "  ");
        println!();
    }

    println!("Tracks");
    for track in &info.tracks {
        println!(
            "  Track {:<3}                {} - {}",
            track.number, track.start, track.end
        );
        display_tags(&track.tags, "    ");
    }
    println!();

    if !info.comments.is_empty() {
        println!("Comments");
        for comment in &info.comments {
            println!("  {} [{}] {}", comment.timestamp, comment.kind, comment.text);
        }
        println!();
    }
}

fn display_tags(tags: &BTreeMap<String, String>, indent: &str) {
    for (key, value) in tags {
        println!("{indent}{key:<26}{value}");
    }
}
