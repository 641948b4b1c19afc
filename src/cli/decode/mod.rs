mod output;
mod progress;
mod render;
mod tracks;

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use indicatif::{MultiProgress, ProgressBar};
use log::Level;

use self::output::{AudioWriter, OutputSpec, base_output_path, create_path_with_suffix, track_path};
use self::progress::{Throughput, create_progress_bar, finalize_progress_bar};
use self::render::{DopRenderer, PcmRenderer, PcmSettings, Renderer, render_track};
use self::tracks::{Bounds, SourceTrack, dop_bounds, pcm_bounds, source_tracks};
use super::command::{Cli, DecodeArgs};
use crate::manifest::{MANIFEST_VERSION, Manifest, OutputMode, TrackEntry};
use crate::pcm::SampleFormat;
use dsd::process::decimate::Decimator;
use dsd::process::dop::DopPacker;
use dsd::source::{self, DsdSource, ReaderOptions, SampleSource};

/// One output file to render.
struct Job {
    bounds: Bounds,
    path: PathBuf,
    track: SourceTrack,
}

struct RunContext<'a> {
    spec: OutputSpec,
    strict: bool,
    pb: Option<&'a ProgressBar>,
}

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!(
        "Decoding DSD stream: {} (strict mode: {}, mode: {})",
        args.input.display(),
        cli.strict,
        if args.dop { "DoP" } else { "PCM" }
    );

    let fail_level = if cli.strict {
        Level::Warn
    } else {
        Level::Error
    };
    let mut source = source::open(
        &args.input,
        ReaderOptions {
            fail_level,
            ..Default::default()
        },
    )?;

    let container = source.kind().name();
    let channels = source.channel_count();
    let has_lfe = source_has_lfe(&source);
    let tracks = source_tracks(&source, args.onefile);
    log::info!(
        "{container}: {channels} channels at {} Hz, {} track(s) to write",
        source.sampling_frequency(),
        tracks.len()
    );

    let base = base_output_path(&args.input, args.output_path.as_deref(), args.format);
    if let Some(ref path) = args.output_path {
        log::info!("Output path specified: {}", path.display());
    }

    let (mode, sample_format, output_rate, entries) = if args.dop {
        let packer = DopPacker::new(&mut source)?;
        let total = packer.source().total_length();
        let spec = OutputSpec {
            format: args.format,
            sample_format: SampleFormat::Int(24),
            sample_rate: packer.output_frequency(),
            channels,
            has_lfe,
        };
        let jobs = plan_jobs(&base, tracks, |t| dop_bounds(t, total));
        let mut renderer = DopRenderer::new(packer);
        let entries = run_jobs(&mut renderer, &jobs, spec, cli.strict, multi)?;
        (OutputMode::Dop, spec.sample_format, spec.sample_rate, entries)
    } else {
        let sample_format = if args.float {
            SampleFormat::Float
        } else {
            SampleFormat::Int(args.bits.bits())
        };
        let decimator = Decimator::new(&mut source, args.sample_rate)?;
        let (ratio, first, last) = (
            decimator.ratio(),
            decimator.first_valid_sample(),
            decimator.last_valid_sample(),
        );
        log::debug!("Valid output range: {first:.2} to {last:.2} (ratio {ratio})");

        let spec = OutputSpec {
            format: args.format,
            sample_format,
            sample_rate: args.sample_rate,
            channels,
            has_lfe,
        };
        let jobs = plan_jobs(&base, tracks, |t| pcm_bounds(t, ratio, first, last));
        let settings = PcmSettings::new(sample_format, args.scale, !args.no_dither);
        let mut renderer = PcmRenderer::new(decimator, settings);
        let entries = run_jobs(&mut renderer, &jobs, spec, cli.strict, multi)?;
        log::debug!(
            "Stopped at {:.1}% of the source",
            renderer.decimator().position_percent()
        );
        (OutputMode::Pcm, sample_format, args.sample_rate, entries)
    };

    if args.manifest {
        let manifest = Manifest {
            version: MANIFEST_VERSION,
            source: args.input.display().to_string(),
            container: container.to_string(),
            mode,
            sample_rate: output_rate,
            channels,
            bits: sample_format.bits(),
            float: sample_format.is_float(),
            tracks: entries,
        };
        let path = create_path_with_suffix(&base, "tracks.yaml");
        log::info!("Writing track manifest: {}", path.display());
        manifest.write(&path)?;
    }

    log::info!("Decoding completed successfully");
    Ok(())
}

fn source_has_lfe(source: &DsdSource) -> bool {
    match source {
        // 5: FL FR C LFE, 7: FL FR C LFE BL BR
        DsdSource::Dsf(r) => matches!(r.header().channel_type, 5 | 7),
        DsdSource::Dff(r) => r.header().channel_ids.iter().any(|id| id.trim_end() == "LFE"),
    }
}

fn plan_jobs<F>(base: &Path, tracks: Vec<SourceTrack>, bounds: F) -> Vec<Job>
where
    F: Fn(&SourceTrack) -> Bounds,
{
    let count = tracks.len();
    tracks
        .into_iter()
        .enumerate()
        .map(|(n, track)| Job {
            bounds: bounds(&track),
            path: track_path(base, n, count),
            track,
        })
        .collect()
}

fn run_jobs<R: Renderer + ?Sized>(
    renderer: &mut R,
    jobs: &[Job],
    spec: OutputSpec,
    strict: bool,
    multi: Option<&MultiProgress>,
) -> Result<Vec<TrackEntry>> {
    let step = renderer.frame_step();
    let total_frames: u64 = jobs.iter().map(|j| j.bounds.frames(step)).sum();
    let pb = multi
        .map(|multi| create_progress_bar(multi, total_frames))
        .transpose()?;
    let ctx = RunContext {
        spec,
        strict,
        pb: pb.as_ref(),
    };

    let mut throughput = Throughput::new(spec.sample_rate);
    let mut entries = Vec::with_capacity(jobs.len());
    for (n, job) in jobs.iter().enumerate() {
        let frames = match run_job(renderer, job, &ctx, &mut throughput) {
            Ok(frames) => frames,
            Err(e) => {
                if let Some(ref pb) = pb {
                    pb.finish_with_message("decode failed");
                }
                return Err(e);
            }
        };

        let rate = renderer.position_rate();
        entries.push(TrackEntry {
            number: n + 1,
            file: job.path.display().to_string(),
            start_seconds: job.bounds.start.max(0.0) / rate,
            end_seconds: job.bounds.end.max(0.0) / rate,
            frames,
            tags: TrackEntry::tags_from(job.track.tags.as_ref()),
        });
    }

    if let Some(ref pb) = pb {
        finalize_progress_bar(pb, &throughput);
    }
    if renderer.failed_steps() > 0 {
        log::warn!(
            "{} source steps hit damaged or missing data and were idle-filled",
            renderer.failed_steps()
        );
    }
    Ok(entries)
}

fn run_job<R: Renderer + ?Sized>(
    renderer: &mut R,
    job: &Job,
    ctx: &RunContext,
    throughput: &mut Throughput,
) -> Result<u64> {
    log::info!(
        "Writing {} ({:.0} to {:.0})",
        job.path.display(),
        job.bounds.start,
        job.bounds.end
    );
    let failed_before = renderer.failed_steps();
    let mut writer = AudioWriter::create(&job.path, &ctx.spec, job.track.tags.as_ref())?;

    let frames = render_track(renderer, job.bounds, |samples, frames| {
        writer.write_samples(samples)?;
        throughput.add(frames);
        if let Some(pb) = ctx.pb {
            pb.inc(frames);
            if pb.position() % (16 * 1024) < frames {
                pb.set_message(throughput.message());
            }
        }
        Ok(())
    })?;
    writer.finish()?;

    let failed = renderer.failed_steps() - failed_before;
    if ctx.strict && failed > 0 {
        bail!(
            "{failed} source steps hit damaged or missing data in {}",
            job.path.display()
        );
    }
    Ok(frames)
}
