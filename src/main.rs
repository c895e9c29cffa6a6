mod cli;

use dashframe::{config, report};
use dashframe_media::{extract_telemetry, TelemetrySchema, Timeline};

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "dashframe=trace,dashframe_media=debug,dashframe_decode=debug".to_string()
        } else {
            "dashframe=info,dashframe_media=warn,dashframe_decode=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe { file, json } => probe_file(&file, cli.config.as_deref(), json),
        Commands::Telemetry { file, json, limit } => {
            list_telemetry(&file, cli.config.as_deref(), json, limit)
        }
        Commands::FrameAt { file, time_ms } => frame_at(&file, cli.config.as_deref(), time_ms),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("dashframe {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn read_recording(file: &Path) -> Result<Bytes> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }
    let data = std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;
    tracing::debug!("Read {} bytes from {:?}", data.len(), file);
    Ok(Bytes::from(data))
}

fn open_timeline(file: &Path, schema: &TelemetrySchema) -> Result<(Bytes, Timeline)> {
    let data = read_recording(file)?;
    let timeline = Timeline::build(data.clone(), schema)
        .with_context(|| format!("Failed to build frame timeline for {:?}", file))?;
    Ok((data, timeline))
}

fn probe_file(file: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let schema = config.telemetry_schema();
    let (data, timeline) = open_timeline(file, &schema)?;
    let telemetry = extract_telemetry(&data, &schema)
        .with_context(|| format!("Failed to scan telemetry in {:?}", file))?;

    let summary = report::ProbeSummary::new(&timeline, telemetry.len());

    if json {
        let json_str = serde_json::to_string_pretty(&summary)?;
        println!("{}", json_str);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Codec: {}", summary.codec);
    println!("Dimensions: {}x{}", summary.width, summary.height);
    println!("Timescale: {}", summary.timescale);
    println!("Frames: {} ({} keyframes)", summary.frames, summary.keyframes);
    if let Some(fps) = summary.nominal_fps {
        println!("Frame rate: {:.3} fps", fps);
    }
    println!("Duration: {}", report::format_position(summary.duration_ms));
    if let Some(interval) = summary.max_keyframe_interval_ms {
        println!("Max keyframe interval: {:.1} ms", interval);
    }
    println!("Telemetry samples: {}", summary.telemetry_samples);

    let scan = summary.scan;
    println!(
        "\nScan: {} units, {} metadata, {} skipped",
        scan.units, scan.metadata_units, scan.skipped
    );
    if scan.truncated {
        println!("  Media data is truncated");
    }

    Ok(())
}

fn list_telemetry(
    file: &Path,
    config_path: Option<&Path>,
    json: bool,
    limit: Option<usize>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let schema = config.telemetry_schema();
    let (data, timeline) = open_timeline(file, &schema)?;
    let samples = extract_telemetry(&data, &schema)
        .with_context(|| format!("Failed to scan telemetry in {:?}", file))?;

    let shown = &samples[..limit.unwrap_or(samples.len()).min(samples.len())];

    if json {
        let json_str = serde_json::to_string_pretty(shown)?;
        println!("{}", json_str);
        return Ok(());
    }

    if samples.is_empty() {
        println!("No telemetry found in {}", file.display());
        return Ok(());
    }

    for sample in shown {
        match timeline.get(sample.frame_index) {
            Some(frame) => println!(
                "[frame {} @ {}]",
                sample.frame_index,
                report::format_position(frame.timestamp_ms)
            ),
            None => println!("[frame {}]", sample.frame_index),
        }
        print_fields(&report::telemetry_fields(&sample.record));
    }

    if shown.len() < samples.len() {
        println!("\n... {} more samples", samples.len() - shown.len());
    }

    Ok(())
}

fn frame_at(file: &Path, config_path: Option<&Path>, time_ms: f64) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let (_, timeline) = open_timeline(file, &config.telemetry_schema())?;

    if timeline.is_empty() {
        anyhow::bail!("Recording has no video frames: {:?}", file);
    }

    let index = timeline.frame_index_at(time_ms);
    let frame = timeline
        .get(index)
        .with_context(|| format!("Frame {} is outside the timeline", index))?;

    println!("Frame: {} of {}", index, timeline.len());
    println!("Timestamp: {}", report::format_position(frame.timestamp_ms));
    if frame.is_keyframe {
        println!("Keyframe: Yes");
    } else if let Some(keyframe) = timeline.governing_keyframe(index) {
        println!("Keyframe: No (decode starts at frame {})", keyframe);
    } else {
        println!("Keyframe: No (no preceding keyframe)");
    }

    match timeline.telemetry_at(index) {
        Some(record) => {
            println!("Telemetry:");
            print_fields(&report::telemetry_fields(record));
        }
        None => println!("Telemetry: none"),
    }

    Ok(())
}

fn print_fields(fields: &[(&'static str, String)]) {
    if fields.is_empty() {
        println!("  (no fields)");
    }
    for (label, value) in fields {
        println!("  {}: {}", label, value);
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Cache capacity: {} frames", config.engine.cache_capacity);
    println!("  Lookahead: {} frames", config.engine.lookahead);
    println!(
        "  Telemetry markers: padding {:#04x}, payload {:#04x}",
        config.telemetry.padding_marker, config.telemetry.payload_marker
    );

    Ok(())
}
