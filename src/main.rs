//! Capture firmware entry point.
//!
//! Usage:
//!   lumilog -o <dir> -d <seconds> [-m 0|1] [-w 0|1] [-p 0|1] [-s 0|1]
//!
//! Spawns one producer thread per enabled sensor plus the writer, waits
//! for the recording to finish and leaves numbered chunk files plus a
//! performance record in the output directory. The world camera may
//! require elevated privileges.

use anyhow::{Context, Result};
use lumilog::buffer::BufferPair;
use lumilog::config::{RunConfig, Sensor, BUFFER_WINDOW_S};
use lumilog::performance::PerformanceRecord;
use lumilog::{chunk, minispect, pupil, sunglasses, world};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn print_usage() {
    println!("lumilog — multi-sensor capture firmware for the light logger wearable");
    println!();
    println!("Usage: lumilog -o <dir> -d <seconds> [sensor flags]");
    println!();
    println!("Options:");
    println!("  -o, --output_dir <path>     Directory for chunk files (created if absent)");
    println!("  -d, --duration <seconds>    Recording length, 1 to 86400");
    println!("  -m, --minispect <0|1>       Record the spectrometer");
    println!("  -w, --world <0|1>           Record the world camera (may require sudo)");
    println!("  -p, --pupil <0|1>           Record the pupil camera");
    println!("  -s, --sunglasses <0|1>      Record the sunglasses magnetometer");
    println!();
    println!("Examples:");
    println!("  lumilog -o /data/run1 -d 3600 -m 1 -w 1 -p 1 -s 1");
    println!("  lumilog -o /tmp/bench -d 30 -w 1");
}

fn parse_flag(value: &str) -> bool {
    match value {
        "0" => false,
        "1" => true,
        other => {
            eprintln!("Expected 0 or 1, got '{other}'");
            std::process::exit(1);
        }
    }
}

fn parse_args() -> RunConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut output_dir: Option<PathBuf> = None;
    let mut duration_s: Option<u64> = None;
    let mut enabled = [false; 4];

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-o" | "--output_dir" if i + 1 < args.len() => {
                output_dir = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "-d" | "--duration" if i + 1 < args.len() => {
                duration_s = args[i + 1].parse().ok();
                i += 2;
            }
            "-m" | "--minispect" if i + 1 < args.len() => {
                enabled[Sensor::Minispect.index()] = parse_flag(&args[i + 1]);
                i += 2;
            }
            "-w" | "--world" if i + 1 < args.len() => {
                enabled[Sensor::World.index()] = parse_flag(&args[i + 1]);
                i += 2;
            }
            "-p" | "--pupil" if i + 1 < args.len() => {
                enabled[Sensor::Pupil.index()] = parse_flag(&args[i + 1]);
                i += 2;
            }
            "-s" | "--sunglasses" if i + 1 < args.len() => {
                enabled[Sensor::Sunglasses.index()] = parse_flag(&args[i + 1]);
                i += 2;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
    }

    let output_dir = output_dir.unwrap_or_else(|| {
        eprintln!("--output_dir is required");
        print_usage();
        std::process::exit(1);
    });
    let duration_s = match duration_s {
        Some(d) if (1..=86400).contains(&d) => d,
        _ => {
            eprintln!("--duration is required and must be between 1 and 86400 seconds");
            std::process::exit(1);
        }
    };
    if !enabled.iter().any(|&on| on) {
        eprintln!("At least one sensor must be enabled");
        std::process::exit(1);
    }

    RunConfig {
        output_dir,
        duration_s,
        enabled,
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lumilog=info".parse()?)
                .add_directive("warn".parse()?),
        )
        .init();

    let config = parse_args();
    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "could not create output directory {}",
            config.output_dir.display()
        )
    })?;

    println!("========================================");
    println!("lumilog capture");
    println!("========================================");
    println!("Output dir: {}", config.output_dir.display());
    println!("Duration:   {}s", config.duration_s);
    println!("Window:     {}s", BUFFER_WINDOW_S);
    for sensor in Sensor::ALL {
        println!(
            "{} ({}):     {}",
            sensor.tag(),
            sensor.name(),
            if config.enabled[sensor.index()] {
                "on"
            } else {
                "off"
            }
        );
    }
    println!("========================================");

    // Every sensor gets a pair so the writer always serializes four
    // slots; disabled sensors contribute zero-length buffers.
    let pairs: [Arc<BufferPair>; 4] = Sensor::ALL.map(|sensor| {
        Arc::new(if config.enabled[sensor.index()] {
            BufferPair::new(sensor.bytes_per_window())
        } else {
            BufferPair::empty()
        })
    });
    for sensor in config.enabled_sensors() {
        tracing::info!(
            "{} | buffers: 2 x {} bytes",
            sensor.name(),
            sensor.bytes_per_window()
        );
    }

    let duration = Duration::from_secs(config.duration_s);
    let mut producers = Vec::new();
    for sensor in config.enabled_sensors() {
        let pair = Arc::clone(&pairs[sensor.index()]);
        let handle = std::thread::Builder::new()
            .name(format!("{}-producer", sensor.name().to_lowercase()))
            .spawn(move || {
                let result = match sensor {
                    Sensor::Minispect => minispect::run(duration, &pair),
                    Sensor::World => world::run(duration, &pair),
                    Sensor::Pupil => pupil::run(duration, &pair),
                    Sensor::Sunglasses => sunglasses::run(duration, &pair),
                };
                match result {
                    Ok(frames) => frames,
                    Err(e) => {
                        // A dead producer invalidates the whole recording.
                        tracing::error!("{} | fatal: {:#}", sensor.name(), e);
                        std::process::exit(1);
                    }
                }
            })
            .context("could not spawn producer thread")?;
        producers.push((sensor, handle));
    }

    let writer = {
        let pairs = pairs.clone();
        let output_dir = config.output_dir.clone();
        std::thread::Builder::new()
            .name("writer".to_string())
            .spawn(move || {
                if let Err(e) = chunk::run(&output_dir, duration, BUFFER_WINDOW_S, &pairs) {
                    tracing::error!("Write | fatal: {:#}", e);
                    std::process::exit(1);
                }
            })
            .context("could not spawn writer thread")?
    };

    let mut record = PerformanceRecord::new(config.duration_s);
    for (sensor, handle) in producers {
        match handle.join() {
            Ok(frames) => record.set_frames(sensor, frames),
            Err(_) => {
                tracing::error!("{} | producer thread panicked", sensor.name());
                std::process::exit(1);
            }
        }
    }
    if writer.join().is_err() {
        tracing::error!("Write | writer thread panicked");
        std::process::exit(1);
    }

    record.write_csv(&config.output_dir)?;
    tracing::info!("recording complete");
    Ok(())
}
