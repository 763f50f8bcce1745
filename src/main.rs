//! noisemap command line interface
//!
//! Measure, report, list and preview crowdsourced noise readings.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use noisemap::audio::{list_input_devices, CpalAudioSource};
use noisemap::config::{self, Config};
use noisemap::database::{get_database_path, SqliteSampleStore};
use noisemap::feed::SampleFeed;
use noisemap::geocoding::{Geocoder, NominatimClient};
use noisemap::geolocation::{locate, FixedLocationProvider, LocationProvider};
use noisemap::heat::HeatFrame;
use noisemap::logging::init_logging;
use noisemap::map::NoiseMap;
use noisemap::sample::{LatLng, NoiseSample};
use noisemap::session::RecordingSession;
use noisemap::store::SampleStore;
use noisemap::submit::{
    choose_decibels, report_live_reading, submit_reading, DEFAULT_MANUAL_READING,
};
use noisemap::viewport::Viewport;

/// Characters from empty to saturated
const SHADES: &[u8] = b" .:-=+*#%@";

#[derive(Parser)]
#[command(name = "noisemap")]
#[command(version)]
#[command(about = "Crowdsourced noise level mapping", long_about = None)]
struct Cli {
    /// Config file (default ~/.noisemap/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Sample database (overrides the config)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Device location given on the command line
#[derive(clap::Args, Clone, Copy)]
struct LocationArgs {
    /// Latitude of the reading
    #[arg(long, allow_hyphen_values = true, requires = "lng")]
    lat: Option<f64>,

    /// Longitude of the reading
    #[arg(long, allow_hyphen_values = true, requires = "lat")]
    lng: Option<f64>,
}

impl LocationArgs {
    fn provider(&self) -> FixedLocationProvider {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => FixedLocationProvider::new(LatLng::new(lat, lng)),
            _ => FixedLocationProvider::unavailable(),
        }
    }

    /// The device location, if one was given and is valid
    fn known(&self) -> Option<LatLng> {
        self.provider().current_location().ok()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List microphones
    Devices,

    /// Show the live meter, optionally submitting the final value
    Record {
        /// How long to listen
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,

        /// Input device ID (see `devices`)
        #[arg(long)]
        device: Option<String>,

        /// Submit the last estimate when done
        #[arg(long)]
        submit: bool,

        #[command(flatten)]
        location: LocationArgs,
    },

    /// Submit a manual reading
    Report {
        /// Decibel value
        #[arg(long, default_value = DEFAULT_MANUAL_READING)]
        decibels: String,

        #[command(flatten)]
        location: LocationArgs,
    },

    /// List recent readings, newest first
    #[command(alias = "ls")]
    List {
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Preview the heat map around a location in the terminal
    Render {
        #[command(flatten)]
        location: LocationArgs,

        #[arg(long)]
        zoom: Option<f64>,

        /// Terminal columns to use
        #[arg(long, default_value_t = 64)]
        columns: u32,

        /// Markers only
        #[arg(long)]
        no_heat: bool,
    },

    /// Look up a place
    Search {
        query: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::get_config_path()?,
    };
    let config = config::load_or_default(&config_path);
    // A second subscriber cannot be installed; logging then stays off
    let _logs = init_logging(&config.logging).ok();

    match &cli.command {
        Commands::Devices => {
            let devices = list_input_devices();
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else if devices.is_empty() {
                println!("No input devices found");
            } else {
                for device in devices {
                    let marker = if device.is_default { "*" } else { " " };
                    println!("{} {}  ({})", marker, device.name, device.id);
                }
            }
        }

        Commands::Record {
            seconds,
            device,
            submit,
            location,
        } => {
            let device_id = device.clone().or_else(|| config.audio.device_id.clone());
            record(
                &cli,
                &config,
                device_id,
                Duration::from_secs(*seconds),
                submit.then_some(*location),
            )
            .await?;
        }

        Commands::Report { decibels, location } => {
            let store = open_store(&cli, &config)?;
            let value = choose_decibels(None, decibels)?;
            let stored = submit_reading(store.as_ref(), location.known(), value)?;
            print_sample_result(cli.format, &stored)?;
        }

        Commands::List { limit } => {
            let store = open_store(&cli, &config)?;
            let mut query = config.feed.recent_query();
            if let Some(limit) = limit {
                query.limit = *limit;
            }
            let samples = store.list_recent(&query)?;

            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&samples)?);
            } else {
                for sample in &samples {
                    println!(
                        "{}  {:>6.1} dB  {}",
                        sample.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        sample.decibels,
                        sample.location
                    );
                }
                println!("{} reading(s)", samples.len());
            }
        }

        Commands::Render {
            location,
            zoom,
            columns,
            no_heat,
        } => {
            let store = open_store(&cli, &config)?;
            let feed = SampleFeed::new(
                store,
                config.feed.recent_query(),
                config.feed.retry_policy(),
            );

            let view = Viewport::new(
                config.map.fallback_center,
                (*zoom).unwrap_or(config.map.initial_zoom),
                config.map.width,
                config.map.height,
            );
            let mut map = NoiseMap::from_config(view, &config);
            map.apply_location(&locate(&location.provider(), config.map.fallback_center));
            map.set_heat_visible(!*no_heat);
            map.refresh(&feed).await;

            let frame = map.render();
            if let Some(warning) = frame.warning {
                eprintln!("Warning: {}", warning);
            }
            if let Some(error) = frame.error {
                eprintln!("Error: {}", error);
            }

            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(frame.markers)?);
            } else {
                if let Some(heat) = frame.heat {
                    print!("{}", ascii_heat(heat, *columns));
                }
                println!(
                    "centre {}  zoom {}  {} marker(s)",
                    frame.viewport.center,
                    frame.viewport.zoom,
                    frame.markers.len()
                );
                for marker in frame.markers.iter().take(10) {
                    println!(
                        "  {}  {}  r={:.0}m  {}",
                        marker.label(),
                        marker.center,
                        marker.radius,
                        marker.color.to_css()
                    );
                }
            }
        }

        Commands::Search { query } => {
            let client = NominatimClient::new(config.geocoding.clone())?;
            let results = client.search(query).await?;

            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No results");
            } else {
                for candidate in results {
                    println!("{:>10.5} {:>11.5}  {}", candidate.y, candidate.x, candidate.label);
                }
            }
        }
    }

    Ok(())
}

fn open_store(cli: &Cli, config: &Config) -> Result<Arc<SqliteSampleStore>> {
    let path = match (&cli.database, &config.storage.database_path) {
        (Some(path), _) | (None, Some(path)) => path.clone(),
        (None, None) => get_database_path()?,
    };
    let store = SqliteSampleStore::open(&path)
        .with_context(|| format!("Failed to open sample database at {:?}", path))?;
    Ok(Arc::new(store))
}

async fn record(
    cli: &Cli,
    config: &Config,
    device_id: Option<String>,
    duration: Duration,
    submit_at: Option<LocationArgs>,
) -> Result<()> {
    let source = Arc::new(CpalAudioSource::new(device_id, config.audio.frame_size));
    let mut session = RecordingSession::new(
        source,
        config.audio.sampler_settings(),
        config.smoothing.window(),
    );
    session.start()?;
    let mut updates = session.subscribe();

    let deadline = tokio::time::Instant::now() + duration;
    loop {
        match tokio::time::timeout_at(deadline, updates.changed()).await {
            Err(_) | Ok(Err(_)) => break,
            Ok(Ok(())) => {
                let estimate = *updates.borrow_and_update();
                match estimate {
                    Some(estimate) if cli.format == OutputFormat::Text => {
                        println!("{:>6.1} dB", estimate.decibels);
                    }
                    Some(estimate) => println!("{}", serde_json::to_string(&estimate)?),
                    None => break,
                }
            }
        }
    }

    if let Some(error) = session.take_error() {
        session.stop();
        return Err(anyhow!("Recording failed: {}", error));
    }

    if let Some(location) = submit_at {
        let store = open_store(cli, config)?;
        let stored = report_live_reading(&mut session, store.as_ref(), location.known())?;
        print_sample_result(cli.format, &stored)?;
    }
    session.stop();
    Ok(())
}

fn print_sample_result(format: OutputFormat, sample: &NoiseSample) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(sample)?);
    } else {
        println!(
            "Recorded {:.1} dB at {} ({})",
            sample.decibels, sample.location, sample.id
        );
    }
    Ok(())
}

/// Downsamples the heat frame to character cells, shading by peak alpha.
fn ascii_heat(frame: &HeatFrame, columns: u32) -> String {
    if frame.width == 0 || frame.height == 0 || columns == 0 {
        return String::new();
    }
    let cell_w = (frame.width / columns).max(1);
    // Terminal cells are roughly twice as tall as wide
    let cell_h = cell_w * 2;
    let rows = frame.height.div_ceil(cell_h);
    let cols = frame.width.div_ceil(cell_w);

    let mut out = String::with_capacity(((cols + 1) * rows) as usize);
    for row in 0..rows {
        for col in 0..cols {
            let mut peak = 0u8;
            for y in row * cell_h..((row + 1) * cell_h).min(frame.height) {
                for x in col * cell_w..((col + 1) * cell_w).min(frame.width) {
                    peak = peak.max(frame.alpha(x, y));
                }
            }
            let shade = usize::from(peak) * (SHADES.len() - 1) / 255;
            out.push(char::from(SHADES[shade]));
        }
        out.push('\n');
    }
    out
}
