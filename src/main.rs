use anyhow::{Result, bail, ensure};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, error, info};
use rust_dmx::{DmxPort, select_port};
use simplelog::{Config as LogConfig, SimpleLogger};
use std::path::PathBuf;
use std::thread::sleep;
use std::time::{Duration, Instant};

use crate::dmx::DmxBuffer;
use crate::light::{ColorCommand, LightState, NotifyFn, TurnOnAttributes};
use crate::patch::Patch;

mod coder;
mod color;
mod config;
mod dmx;
mod fade;
mod light;
mod patch;

#[derive(Parser)]
#[command(about)]
struct Cli {
    /// If true, provide verbose logging.
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the provided patch file is valid, then quit.
    Check(CheckArgs),

    /// Fade one patched fixture to a target, rendering over DMX.
    Fade(FadeArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// Path to a YAML file containing the fixture patch.
    patch_file: PathBuf,
}

#[derive(Args)]
struct FadeArgs {
    /// Path to a YAML file containing the fixture patch.
    patch_file: PathBuf,

    /// Name of the patched fixture to fade.
    fixture: String,

    /// Turn the fixture off instead of on.
    #[arg(long)]
    off: bool,

    /// Target brightness, in percent.
    #[arg(long)]
    brightness: Option<f64>,

    /// Target hue, in degrees. Requires --saturation.
    #[arg(long)]
    hue: Option<f64>,

    /// Target saturation, in percent. Requires --hue.
    #[arg(long)]
    saturation: Option<f64>,

    /// Target color temperature, in Kelvin.
    #[arg(long)]
    color_temp: Option<f64>,

    /// Target color as R,G,B bytes.
    #[arg(long, value_delimiter = ',', num_args = 3)]
    rgb: Option<Vec<u8>>,

    /// Fade to white, dropping saturation to zero.
    #[arg(long)]
    white: bool,

    /// Fade duration in seconds; defaults to the patch's transition time.
    #[arg(long)]
    duration: Option<f64>,
}

fn main() -> Result<()> {
    let args = Cli::try_parse()?;

    let log_level = if args.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    SimpleLogger::init(log_level, LogConfig::default())?;

    match args.command {
        Command::Check(args) => check_patch(args),
        Command::Fade(args) => run_fade(args),
    }
}

fn check_patch(args: CheckArgs) -> Result<()> {
    let patch = Patch::from_file(&args.patch_file)?;
    for fixture in patch.iter() {
        println!(
            "  \"{}\" ({}, {} channel(s)) at {} in universe {}",
            fixture.name,
            fixture.fixture_type,
            fixture.channel_count,
            fixture.addr,
            fixture.universe
        );
    }
    println!("Patch is OK ({} universe(s)).", patch.universe_count());
    Ok(())
}

fn run_fade(args: FadeArgs) -> Result<()> {
    let patch = Patch::from_file(&args.patch_file)?;
    let fixture = patch.get(&args.fixture)?;
    let universe = fixture.universe;
    let span = fixture.span();
    let mut light = patch.create_light(&args.fixture)?;

    let universe_count = patch.universe_count();
    println!("This patch requires {universe_count} universe(s).");

    let mut dmx_ports = Vec::new();
    for i in 0..universe_count {
        println!("Assign port to universe {i}:");
        dmx_ports.push(select_port(None)?);
    }

    let name = light.name().to_string();
    let notify: NotifyFn = Box::new(move |state: &LightState| {
        println!(
            "\"{name}\": brightness {:.1}%, color temp {:.0} K, hue {:.1}, saturation {:.1}%",
            state.brightness, state.color_temp_kelvin, state.hue, state.saturation
        );
    });

    let duration = args.duration.map(Duration::from_secs_f64);
    let mut controller = if args.off {
        light.turn_off(duration, notify, Instant::now())
    } else {
        light.turn_on(
            TurnOnAttributes {
                brightness: args.brightness,
                color: color_command(&args)?,
                transition: duration,
            },
            notify,
            Instant::now(),
        )
    };
    info!("Fading \"{}\" ({}).", args.fixture, controller.fade_type());

    let poll_interval = patch.poll_interval();
    let mut buffers: Vec<DmxBuffer> = vec![[0u8; 512]; universe_count];
    loop {
        let (values, done) = controller.poll(Instant::now());
        buffers[universe][span.clone()].copy_from_slice(values);
        for (port, buffer) in dmx_ports.iter_mut().zip(&buffers) {
            if let Err(e) = port.write(buffer) {
                error!("DMX write error: {e:#}.");
            }
        }
        if done {
            break;
        }
        sleep(poll_interval);
    }

    println!("Fade complete.");
    Ok(())
}

/// Interpret the color-related flags, insisting on at most one color target.
fn color_command(args: &FadeArgs) -> Result<Option<ColorCommand>> {
    let mut commands = Vec::new();
    if args.white {
        commands.push(ColorCommand::White);
    }
    if let Some(rgb) = &args.rgb {
        let &[r, g, b] = rgb.as_slice() else {
            bail!("--rgb requires exactly three components");
        };
        commands.push(ColorCommand::Rgb([r, g, b]));
    }
    if let Some(kelvin) = args.color_temp {
        commands.push(ColorCommand::ColorTemp(kelvin));
    }
    match (args.hue, args.saturation) {
        (Some(hue), Some(saturation)) => commands.push(ColorCommand::HueSat { hue, saturation }),
        (None, None) => (),
        _ => bail!("--hue and --saturation must be provided together"),
    }
    ensure!(
        commands.len() <= 1,
        "provide at most one color target (--white, --rgb, --color-temp, or --hue/--saturation)"
    );
    Ok(commands.pop())
}
