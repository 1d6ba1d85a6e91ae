use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use scopesweep::config::{self, SpectrumConfig, SweepConfig};
use scopesweep::plot::{self, PlotStyle};
use scopesweep::scpi::{Generator, Scope, ScpiLink, SimLink, SocketLink};
use scopesweep::sweep::{self, InterruptFlag, Pacing};
use scopesweep::{export, prompt, spectrum};

/// Cutoff of the simulated RC low-pass driven by `--sim`.
const SIM_CUTOFF_HZ: f64 = 1000.0;

#[derive(Parser)]
#[command(
    name = "scopesweep",
    about = "Automated Bode and spectrum measurements over SCPI"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Frequency-response sweep with a generator and a two-channel scope
    Bode {
        /// Oscilloscope SCPI server address
        #[arg(long, default_value = "127.0.0.1:3000")]
        scope_addr: String,

        /// Waveform generator SCPI address
        #[arg(long, default_value = "127.0.0.1:5025")]
        gen_addr: String,

        /// Drive a simulated bench instead of real instruments
        #[arg(long)]
        sim: bool,

        /// Run with the stored defaults, no prompts, save all outputs
        #[arg(long)]
        yes: bool,

        /// Configuration file
        #[arg(long, default_value = config::BODE_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Averaged FFT spectrum of one scope channel
    Spectrum {
        /// Oscilloscope SCPI server address
        #[arg(long, default_value = "127.0.0.1:3000")]
        scope_addr: String,

        /// Drive a simulated bench instead of a real instrument
        #[arg(long)]
        sim: bool,

        /// Run with the stored defaults, no prompts, save all outputs
        #[arg(long)]
        yes: bool,

        /// Configuration file
        #[arg(long, default_value = config::SPECTRUM_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Interactive raw SCPI console against the oscilloscope
    Console {
        /// Oscilloscope SCPI server address
        #[arg(long, default_value = "127.0.0.1:3000")]
        scope_addr: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let interrupt = InterruptFlag::new();
    interrupt
        .install_ctrlc_handler()
        .context("failed to install the Ctrl-C handler")?;

    match cli.command {
        Command::Bode {
            scope_addr,
            gen_addr,
            sim,
            yes,
            config,
        } => {
            if sim {
                let (gen_link, scope_link) = SimLink::rc_bench(SIM_CUTOFF_HZ);
                bode_session(
                    Generator::new(gen_link),
                    Scope::new(scope_link),
                    "simulated generator",
                    "simulated oscilloscope",
                    &Pacing::none(),
                    yes,
                    &config,
                    &interrupt,
                )
            } else {
                println!("Connecting to the generator at {gen_addr}...");
                let gen = Generator::new(SocketLink::connect(&gen_addr)?);
                println!("Connecting to the oscilloscope at {scope_addr}...");
                let scope = Scope::new(SocketLink::connect(&scope_addr)?);
                bode_session(
                    gen,
                    scope,
                    &gen_addr,
                    &scope_addr,
                    &Pacing::instrument(),
                    yes,
                    &config,
                    &interrupt,
                )
            }
        }
        Command::Spectrum {
            scope_addr,
            sim,
            yes,
            config,
        } => {
            if sim {
                let (_, scope_link) = SimLink::rc_bench(SIM_CUTOFF_HZ);
                spectrum_session(
                    Scope::new(scope_link),
                    "simulated oscilloscope",
                    &Pacing::none(),
                    yes,
                    &config,
                    &interrupt,
                )
            } else {
                println!("Connecting to the oscilloscope at {scope_addr}...");
                let scope = Scope::new(SocketLink::connect(&scope_addr)?);
                spectrum_session(
                    scope,
                    &scope_addr,
                    &Pacing::instrument(),
                    yes,
                    &config,
                    &interrupt,
                )
            }
        }
        Command::Console { scope_addr } => {
            println!("Connecting to the oscilloscope at {scope_addr}...");
            console_session(SocketLink::connect(&scope_addr)?, &interrupt)
        }
    }
}

/// Manual SCPI console: queries (ending in '?') wait for a reply, anything
/// else is sent blind. The scope is put back into automatic trigger on exit.
fn console_session(mut link: SocketLink, interrupt: &InterruptFlag) -> Result<()> {
    println!("--- Raw SCPI console ({}) ---", link.addr());
    match link.query("*IDN?") {
        Ok(idn) => println!("Connected: {idn}"),
        Err(e) => println!("Connected, but no identity reply ({e}). Is the scope on?"),
    }
    println!("Type 'exit' or 'quit' to leave.\n");

    loop {
        if interrupt.is_set() {
            break;
        }
        let line = prompt::ask_line("SCPI > ")?;
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if matches!(command.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }
        if command.ends_with('?') {
            match link.query(command) {
                Ok(reply) => println!("  <- {reply}\n"),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => println!("  <- no reply ({e})\n"),
            }
        } else {
            link.send(command)?;
            println!("  <- sent\n");
        }
    }

    let _ = link.send(":TRIGger:MODE AUTO");
    println!("Console closed.");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn bode_session<G: ScpiLink, S: ScpiLink>(
    mut gen: Generator<G>,
    mut scope: Scope<S>,
    gen_desc: &str,
    scope_desc: &str,
    pacing: &Pacing,
    yes: bool,
    config_path: &Path,
    interrupt: &InterruptFlag,
) -> Result<()> {
    println!("--- Frequency response analyzer ---");
    println!("  Generator:     {}", gen.identity()?);
    println!("  Oscilloscope:  {}", scope.identity()?);

    println!("  Resetting the oscilloscope...");
    scope.reset()?;
    pacing.pause(pacing.reset);

    loop {
        let stored: SweepConfig = config::load_or_default(config_path);
        let mut chosen = stored;
        if !yes && prompt::ask_yes_no("\nModify the stored configuration?", false)? {
            chosen = chosen.prompt_overrides()?;
            if prompt::ask_yes_no("Save it as the new default?", false)? {
                config::save(config_path, &chosen)?;
            }
        }
        chosen
            .validate()
            .context("sweep configuration rejected before touching the instruments")?;
        chosen.print_summary(gen_desc, scope_desc);

        if yes || prompt::ask_yes_no("Start the sweep?", true)? {
            let result = sweep::run_sweep(&mut gen, &mut scope, &chosen, pacing, interrupt)?;
            if result.points.is_empty() {
                println!("\nNo data collected, nothing to plot.");
            } else {
                println!("\n--- Sweep finished: {} points ---", result.points.len());
                let png = plot::render_bode_png(&result, &chosen, &PlotStyle::default())?;
                let (data_dir, plots_dir) = export::ensure_dirs(Path::new("."))?;
                if yes || prompt::ask_yes_no("Save the plot image?", true)? {
                    let path = export::next_numbered_path(&plots_dir, "BODE_plot", ".png");
                    export::save_png(&png, &path)?;
                }
                if yes || prompt::ask_yes_no("Save the raw data (CSV)?", true)? {
                    let path = export::next_numbered_path(&data_dir, "BODE_data", ".csv");
                    export::save_bode_csv(&result, &path)?;
                }
            }
        } else {
            println!("Sweep cancelled.");
        }

        if yes || interrupt.is_set() || !prompt::ask_yes_no("\nRun another sweep?", false)? {
            break;
        }
    }
    info!("session finished");
    Ok(())
}

fn spectrum_session<S: ScpiLink>(
    mut scope: Scope<S>,
    scope_desc: &str,
    pacing: &Pacing,
    yes: bool,
    config_path: &Path,
    interrupt: &InterruptFlag,
) -> Result<()> {
    println!("--- Spectrum analyzer ---");
    println!("  Oscilloscope:  {}", scope.identity()?);

    println!("  Resetting the oscilloscope...");
    scope.reset()?;
    pacing.pause(pacing.reset);

    loop {
        let stored: SpectrumConfig = config::load_or_default(config_path);
        let mut chosen = stored;
        if !yes && prompt::ask_yes_no("\nModify the stored configuration?", false)? {
            chosen = chosen.prompt_overrides()?;
            if prompt::ask_yes_no("Save it as the new default?", false)? {
                config::save(config_path, &chosen)?;
            }
        }
        chosen
            .validate()
            .context("spectrum configuration rejected before touching the instrument")?;
        chosen.print_summary(scope_desc);

        if yes || prompt::ask_yes_no("Start the analysis?", true)? {
            let confirm = || {
                if yes {
                    true
                } else {
                    prompt::wait_enter("  Press ENTER when the vertical scale is set... ").is_ok()
                        && !interrupt.is_set()
                }
            };
            let result =
                spectrum::run_spectrum_analysis(&mut scope, &chosen, pacing, interrupt, confirm)?;
            match result {
                None => println!("\nNo data collected, nothing to plot."),
                Some(result) => {
                    println!(
                        "\n--- Analysis finished: {} bins ---",
                        result.frequencies_hz.len()
                    );
                    let png = plot::render_spectrum_png(&result, &chosen, &PlotStyle::default())?;
                    let (data_dir, plots_dir) = export::ensure_dirs(Path::new("."))?;
                    if yes || prompt::ask_yes_no("Save the plot image?", true)? {
                        let path = export::next_numbered_path(&plots_dir, "SPECTRUM_plot", ".png");
                        export::save_png(&png, &path)?;
                    }
                    if yes || prompt::ask_yes_no("Save the raw data (CSV)?", true)? {
                        let path = export::next_numbered_path(&data_dir, "SPECTRUM_data", ".csv");
                        export::save_spectrum_csv(&result, &path)?;
                    }
                }
            }
        } else {
            println!("Analysis cancelled.");
        }

        if yes || interrupt.is_set() || !prompt::ask_yes_no("\nRun another analysis?", false)? {
            break;
        }
    }
    info!("session finished");
    Ok(())
}
