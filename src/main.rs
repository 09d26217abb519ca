//! nltool - run and inspect netlist descriptions.
//!
//! # Usage
//!
//! ```bash
//! nltool run -f circuits/divider.nl -n divider -t 0.5 -l R1.2
//! nltool listdevices
//! nltool static -f circuits/divider.nl
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use netlist_core::{
    error::{NetlistError, Result},
    setup::Factory,
    Netlist, NetlistConfig, SimTime, Snapshot, Source,
};
use tracing::info;

/// Netlist simulator tool
#[derive(Parser, Debug)]
#[command(name = "nltool", author, version, about, long_about = None)]
struct Cli {
    /// Be verbose
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Be quiet - no warnings
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a netlist for a given time
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Time to run in seconds
        #[arg(short = 't', long = "time_to_run", default_value_t = 1.0)]
        time: f64,

        /// Terminal to log into `log_<terminal>.log`; may be repeated
        #[arg(short = 'l', long = "log")]
        logs: Vec<String>,

        /// Input file of `time,param,value` lines applied at their times
        #[arg(short = 'i', long = "input")]
        input: Option<PathBuf>,

        /// Print event loop and solver statistics
        #[arg(short = 's', long)]
        stats: bool,

        /// Restore this state snapshot before running
        #[arg(long)]
        load: Option<PathBuf>,

        /// Write the final state snapshot to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// List all known device classes
    Listdevices,
    /// Show the analog solver groups of a netlist
    Static {
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(clap::Args, Debug)]
struct SourceArgs {
    /// Netlist description file
    #[arg(short = 'f', long = "file")]
    file: PathBuf,

    /// Netlist in the file to use; default is the first one
    #[arg(short = 'n', long = "name", default_value = "")]
    name: String,

    /// Predefine a macro, `NAME=VALUE` or `NAME` for 1; may be repeated
    #[arg(short = 'D', long = "define")]
    defines: Vec<String>,

    /// JSON configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

/// A parameter change read from the input file.
#[derive(Debug)]
struct Input {
    time: SimTime,
    param: String,
    value: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    netlist_core::init_logging(level);

    match cli.command {
        Commands::Run {
            source,
            time,
            logs,
            input,
            stats,
            load,
            save,
        } => cmd_run(&source, time, &logs, input.as_deref(), stats, load.as_deref(), save.as_deref()),
        Commands::Listdevices => cmd_listdevices(),
        Commands::Static { source } => cmd_static(&source),
    }
}

fn read_netlist(args: &SourceArgs, logs: &[String]) -> Result<Netlist> {
    let config = match &args.config {
        Some(path) => NetlistConfig::from_json_file(path)?,
        None => NetlistConfig::default(),
    };
    let mut setup = netlist_core::Setup::new(config)?;
    for d in &args.defines {
        setup.register_define(d);
    }
    setup.register_source(Source::File(args.file.clone()));
    setup.include(&args.name)?;
    for l in logs {
        setup.register_log(l)?;
    }
    setup.build()
}

fn read_input(nl: &Netlist, path: &Path) -> Result<Vec<Input>> {
    let text = std::fs::read_to_string(path).map_err(|source| NetlistError::FileReadError {
        path: path.display().to_string(),
        source,
    })?;
    let mut inputs = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let bad = || NetlistError::parse(path.display().to_string(), idx + 1, format!("cannot scan '{}'", line));
        let mut parts = line.splitn(3, ',');
        let (Some(t), Some(param), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(bad());
        };
        let t: f64 = t.trim().parse().map_err(|_| bad())?;
        let param = param.trim().to_string();
        nl.find_param(&param)?;
        inputs.push(Input {
            time: SimTime::from_double(t),
            param,
            value: value.trim().to_string(),
        });
    }
    inputs.sort_by_key(|i| i.time);
    Ok(inputs)
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|source| NetlistError::FileWriteError {
        path: path.display().to_string(),
        source,
    })
}

fn cmd_run(
    args: &SourceArgs,
    time: f64,
    logs: &[String],
    input: Option<&Path>,
    stats: bool,
    load: Option<&Path>,
    save: Option<&Path>,
) -> Result<()> {
    let started = Instant::now();
    let mut nl = read_netlist(args, logs)?;
    let inputs = match input {
        Some(path) => read_input(&nl, path)?,
        None => Vec::new(),
    };
    if let Some(path) = load {
        let json = std::fs::read_to_string(path).map_err(|source| NetlistError::FileReadError {
            path: path.display().to_string(),
            source,
        })?;
        nl.load_state(&Snapshot::from_json(&json)?)?;
    }
    println!("startup time ==> {:5.3}", started.elapsed().as_secs_f64());
    println!("running ...");

    let started = Instant::now();
    let stop = nl.time() + SimTime::from_double(time);
    for inp in inputs.iter().filter(|i| i.time < stop) {
        if inp.time > nl.time() {
            nl.process_queue_for(inp.time - nl.time());
        }
        info!(param = %inp.param, value = %inp.value, time = %inp.time, "input");
        nl.set_param(&inp.param, &inp.value)?;
    }
    nl.process_queue_for(stop - nl.time());
    nl.stop();

    let elapsed = started.elapsed().as_secs_f64();
    println!(
        "{:.6} seconds emulation took {:.6} real time ==> {:5.2}%",
        time,
        elapsed,
        time / elapsed.max(f64::MIN_POSITIVE) * 100.0
    );

    if stats {
        let s = nl.stats();
        println!("queue pops:   {}", s.queue_pops);
        println!("net updates:  {}", s.net_updates);
        println!("inc_active:   {}", s.inc_active);
        for g in nl.solver_groups() {
            println!(
                "{}: {} nets, {} calculations, {} newton loops, {} iterative fails",
                g.name,
                g.nets.len(),
                g.stats.calculations,
                g.stats.newton_loops,
                g.stats.iterative_fail
            );
        }
    }

    if let Some(path) = save {
        write_file(path, &nl.save_state().to_json()?)?;
    }
    Ok(())
}

fn cmd_listdevices() -> Result<()> {
    let factory = Factory::new()?;
    let mut entries: Vec<_> = factory.entries().iter().collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    for e in entries {
        let pins = e.term_params();
        if pins.is_empty() {
            println!("{:<20} params: {}", e.name, e.def_params().join(", "));
        } else {
            println!("{:<20} pins:   {}", e.name, pins.join(", "));
        }
    }
    Ok(())
}

fn cmd_static(args: &SourceArgs) -> Result<()> {
    let nl = read_netlist(args, &[])?;
    for g in nl.solver_groups() {
        println!(
            "{} [{}] capacity {} dynamic {} timestep {}",
            g.name, g.method, g.capacity, g.dynamic_devices, g.timestep_devices
        );
        for n in &g.nets {
            println!("    {}", n);
        }
    }
    Ok(())
}
