//! Demo driver: a toy interfering-amplitude event generator feeding the
//! histogram engine from several workers, with table or JSON output and
//! snapshot save/load.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

use evhist::{
    Axis, JsonPrinter, OverflowPolicy, Registry, TablePrinter, codec, render,
};
use evhist_error::{EvhistError, Result};

struct Options {
    events: u64,
    workers: u64,
    bins: usize,
    seed: u64,
    json: bool,
    verbose: bool,
    out: Option<PathBuf>,
    load: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            events: 100_000,
            workers: 4,
            bins: 20,
            seed: 1,
            json: false,
            verbose: false,
            out: None,
            load: None,
        }
    }
}

const USAGE: &str = "usage: evhist [--events N] [--workers K] [--bins B] [--seed S] \
                     [--json] [--verbose] [--out FILE] [--load FILE]";

fn parse_options() -> Result<Options> {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .ok_or_else(|| EvhistError::out_of_range("missing value for flag", flag))
        };
        match arg.as_str() {
            "--events" => {
                options.events = parse_number(&value("--events")?)?;
            }
            "--workers" => {
                options.workers = parse_number(&value("--workers")?)?;
            }
            "--bins" => {
                options.bins = parse_number(&value("--bins")?)? as usize;
            }
            "--seed" => {
                options.seed = parse_number(&value("--seed")?)?;
            }
            "--json" => options.json = true,
            "--verbose" => options.verbose = true,
            "--out" => options.out = Some(PathBuf::from(value("--out")?)),
            "--load" => options.load = Some(PathBuf::from(value("--load")?)),
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => {
                return Err(EvhistError::out_of_range("unknown flag", other));
            }
        }
    }
    if options.workers == 0 || options.bins == 0 {
        return Err(EvhistError::out_of_range(
            "workers/bins",
            "must be positive",
        ));
    }
    Ok(options)
}

fn parse_number(raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| EvhistError::out_of_range("numeric flag value", raw))
}

/// One toy event: an interfering pair of nearly cancelling weights at a
/// random coordinate, plus a couple of smooth background samples.
fn generate_event(
    reg: &Registry<f64, u32, u64>,
    buf: &mut evhist::FillBuffer<f64, u32>,
    spectrum: evhist::HistogramId,
    background: evhist::HistogramId,
    rng: &mut StdRng,
) -> Result<()> {
    let x = rng.gen_range(0.0..100.0);
    let amplitude = rng.gen_range(1.0..100.0);
    let residue = rng.gen_range(-0.05..0.05);
    reg.fill_coord(buf, spectrum, x, amplitude)?;
    reg.fill_coord(buf, spectrum, x, -amplitude * (1.0 - residue))?;

    for _ in 0..rng.gen_range(0..4_u32) {
        // Deliberately overshoots the axis now and then to exercise the
        // out-of-range policy.
        let y = rng.gen_range(0.0..120.0);
        reg.fill_coord(buf, background, y, rng.gen_range(0.0..1.0))?;
    }
    Ok(())
}

fn run_generator(options: &Options) -> Result<Registry<f64, u32, u64>> {
    let mut reg = Registry::new();
    let spectrum = reg.book_with_axis(
        "spectrum",
        Axis::uniform(options.bins, 0.0, 100.0, OverflowPolicy::Flow)?,
        1,
    )?;
    let background = reg.book_with_axis(
        "background",
        Axis::uniform(options.bins, 0.0, 100.0, OverflowPolicy::Drop)?,
        1,
    )?;

    let reg_ref = &reg;
    std::thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::new();
        for worker in 0..options.workers {
            let events = options.events / options.workers
                + u64::from(worker < options.events % options.workers);
            let seed = options.seed.wrapping_add(worker);
            handles.push(scope.spawn(move || -> Result<()> {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut buf = reg_ref.create_buffer(64)?;
                for _ in 0..events {
                    generate_event(reg_ref, &mut buf, spectrum, background, &mut rng)?;
                    reg_ref.flush(&mut buf);
                }
                Ok(())
            }));
        }
        for handle in handles {
            handle
                .join()
                .map_err(|_| EvhistError::internal("worker thread panicked"))??;
        }
        Ok(())
    })?;

    tracing::info!(
        target: "evhist.cli",
        events = options.events,
        workers = options.workers,
        dropped = reg.dropped_fills(),
        "generation finished"
    );
    Ok(reg)
}

fn print_registry(reg: &Registry<f64, u32, u64>, json: bool) {
    let text = if json {
        render(reg, &mut JsonPrinter::new())
    } else {
        render(reg, &mut TablePrinter::new())
    };
    println!("{text}");
}

fn run() -> Result<()> {
    let options = parse_options()?;

    let default_filter = if options.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let reg = if let Some(path) = &options.load {
        let file = File::open(path)?;
        codec::read_snapshot(BufReader::new(file))?
    } else {
        run_generator(&options)?
    };

    print_registry(&reg, options.json);

    if let Some(path) = &options.out {
        let file = File::create(path)?;
        codec::write_snapshot(&reg, BufWriter::new(file))?;
        eprintln!("snapshot written to {}", path.display());
    }
    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("evhist: {error}");
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
}
