use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use sqt_core::error::{ScatterError, ScatterResult};
use sqt_core::factors::ScatterFactors;
use sqt_core::qgrid;
use sqt_core::selection::Selection;
use sqt_core::traj::InMemoryFrames;
use sqt_engine::config::ScatterConfig;
use sqt_engine::monitor::StreamEmitter;
use sqt_engine::run::{exit_code, run_scattering};
use sqt_engine::writer::{average_records, SignalReader};

#[derive(Parser)]
#[command(name = "sqt-scatter", version, about = "Scattering intensities from MD trajectories")]
struct Cli {
    /// JSON configuration (scattering/limits/runtime tree)
    #[arg(short, long)]
    config: PathBuf,
    /// XYZ trajectory (repeated frames)
    #[arg(short, long)]
    trajectory: PathBuf,
    /// Signal output file
    #[arg(short, long, default_value = "signal.sqsig")]
    output: PathBuf,
    /// Rank count of the in-process world
    #[arg(long, default_value_t = 1)]
    world: usize,
    /// Enable NDJSON streaming progress events to stderr
    #[arg(long)]
    stream: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run_cli(&cli) {
        Ok(records) => {
            println!("{} records written to {}", records, cli.output.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::from(exit_code(&err) as u8)
        }
    }
}

fn run_cli(cli: &Cli) -> ScatterResult<usize> {
    let config_text = fs::read_to_string(&cli.config)?;
    let config = ScatterConfig::from_json(&config_text)?;
    let trajectory_text = fs::read_to_string(&cli.trajectory)?;
    let (frames, elements) = parse_xyz(&trajectory_text)?;
    let source = Arc::new(InMemoryFrames::new(frames)?);

    let selection = Arc::new(select_target(
        &config.scattering.target,
        &elements,
    )?);
    if selection.is_empty() {
        return Err(ScatterError::Config(format!(
            "selection '{}' matches no atoms",
            config.scattering.target
        )));
    }
    let mut factors = ScatterFactors::for_selection(&selection)?;
    factors.set_background(config.scattering.background);

    let emitter = StreamEmitter::new(cli.stream);
    let summary = run_scattering(
        &config,
        source,
        selection,
        factors,
        cli.world,
        &cli.output,
        emitter,
    )?;
    print_shell_summary(&cli.output)?;
    Ok(summary.records)
}

/// Orientational average per |q| shell, written to stdout.
fn print_shell_summary(output: &PathBuf) -> ScatterResult<()> {
    let signal = SignalReader::open(output)?;
    let qvectors: Vec<_> = signal.records.iter().map(|r| r.q).collect();
    for shell in qgrid::shells(&qvectors, 1e-10) {
        let members: Vec<_> = shell.members.iter().map(|&i| &signal.records[i]).collect();
        if let Some(avg) = average_records(&members) {
            println!("|q| = {:<12.6} I(q) = {:.9e}", shell.magnitude, avg.fq.re);
        }
    }
    Ok(())
}

/// `all` selects every atom, anything else selects by element symbol.
fn select_target(target: &str, elements: &[String]) -> ScatterResult<Selection> {
    let mut indices = Vec::new();
    let mut selected = Vec::new();
    for (i, element) in elements.iter().enumerate() {
        if target == "all" || element == target {
            indices.push(i as u32);
            selected.push(element.clone());
        }
    }
    Selection::new(indices, selected)
}

/// Multi-frame XYZ: atom count line, comment line, then `element x y z`
/// records, repeated per frame.
fn parse_xyz(text: &str) -> ScatterResult<(Vec<Vec<[f64; 3]>>, Vec<String>)> {
    let mut lines = text.lines();
    let mut frames = Vec::new();
    let mut elements: Vec<String> = Vec::new();
    loop {
        let n_atoms = match lines.next() {
            None => break,
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => line
                .trim()
                .parse::<usize>()
                .map_err(|_| bad_xyz("frame atom count"))?,
        };
        lines.next().ok_or_else(|| bad_xyz("comment line"))?;
        let mut frame = Vec::with_capacity(n_atoms);
        for i in 0..n_atoms {
            let line = lines.next().ok_or_else(|| bad_xyz("atom record"))?;
            let mut fields = line.split_whitespace();
            let element = fields.next().ok_or_else(|| bad_xyz("element"))?;
            let x = parse_coord(fields.next())?;
            let y = parse_coord(fields.next())?;
            let z = parse_coord(fields.next())?;
            if frames.is_empty() {
                elements.push(element.to_string());
            } else if elements.get(i).map(String::as_str) != Some(element) {
                return Err(bad_xyz("element order changed between frames"));
            }
            frame.push([x, y, z]);
        }
        frames.push(frame);
    }
    if frames.is_empty() {
        return Err(bad_xyz("no frames"));
    }
    Ok((frames, elements))
}

fn parse_coord(field: Option<&str>) -> ScatterResult<f64> {
    field
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| bad_xyz("coordinate"))
}

fn bad_xyz(what: &str) -> ScatterError {
    ScatterError::Config(format!("malformed xyz trajectory: {}", what))
}
