//! ZBoard 命令行程序

mod assistant;
mod cli;

use anyhow::{Context, Result};
use cli::{Command, USAGE};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zboard_core::prelude::*;
use zboard_file::AutoSave;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<BoardConfig> {
    let config = match path {
        Some(path) => BoardConfig::load(path),
        None => BoardConfig::load_or_default(BoardConfig::FILE_NAME),
    };
    config.context("failed to load configuration")
}

fn autosave(config: &BoardConfig, board: &Board) {
    if !config.autosave {
        return;
    }
    if let Err(e) = AutoSave::new().save(board) {
        tracing::warn!("Autosave failed: {}", e);
    }
}

fn print_report(report: &BatchReport) {
    println!(
        "applied {} instructions: {} entities created, {} polygons",
        report.applied,
        report.created.len(),
        report.polygons
    );
    for (requested, actual) in &report.renamed {
        println!("  renamed {requested} -> {actual}");
    }
}

fn build(config: BoardConfig, input: &Path, output: &Path) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("cannot read {}", input.display()))?;
    let mut board = Board::new(config.clone());
    let report = board.apply_json(&text)?;
    board.fit_view(20.0);
    print_report(&report);

    zboard_file::save(&board, output)?;
    println!("saved {}", output.display());
    autosave(&config, &board);
    Ok(())
}

fn info(config: BoardConfig, file: &Path) -> Result<()> {
    let document = zboard_file::load_document(file)?;
    let metadata = document.metadata.clone();
    let board = document.into_board(config)?;

    println!("{} ({})", metadata.title, metadata.id);
    println!(
        "created {}, modified {}",
        metadata.created.format("%Y-%m-%d %H:%M:%S"),
        metadata.modified.format("%Y-%m-%d %H:%M:%S")
    );
    println!("{}", board.summary());
    for point in board.store().points() {
        let mut tags = Vec::new();
        if let Some(derivation) = &point.derivation {
            tags.push(format!("{:?}", derivation.derivation_type()));
        }
        if point.fixed {
            tags.push("fixed".to_string());
        }
        if point.undefined {
            tags.push("undefined".to_string());
        }
        println!(
            "  {} ({:.2}, {:.2}) {}",
            point.name,
            point.position.x,
            point.position.y,
            tags.join(" ")
        );
    }
    for value in board.measurements() {
        println!("  {} = {:.3}", value.name, value.value);
    }
    for plot in board.functions() {
        let (x_min, x_max) = plot.range();
        println!("  {}: y = {} on [{x_min}, {x_max}]", plot.name, plot.expression());
    }
    Ok(())
}

fn print_step(report: &StepReport) {
    let position = report
        .position
        .map(|p| format!("({:.2}, {:.2})", p.x, p.y))
        .unwrap_or_else(|| "undefined".to_string());
    let measurements: Vec<String> = report
        .measurements
        .iter()
        .map(|m| format!("{}={:.3}", m.name, m.value))
        .collect();
    println!(
        "{:>4} {:.3} {} {}",
        report.step,
        report.progress,
        position,
        measurements.join(" ")
    );
}

struct AnimateArgs {
    file: PathBuf,
    point: String,
    path: Vec<String>,
    closed: bool,
    duration_ms: Option<u64>,
    mode: Option<PlaybackMode>,
    realtime: bool,
    output: Option<PathBuf>,
}

async fn animate(config: BoardConfig, args: AnimateArgs) -> Result<()> {
    let mut board = zboard_file::load(&args.file, config)?;
    let moving = board
        .store()
        .id_of(&args.point)
        .with_context(|| format!("no point named '{}'", args.point))?;
    let names: Vec<&str> = args.path.iter().map(String::as_str).collect();
    let path = MotionPath::through_points(board.store(), &names, args.closed)?;

    let mut animation = board
        .animation_config(moving, path)
        .with_measurements(Measurement::all_in(board.store()));
    if let Some(duration_ms) = args.duration_ms {
        animation = animation.with_duration(duration_ms);
    }
    if let Some(mode) = args.mode {
        animation = animation.with_mode(mode);
    }

    if args.realtime {
        board = play_realtime(board, animation).await?;
    } else {
        let mut scheduler = board.animation(animation)?;
        for report in scheduler.run_to_end(board.store_mut())? {
            print_step(&report);
        }
    }

    if let Some(output) = &args.output {
        zboard_file::save(&board, output)?;
        println!("saved {}", output.display());
    }
    Ok(())
}

/// 通过会话按实际时间播放一个行程
async fn play_realtime(board: Board, animation: AnimationConfig) -> Result<Board> {
    let passes = match animation.mode {
        PlaybackMode::Single => None,
        _ => Some(animation.total_steps()),
    };
    let (session, handle, mut events) = BoardSession::new(board, None);
    let task = tokio::spawn(session.run());

    let total = handle.start_animation(animation).await?;
    info!("Playing {} frames", total);
    let mut played = 0;
    while let Some(event) = events.next().await {
        match event {
            BoardEvent::AnimationStep(report) => {
                print_step(&report);
                played += 1;
                if passes.is_some_and(|n| played >= n) {
                    handle.pause_animation().await?;
                    break;
                }
            }
            BoardEvent::AnimationFinished => break,
            BoardEvent::AnimationAborted(reason) => anyhow::bail!("animation aborted: {reason}"),
            _ => {}
        }
    }

    let board = handle.snapshot().await?;
    handle.shutdown()?;
    task.await.context("board session panicked")?;
    Ok(board)
}

fn plot(
    config: BoardConfig,
    expression: &str,
    range: (Option<f64>, Option<f64>),
    resolution: Option<usize>,
    into: Option<&Path>,
) -> Result<()> {
    let x_min = range.0.unwrap_or(config.plot.x_min);
    let x_max = range.1.unwrap_or(config.plot.x_max);
    let resolution = resolution.unwrap_or(config.plot.resolution);

    let plot = FunctionPlot::new(expression, x_min, x_max)?;
    let runs = plot.sample(resolution)?;
    info!("Sampled {} runs of y = {}", runs.len(), expression);
    for (i, run) in runs.iter().enumerate() {
        if i > 0 {
            println!();
        }
        for p in run {
            println!("{},{}", p.x, p.y);
        }
    }

    if let Some(file) = into {
        let mut board = if file.exists() {
            zboard_file::load(file, config)?
        } else {
            Board::new(config)
        };
        let name = board.add_function(expression, Some((x_min, x_max)))?;
        zboard_file::save(&board, file)?;
        info!("Added {} to {}", name, file.display());
    }
    Ok(())
}

/// 函数求交的扫描步长
const INTERSECTION_PRECISION: f64 = 0.001;
/// 极值扫描步长
const EXTREMUM_STEP: f64 = 0.01;

fn analyze(
    config: BoardConfig,
    expression: &str,
    with: Option<&str>,
    range: (Option<f64>, Option<f64>),
) -> Result<()> {
    let x_min = range.0.unwrap_or(config.plot.x_min);
    let x_max = range.1.unwrap_or(config.plot.x_max);
    let plot = FunctionPlot::new(expression, x_min, x_max)?;

    println!("y = {expression} on [{x_min}, {x_max}]");
    match plot.value_range(x_min, x_max)? {
        Some(range) => println!("range: [{:.4}, {:.4}]", range.min, range.max),
        None => println!("range: undefined"),
    }
    let extrema = plot.extrema(x_min, x_max, EXTREMUM_STEP)?;
    for p in &extrema.maxima {
        println!("maximum: ({:.4}, {:.4})", p.x, p.y);
    }
    for p in &extrema.minima {
        println!("minimum: ({:.4}, {:.4})", p.x, p.y);
    }

    if let Some(other) = with {
        let other = FunctionPlot::new(other, x_min, x_max)?;
        let points = plot.intersections(&other, x_min, x_max, INTERSECTION_PRECISION)?;
        info!("Found {} intersections with y = {}", points.len(), other.expression());
        for p in points {
            println!("intersection: ({:.4}, {:.4})", p.x, p.y);
        }
    }
    Ok(())
}

fn check(config: BoardConfig, file: &Path, fix: bool, output: Option<&Path>) -> Result<()> {
    let mut board = zboard_file::load(file, config)?;
    let report = board.check();
    let stats = &report.statistics;
    println!(
        "{} objects ({} points, {} segments, {} intersections), {} issues",
        stats.total_objects, stats.points, stats.segments, stats.intersections, stats.issues
    );
    for issue in &report.issues {
        println!("  {}", issue.describe(board.store()));
    }
    for relation in board.relations() {
        println!("  {}", relation.describe(board.store()));
    }
    for hint in board.suggestions() {
        println!("  hint: {hint}");
    }

    if fix {
        let removed = board.repair()?;
        println!("removed {} entities", removed.len());
        let output = output.unwrap_or(file);
        zboard_file::save(&board, output)?;
        println!("saved {}", output.display());
    }
    Ok(())
}

async fn ask(
    config: BoardConfig,
    prompt: String,
    board_file: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let board = match &board_file {
        Some(file) => zboard_file::load(file, config.clone())?,
        None => Board::new(config.clone()),
    };

    let client = assistant::OllamaClient::new(&config.assistant);
    if !client.is_available() {
        tracing::warn!(
            "Assistant service at {} does not respond",
            config.assistant.endpoint
        );
    }

    let (session, handle, _events) = BoardSession::new(board, Some(Arc::new(client)));
    let task = tokio::spawn(session.run());
    let result = handle.ask(&prompt).await;
    let board = handle.snapshot().await?;
    handle.shutdown()?;
    task.await.context("board session panicked")?;

    print_report(&result?);
    println!("{}", board.summary());

    let output = output
        .or(board_file)
        .unwrap_or_else(|| PathBuf::from("zboard_output.zboard"));
    zboard_file::save(&board, &output)?;
    println!("saved {}", output.display());
    autosave(&config, &board);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = cli::parse_args(std::env::args().skip(1))?;
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Help => println!("{USAGE}"),
        Command::Build { input, output } => build(config, &input, &output)?,
        Command::Info { file } => info(config, &file)?,
        Command::Animate {
            file,
            point,
            path,
            closed,
            duration_ms,
            mode,
            realtime,
            output,
        } => {
            animate(
                config,
                AnimateArgs {
                    file,
                    point,
                    path,
                    closed,
                    duration_ms,
                    mode,
                    realtime,
                    output,
                },
            )
            .await?
        }
        Command::Plot {
            expression,
            from,
            to,
            resolution,
            into,
        } => plot(config, &expression, (from, to), resolution, into.as_deref())?,
        Command::Analyze {
            expression,
            with,
            from,
            to,
        } => analyze(config, &expression, with.as_deref(), (from, to))?,
        Command::Check { file, fix, output } => check(config, &file, fix, output.as_deref())?,
        Command::Ask {
            prompt,
            board,
            output,
        } => ask(config, prompt, board, output).await?,
    }
    Ok(())
}
