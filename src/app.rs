use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::{
    backend::{submit_updates, Backend, HttpBackend, SceneMedia},
    comparison::{random_placements, ComparisonSession},
    config::Config,
    player::{
        ClockTransport, HttpFetcher, MediaSource, PlayerCommand, PlayerController, PlayerHandle,
        PlayerPhase, PlayerView, VirtualFullscreen,
    },
    results::ScoreSummary,
    scores,
    task::AnswerSource,
    terminal::{render_player, render_task, Input, HELP},
};

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    #[arg(
        short,
        long,
        help = "The path to the config file. The default is `config.toml`."
    )]
    pub config: Option<String>,

    #[arg(
        short,
        long,
        help = "The base URL of the backend. This overrides the value from the config file."
    )]
    pub backend_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a randomly chosen scene and the URLs of its media.
    RandomScene,

    /// Compare the SQA3D and LLM answers for a scene side by side.
    Compare {
        #[arg(help = "The scene to evaluate. A random scene is picked if omitted.")]
        scene_id: Option<String>,
    },

    /// Print the average score of each answer source.
    Results,

    /// Store LLM answer scores from a JSON list of `{ "id": .., "score": .. }` entries.
    UploadScores {
        #[arg(help = "The scoring output file.")]
        file: String,
    },
}

/// How an interactive comparison ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Submitted { updated: usize, failed: usize },
    Abandoned,
}

pub async fn start() -> anyhow::Result<()> {
    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .parse_env("SQA_COMPARE_LOG")
        .init();

    let cli = Cli::parse();
    let config = Config::from_cli_args(&cli)?;
    let backend = HttpBackend::new(&config.backend);

    match cli.command {
        Command::RandomScene => show_random_scene(&backend, &config).await,
        Command::Compare { scene_id } => compare(&backend, &config, scene_id).await,
        Command::Results => show_results(&backend).await,
        Command::UploadScores { file } => upload_scores(&backend, &file).await,
    }
}

async fn show_random_scene(backend: &impl Backend, config: &Config) -> anyhow::Result<()> {
    let scene = backend.random_scene().await?;
    let media = SceneMedia::locate(backend, &config.storage, &scene.sceneid);
    println!("Scene: {}", scene.sceneid);
    println!("Tasks: {}", scene.tasks_ids.join(", "));
    println!("Image: {}", scene.imageurl.unwrap_or(media.image_url));
    println!("Video: {}", scene.videourl.unwrap_or(media.video_url));
    Ok(())
}

async fn show_results(backend: &impl Backend) -> anyhow::Result<()> {
    let summary = ScoreSummary::fetch(backend).await?;
    println!("{summary}");
    Ok(())
}

async fn upload_scores(backend: &impl Backend, path: &str) -> anyhow::Result<()> {
    let entries = scores::read_entries_path(path)?;
    info!("Uploading {} scores from {path}", entries.len());
    let report = scores::upload(backend, &entries).await;
    println!(
        "Updated {} tasks ({} skipped, {} failed)",
        report.updated, report.skipped, report.failed
    );
    Ok(())
}

pub async fn load_session(
    backend: &impl Backend,
    config: &Config,
    scene_id: Option<String>,
) -> anyhow::Result<ComparisonSession> {
    let scene_id = match scene_id {
        Some(scene_id) => scene_id,
        None => backend.random_scene().await?.sceneid,
    };

    let (sqa3d, llm) = tokio::try_join!(
        backend.random_tasks(&scene_id, AnswerSource::Sqa3d),
        backend.random_tasks(&scene_id, AnswerSource::Gemini),
    )
    .with_context(|| format!("Failed to load tasks for scene {scene_id}"))?;

    let total = sqa3d.len().min(llm.len());
    if total == 0 {
        bail!("Scene {scene_id} has no tasks to compare");
    }
    let placements = if config.comparison.shuffle_sides {
        random_placements(total, &mut rand::thread_rng())
    } else {
        vec![true; total]
    };
    info!("Comparing {total} tasks for scene {scene_id}");
    Ok(ComparisonSession::new(scene_id, sqa3d, llm, placements))
}

async fn compare(
    backend: &impl Backend,
    config: &Config,
    scene_id: Option<String>,
) -> anyhow::Result<()> {
    let mut session = load_session(backend, config, scene_id).await?;
    let media = SceneMedia::locate(backend, &config.storage, session.scene_id());
    println!("Bird's-eye view: {}", media.image_url);

    let mut player = PlayerController::spawn(
        ClockTransport::new(),
        VirtualFullscreen::default(),
        Arc::new(HttpFetcher::default()),
        config.player.clone(),
    );
    player.initialize(MediaSource::new(&media.video_url)).await?;

    let stdin = BufReader::new(io::stdin());
    let result = run_session(
        backend,
        &mut session,
        &mut player,
        stdin,
        config.player.seek_step_secs,
    )
    .await;
    player.close().await?;

    match result? {
        Outcome::Submitted { updated, failed } => {
            println!("Submitted {updated} votes ({failed} failed)");
            show_results(backend).await
        }
        Outcome::Abandoned => {
            println!("Comparison abandoned; nothing was submitted");
            Ok(())
        }
    }
}

/// The parts of a player view worth reprinting when they change. Position ticks alone are not.
#[derive(Debug, Clone, PartialEq)]
struct StatusKey {
    phase: PlayerPhase,
    is_playing: bool,
    volume: f64,
    is_fullscreen: bool,
    controls_visible: bool,
}

impl StatusKey {
    fn of(view: &PlayerView) -> Self {
        Self {
            phase: view.phase.clone(),
            is_playing: view.state.is_playing,
            volume: view.state.volume,
            is_fullscreen: view.state.is_fullscreen,
            controls_visible: view.state.controls_visible,
        }
    }
}

/// Drives a comparison from line commands until it is finished, abandoned or input ends.
pub async fn run_session(
    backend: &impl Backend,
    session: &mut ComparisonSession,
    player: &mut PlayerHandle,
    input: impl AsyncBufRead + Unpin,
    seek_step_secs: f64,
) -> anyhow::Result<Outcome> {
    let mut lines = input.lines();
    let mut watching = true;
    let mut shown = StatusKey::of(&player.view());
    let mut echo_next = false;

    println!("{}", render_task(session));
    println!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    return Ok(Outcome::Abandoned);
                };
                if line.trim().is_empty() {
                    continue;
                }
                let input = match Input::parse_with_step(&line, seek_step_secs) {
                    Ok(input) => input,
                    Err(err) => {
                        println!("{err}");
                        continue;
                    }
                };
                match input {
                    Input::Player(commands) => {
                        player.send(PlayerCommand::PointerActivity).await?;
                        for cmd in commands {
                            player.send(cmd).await?;
                        }
                        echo_next = true;
                    }
                    Input::Toggle(side) => {
                        session.toggle(side);
                        println!("{}", render_task(session));
                    }
                    Input::Previous => {
                        session.previous();
                        println!("{}", render_task(session));
                    }
                    Input::Next => {
                        session.next();
                        println!("{}", render_task(session));
                    }
                    Input::GoTo(index) => match session.go_to(index) {
                        Ok(_) => println!("{}", render_task(session)),
                        Err(err) => println!("{err}"),
                    },
                    Input::Finish => {
                        let records = session.finish()?;
                        let updated = submit_updates(backend, &records).await;
                        return Ok(Outcome::Submitted {
                            updated,
                            failed: records.len() - updated,
                        });
                    }
                    Input::Quit => return Ok(Outcome::Abandoned),
                    Input::Help => println!("{HELP}"),
                }
            }
            view = player.changed(), if watching => {
                match view {
                    Ok(view) => {
                        let key = StatusKey::of(&view);
                        if echo_next || key != shown {
                            println!("{}", render_player(&view));
                            echo_next = false;
                        }
                        shown = key;
                    }
                    Err(err) => {
                        log::warn!("{err:?}");
                        watching = false;
                    }
                }
            }
        }
    }
}
