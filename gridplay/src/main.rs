//! `gridplay`: plays grid puzzle games with a reasoning model.
//!
//! `play` opens a scorecard, runs one session per game id in order, and
//! closes the scorecard before exiting. Exit codes are stable, see
//! [`gridplay::exit_codes`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

use gridplay::core::schema::ActionSchema;
use gridplay::core::state::ShutdownFlag;
use gridplay::core::types::GameAction;
use gridplay::exit_codes;
use gridplay::io::config::{PlayerConfig, api_key_from_env, load_config, write_config};
use gridplay::io::decider::DecisionBackend;
use gridplay::io::game::HttpGameClient;
use gridplay::io::interrupt;
use gridplay::io::prompt::PromptBuilder;
use gridplay::io::render::PngRenderer;
use gridplay::logging;
use gridplay::session::{SessionClients, SessionFailedError, SessionStop};
use gridplay::supervisor::{RunSettings, run_games};

const DEFAULT_CONFIG: &str = "gridplay.toml";

#[derive(Parser)]
#[command(
    name = "gridplay",
    version,
    about = "Play grid puzzle games with a reasoning model"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play each game in order under one scorecard.
    Play {
        /// Game ids to play, e.g. `ls20-016295f7601e`.
        #[arg(required = true)]
        game_ids: Vec<String>,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        /// Override `session.max_actions`.
        #[arg(long)]
        max_actions: Option<u32>,
        /// Override `session.window_cap`.
        #[arg(long)]
        window_cap: Option<usize>,
        /// Override `logs.turn_log_dir`.
        #[arg(long)]
        turn_log_dir: Option<PathBuf>,
    },
    /// List the games the backend offers.
    Games {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Print the decision schema for a set of permitted actions.
    Schema {
        /// Permitted actions, e.g. `ACTION1 ACTION6`. `RESET` is always added.
        actions: Vec<String>,
        /// Print the local validation schema instead of the model schema.
        #[arg(long)]
        validation: bool,
    },
    /// Write a default config file.
    Init {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            if let Some(failed) = err.downcast_ref::<SessionFailedError>() {
                eprintln!(
                    "session: game {} guid {}",
                    failed.game_id,
                    failed.guid.as_deref().unwrap_or("none")
                );
            }
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Play {
            game_ids,
            config,
            max_actions,
            window_cap,
            turn_log_dir,
        } => {
            let mut cfg = load_config(&config)?;
            if let Some(max_actions) = max_actions {
                cfg.session.max_actions = max_actions;
            }
            if let Some(window_cap) = window_cap {
                cfg.session.window_cap = window_cap;
            }
            if turn_log_dir.is_some() {
                cfg.logs.turn_log_dir = turn_log_dir;
            }
            cfg.validate()?;
            cmd_play(&game_ids, &cfg)
        }
        Command::Games { config } => cmd_games(&config),
        Command::Schema {
            actions,
            validation,
        } => cmd_schema(&actions, validation),
        Command::Init { config, force } => cmd_init(&config, force),
    }
}

fn game_client(cfg: &PlayerConfig) -> Result<HttpGameClient> {
    HttpGameClient::new(
        &cfg.game.base_url,
        &api_key_from_env(&cfg.game.api_key_env)?,
        Duration::from_secs(cfg.game.timeout_secs),
    )
}

fn cmd_play(game_ids: &[String], cfg: &PlayerConfig) -> Result<i32> {
    let game = game_client(cfg)?;
    let decider = DecisionBackend::from_config(&cfg.decision)?;
    let renderer = PngRenderer::new(cfg.render.scale);
    let prompts = PromptBuilder::new()?;
    let shutdown = ShutdownFlag::new();
    interrupt::install(shutdown.clone())?;

    let clients = SessionClients {
        game: &game,
        decider: &decider,
        renderer: &renderer,
        prompts: &prompts,
    };
    let settings = RunSettings {
        max_actions: cfg.session.max_actions,
        window_cap: cfg.session.window_cap,
        turn_log_dir: cfg.logs.turn_log_dir.clone(),
        tags: cfg.game.tags.clone(),
    };

    let report = run_games(game_ids, &clients, &settings, &shutdown, |turn| {
        let target = turn
            .choice
            .coordinates()
            .map(|(x, y)| format!(" ({x}, {y})"))
            .unwrap_or_default();
        let fallback = if turn.fallback { " [fallback]" } else { "" };
        println!(
            "{} #{}: {}{}{} -> {} score {}",
            turn.game_id,
            turn.turn,
            turn.choice.action(),
            target,
            fallback,
            turn.state,
            turn.score
        );
    })?;

    for session in &report.sessions {
        let stop = match &session.stop {
            SessionStop::Won => "won".to_string(),
            SessionStop::BudgetExceeded {
                actions,
                max_actions,
            } => format!("budget exhausted ({actions}/{max_actions})"),
            SessionStop::Interrupted => "interrupted".to_string(),
        };
        println!(
            "{}: {} after {} actions, score {}, {} tokens",
            session.game_id,
            stop,
            session.actions_taken,
            session.final_score(),
            session.usage.total_tokens
        );
    }
    if let Some(card_id) = &report.card_id {
        println!("scorecard: {card_id}");
    }

    if report.interrupted {
        return Ok(exit_codes::INTERRUPTED);
    }
    Ok(exit_codes::OK)
}

fn cmd_games(config: &Path) -> Result<i32> {
    let cfg = load_config(config)?;
    let game = game_client(&cfg)?;
    for info in game.list_games()? {
        match info.title {
            Some(title) => println!("{}\t{}", info.game_id, title),
            None => println!("{}", info.game_id),
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_schema(actions: &[String], validation: bool) -> Result<i32> {
    let permitted = if actions.is_empty() {
        GameAction::DEFAULT_PERMITTED.to_vec()
    } else {
        actions
            .iter()
            .map(|raw| raw.parse::<GameAction>())
            .collect::<Result<Vec<_>>>()?
    };
    let schema = ActionSchema::new(&permitted);
    let rendered = if validation {
        schema.validation_schema()
    } else {
        schema.model_schema()
    };
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(exit_codes::OK)
}

fn cmd_init(config: &Path, force: bool) -> Result<i32> {
    if config.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config.display()
        );
    }
    write_config(config, &PlayerConfig::default())?;
    println!("wrote {}", config.display());
    Ok(exit_codes::OK)
}
