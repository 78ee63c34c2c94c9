#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter for the Geocoin coin-collecting game.

mod file_store;
mod map_view;
mod session_transfer;

use std::{
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use geocoin_core::{CellAddress, Command, Direction, Event, Position, WorldConfig};
use geocoin_world::{self as world, query, World};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{file_store::FileStore, session_transfer::SessionTransfer};

/// Collect coins from caches scattered across a grid laid over the map.
#[derive(Debug, Parser)]
#[command(name = "geocoin", version)]
struct Cli {
    /// TOML file overriding the world configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Save file holding the session.
    #[arg(long, global = true, default_value = "geocoin-save.json")]
    save: PathBuf,

    #[command(subcommand)]
    verb: Verb,
}

/// One line typed at the `play` prompt.
#[derive(Debug, Parser)]
#[command(no_binary_name = true, disable_help_flag = true)]
struct PromptLine {
    #[command(subcommand)]
    verb: Verb,
}

#[derive(Clone, Debug, PartialEq, Subcommand)]
enum Verb {
    /// Show the player, the inventory and the map around them.
    Status,
    /// Walk one or more cells in a direction.
    Move {
        /// Direction to walk.
        #[arg(value_enum)]
        direction: Heading,
        /// Number of cells to walk.
        #[arg(long, default_value_t = 1)]
        steps: u32,
    },
    /// Jump to a reported position.
    Locate {
        /// Latitude in degrees.
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        /// Longitude in degrees.
        #[arg(allow_negative_numbers = true)]
        lng: f64,
    },
    /// Take one coin from the cache at cell `i,j`.
    Collect {
        /// Cell row.
        #[arg(allow_negative_numbers = true)]
        i: i32,
        /// Cell column.
        #[arg(allow_negative_numbers = true)]
        j: i32,
    },
    /// Put the oldest held coin into the cache at cell `i,j`.
    Deposit {
        /// Cell row.
        #[arg(allow_negative_numbers = true)]
        i: i32,
        /// Cell column.
        #[arg(allow_negative_numbers = true)]
        j: i32,
    },
    /// Write every record, including visible caches.
    Save,
    /// Discard the whole session and start again at the spawn point.
    Reset {
        /// Confirm that the session should be discarded.
        #[arg(long)]
        yes: bool,
    },
    /// Print the session as a single transferable line.
    Export,
    /// Replace the session with one printed by `export`.
    Import {
        /// Line printed by `export`.
        payload: String,
    },
    /// Read verbs from standard input until `quit`.
    Play,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Heading {
    North,
    East,
    South,
    West,
}

impl From<Heading> for Direction {
    fn from(heading: Heading) -> Self {
        match heading {
            Heading::North => Direction::North,
            Heading::East => Direction::East,
            Heading::South => Direction::South,
            Heading::West => Direction::West,
        }
    }
}

/// Entry point for the Geocoin command-line interface.
fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.verb {
        Verb::Export => {
            let store = FileStore::open(&cli.save)?;
            let session = SessionTransfer {
                records: store.records().clone(),
            };
            writeln!(out, "{}", session.encode())?;
        }
        Verb::Import { payload } => {
            let session = SessionTransfer::decode(&payload).context("invalid session string")?;
            let store = FileStore::overwrite(&cli.save, session.records)?;
            info!(path = %cli.save.display(), "session_imported");
            let mut events = Vec::new();
            let world = World::open(config, Box::new(store), &mut events);
            report(&mut out, &events)?;
            status(&mut out, &world)?;
        }
        Verb::Play => {
            let mut world = open_world(config, &cli.save, &mut out)?;
            play(&mut world, io::stdin().lock(), &mut out)?;
        }
        verb => {
            let mut world = open_world(config, &cli.save, &mut out)?;
            execute(&mut world, verb, &mut out)?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn load_config(path: Option<&Path>) -> Result<WorldConfig> {
    let Some(path) = path else {
        return Ok(WorldConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: WorldConfig = toml::from_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &WorldConfig) -> Result<()> {
    if !(config.tile_width.is_finite() && config.tile_width > 0.0) {
        bail!("tile_width must be a positive number, got {}", config.tile_width);
    }
    if !(0.0..=1.0).contains(&config.spawn_probability) {
        bail!(
            "spawn_probability must lie in [0, 1], got {}",
            config.spawn_probability
        );
    }
    Ok(())
}

fn open_world(config: WorldConfig, save: &Path, out: &mut impl Write) -> Result<World> {
    let store = FileStore::open(save)?;
    let mut events = Vec::new();
    let world = World::open(config, Box::new(store), &mut events);
    report(out, &events)?;
    Ok(world)
}

fn play(world: &mut World, input: impl BufRead, out: &mut impl Write) -> Result<()> {
    writeln!(out, "{}", query::welcome_banner(world))?;
    status(out, world)?;

    for line in input.lines() {
        let line = line.context("failed to read from stdin")?;
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.first().copied() {
            None => continue,
            Some("quit" | "exit") => break,
            Some(_) => {}
        }

        match PromptLine::try_parse_from(words.iter().copied()) {
            Ok(PromptLine {
                verb: Verb::Play | Verb::Export | Verb::Import { .. },
            }) => writeln!(out, "not available at the prompt")?,
            Ok(PromptLine { verb }) => {
                if let Err(error) = execute(world, verb, out) {
                    writeln!(out, "{error:#}")?;
                }
            }
            Err(error) => writeln!(out, "{}", error.render())?,
        }
    }

    apply(world, Command::Save, out)
}

fn execute(world: &mut World, verb: Verb, out: &mut impl Write) -> Result<()> {
    match verb {
        Verb::Status => status(out, world),
        Verb::Move { direction, steps } => {
            for _ in 0..steps {
                apply(
                    world,
                    Command::StepPlayer {
                        direction: direction.into(),
                    },
                    out,
                )?;
            }
            status(out, world)
        }
        Verb::Locate { lat, lng } => {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                bail!("position {lat}, {lng} is not a latitude and longitude");
            }
            let position = Position::new(lat, lng);
            apply(world, Command::RelocatePlayer { position }, out)?;
            status(out, world)
        }
        Verb::Collect { i, j } => apply(
            world,
            Command::CollectCoin {
                cell: CellAddress::new(i, j),
            },
            out,
        ),
        Verb::Deposit { i, j } => apply(
            world,
            Command::DepositCoin {
                cell: CellAddress::new(i, j),
            },
            out,
        ),
        Verb::Save => apply(world, Command::Save, out),
        Verb::Reset { yes } => {
            if !yes {
                bail!("refusing to discard the session without --yes");
            }
            apply(world, Command::ResetAll, out)?;
            status(out, world)
        }
        Verb::Export | Verb::Import { .. } | Verb::Play => {
            bail!("verb must be handled before the world is opened")
        }
    }
}

fn apply(world: &mut World, command: Command, out: &mut impl Write) -> Result<()> {
    let mut events = Vec::new();
    world::apply(world, command, &mut events);
    report(out, &events)
}

fn report(out: &mut impl Write, events: &[Event]) -> Result<()> {
    for event in events {
        if let Some(line) = describe(event) {
            writeln!(out, "{line}")?;
        }
    }
    Ok(())
}

fn describe(event: &Event) -> Option<String> {
    match event {
        Event::CoinCollected { coin, cell } => Some(format!("collected {coin} from {cell}")),
        Event::CoinDeposited { coin, cell } => Some(format!("deposited {coin} into {cell}")),
        Event::CollectRejected { reason, .. } | Event::DepositRejected { reason, .. } => {
            Some(format!("refused: {reason}"))
        }
        Event::RecordRejected { record, reason } => {
            Some(format!("ignored saved {record}: {reason}"))
        }
        Event::SessionSaved => Some("session saved".to_owned()),
        Event::SessionReset => Some("session reset".to_owned()),
        Event::PlayerMoved { .. }
        | Event::CacheSpawned { .. }
        | Event::CacheRestored { .. }
        | Event::CacheRetired { .. } => None,
    }
}

fn status(out: &mut impl Write, world: &World) -> Result<()> {
    let inventory = query::inventory(world);
    writeln!(
        out,
        "position {} in cell {}",
        query::player_position(world),
        query::player_cell(world)
    )?;
    if inventory.is_empty() {
        writeln!(out, "holding no coins")?;
    } else {
        let coins: Vec<String> = inventory.iter().map(ToString::to_string).collect();
        writeln!(out, "holding {} coins: {}", inventory.len(), coins.join(" "))?;
    }
    write!(out, "{}", map_view::render(world))?;
    Ok(())
}
