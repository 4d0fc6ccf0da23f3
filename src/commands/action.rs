//! Runs one lighting action end to end
//!
//! Loads the cache, drives the executor with a single full-cache-reset
//! retry, and always writes the cache back.

use std::fmt;

use anyhow::{anyhow, Context, Result};

use crate::api::BridgeClient;
use crate::cache::{Cache, CacheStore};
use crate::cli::Cli;
use crate::config::RuntimeContext;
use crate::discovery::Locator;
use crate::executor::Executor;

/// Reserved action name that switches a room off
const OFF: &str = "off";

/// What the user asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    TurnOff { room: String },
    ApplyScene { room: String, scene: String },
}

impl Action {
    /// Build an action from `<action> [room]`; names are matched lowercase
    pub fn parse(action: &str, room: Option<&str>, default_room: &str) -> Result<Self> {
        let action = action.trim().to_lowercase();
        if action.is_empty() {
            return Err(anyhow!("No action given; pass a scene name or \"{OFF}\""));
        }

        let room = room
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(default_room)
            .to_lowercase();

        if action == OFF {
            Ok(Action::TurnOff { room })
        } else {
            Ok(Action::ApplyScene {
                room,
                scene: action,
            })
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::TurnOff { room } => write!(f, "turning off '{room}'"),
            Action::ApplyScene { room, scene } => {
                write!(f, "applying scene '{scene}' in '{room}'")
            }
        }
    }
}

pub async fn run(ctx: &RuntimeContext, cli: &Cli) -> Result<()> {
    let action = Action::parse(&cli.action, cli.room.as_deref(), ctx.default_room())?;

    let store = CacheStore::new(ctx.cache_path()?);
    let mut cache = if ctx.global.fresh {
        log::debug!("Ignoring cache at {}", store.path().display());
        Cache::new()
    } else {
        store.load()
    };

    let bridge_config = ctx.bridge();
    let bridge = BridgeClient::new(&bridge_config)?;
    let locator = Locator::new(&bridge_config)?;
    let executor = Executor::new(&bridge, &locator);

    perform_and_save(&executor, &store, &mut cache, &action).await
}

/// Perform `action`, then write the cache back whatever the outcome
pub async fn perform_and_save(
    executor: &Executor<'_>,
    store: &CacheStore,
    cache: &mut Cache,
    action: &Action,
) -> Result<()> {
    let outcome = perform(executor, cache, action).await;

    match (outcome, store.save(cache)) {
        (Ok(()), saved) => saved,
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(save_err)) => {
            log::warn!("{save_err:#}");
            Err(err)
        }
    }
}

/// Execute `action`, retrying once from an empty cache on any failure
pub async fn perform(executor: &Executor<'_>, cache: &mut Cache, action: &Action) -> Result<()> {
    match execute(executor, cache, action).await {
        Ok(()) => Ok(()),
        Err(err) => {
            log::warn!("Failed {action}: {err}; retrying with an empty cache");
            *cache = Cache::new();
            execute(executor, cache, action)
                .await
                .with_context(|| format!("failed {action}"))
        }
    }
}

async fn execute(executor: &Executor<'_>, cache: &mut Cache, action: &Action) -> Result<()> {
    match action {
        Action::TurnOff { room } => executor.turn_off_room(cache, room).await?,
        Action::ApplyScene { room, scene } => executor.apply_scene(cache, room, scene).await?,
    }
    Ok(())
}
