mod config_cmd;
mod location;
mod neighbors;
mod notifications;
mod offer;
mod pantry;
mod request;
mod share;
mod watch;

pub use config_cmd::ConfigCommand;
pub use location::LocationCommand;
pub use neighbors::NeighborsCommand;
pub use notifications::NotificationsCommand;
pub use offer::OfferCommand;
pub use pantry::PantryCommand;
pub use request::RequestCommand;
pub use share::ShareCommand;
pub use watch::WatchCommand;

use clap::ValueEnum;
use serde::Serialize;
use uuid::Uuid;

use pantryshare::{Config, SearchRadius};

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Who the CLI acts as: `--user` wins over the configured user id.
pub fn current_user(
    config: &Config,
    user_override: Option<Uuid>,
) -> Result<Uuid, Box<dyn std::error::Error>> {
    user_override.or(config.user_id.value).ok_or_else(|| {
        "No user configured. Pass --user, set user_id in the config file or PANTRYSHARE_USER_ID"
            .into()
    })
}

pub fn parse_id(value: &str, what: &str) -> Result<Uuid, Box<dyn std::error::Error>> {
    Uuid::parse_str(value).map_err(|_| format!("Invalid {} UUID: {}", what, value).into())
}

pub fn radius_or_default(config: &Config, radius: &Option<SearchRadius>) -> SearchRadius {
    radius.unwrap_or(config.radius.value)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
