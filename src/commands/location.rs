use clap::{Args, Subcommand};
use uuid::Uuid;

use pantryshare::models::{GeoPoint, UserLocation};
use pantryshare::Engine;

use super::{print_json, CommandResult, OutputFormat};

#[derive(Args)]
pub struct LocationCommand {
    #[command(subcommand)]
    pub command: LocationSubcommand,
}

#[derive(Subcommand)]
pub enum LocationSubcommand {
    /// Set your location
    Set {
        /// Latitude in degrees
        #[arg(allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in degrees
        #[arg(allow_hyphen_values = true)]
        lng: f64,
    },

    /// Show your stored location
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Forget your location
    Clear,
}

impl LocationCommand {
    pub async fn run(&self, engine: &Engine, user: Uuid) -> CommandResult {
        match &self.command {
            LocationSubcommand::Set { lat, lng } => {
                if !GeoPoint::new(*lat, *lng).is_valid() {
                    return Err(format!("Coordinates out of range: {}, {}", lat, lng).into());
                }
                engine
                    .locations
                    .upsert(&UserLocation::new(user, *lat, *lng))
                    .await?;
                println!("Location set to {:.5}, {:.5}", lat, lng);
                Ok(())
            }

            LocationSubcommand::Show { format } => match engine.locations.get(user).await? {
                Some(location) => match format {
                    OutputFormat::Json => print_json(&location),
                    OutputFormat::Text => {
                        println!(
                            "{:.5}, {:.5} (updated {})",
                            location.latitude,
                            location.longitude,
                            location.updated_at.format("%Y-%m-%d %H:%M")
                        );
                        Ok(())
                    }
                },
                None => {
                    println!("No location set. Use 'pantryshare location set <lat> <lng>'.");
                    Ok(())
                }
            },

            LocationSubcommand::Clear => {
                engine.locations.delete(user).await?;
                println!("Location cleared");
                Ok(())
            }
        }
    }
}
