use clap::Args;
use uuid::Uuid;

use pantryshare::{Config, Engine, SearchRadius};

use super::{print_json, radius_or_default, CommandResult, OutputFormat};

#[derive(Args)]
pub struct NeighborsCommand {
    /// Search radius in km (0.5, 1, 2, 5, 10, 15, 25)
    #[arg(long, short)]
    pub radius: Option<SearchRadius>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl NeighborsCommand {
    pub async fn run(&self, engine: &Engine, config: &Config, user: Uuid) -> CommandResult {
        let radius = radius_or_default(config, &self.radius);
        let candidates = engine.locator.find_neighbors_of(user, radius).await?;

        match self.format {
            OutputFormat::Json => print_json(candidates.neighbors()),
            OutputFormat::Text => {
                if candidates.is_empty() {
                    println!("No neighbors within {}", radius);
                    return Ok(());
                }
                println!("{:<36}  DISTANCE", "USER");
                println!("{}", "-".repeat(48));
                for neighbor in candidates.neighbors() {
                    println!("{:<36}  {:.2} km", neighbor.user_id, neighbor.distance_km);
                }
                println!("\nTotal: {} neighbor(s) within {}", candidates.len(), radius);
                Ok(())
            }
        }
    }
}
