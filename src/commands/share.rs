use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use pantryshare::models::{PantryItem, SharedItem};
use pantryshare::{Config, Engine, SearchRadius};

use super::{parse_id, print_json, radius_or_default, CommandResult, OutputFormat};

#[derive(Args)]
pub struct ShareCommand {
    #[command(subcommand)]
    pub command: ShareSubcommand,
}

#[derive(Subcommand)]
pub enum ShareSubcommand {
    /// Share one of your pantry items with neighbors
    Publish {
        /// Pantry item ID (UUID)
        item_id: String,
    },

    /// List items shared by neighbors
    List {
        /// Search radius in km (0.5, 1, 2, 5, 10, 15, 25)
        #[arg(long, short)]
        radius: Option<SearchRadius>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show your shares and the pantry items you could still share
    Mine {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Claim an item a neighbor shared
    Request {
        /// Shared item ID (UUID)
        id: String,
    },

    /// Stop sharing an item nobody has claimed yet
    Withdraw {
        /// Shared item ID (UUID)
        id: String,
    },
}

#[derive(Serialize)]
struct MyShares {
    shares: Vec<SharedItem>,
    shareable: Vec<PantryItem>,
}

impl ShareCommand {
    pub async fn run(&self, engine: &Engine, config: &Config, user: Uuid) -> CommandResult {
        match &self.command {
            ShareSubcommand::Publish { item_id } => {
                let item_id = parse_id(item_id, "pantry item")?;
                let share = engine.registry.publish(item_id, user).await?;
                println!("Shared item is now available to neighbors");
                println!("ID: {}", share.id);
                Ok(())
            }

            ShareSubcommand::List { radius, format } => {
                let radius = radius_or_default(config, radius);
                let candidates = engine.locator.find_neighbors_of(user, radius).await?;
                let shares = engine.registry.list_available(&candidates).await?;

                match format {
                    OutputFormat::Json => print_json(&shares),
                    OutputFormat::Text => {
                        if shares.is_empty() {
                            println!("Nothing shared within {}", radius);
                            return Ok(());
                        }
                        for share in &shares {
                            println!("{}", share);
                        }
                        println!("\nTotal: {} item(s) within {}", shares.len(), radius);
                        Ok(())
                    }
                }
            }

            ShareSubcommand::Mine { format } => {
                let mine = MyShares {
                    shares: engine.registry.list_for_owner(user).await?,
                    shareable: engine.registry.shareable_items(user).await?,
                };

                match format {
                    OutputFormat::Json => print_json(&mine),
                    OutputFormat::Text => {
                        println!("Shared");
                        println!("======");
                        if mine.shares.is_empty() {
                            println!("(none)");
                        }
                        for share in &mine.shares {
                            println!(
                                "{}  item {}  {}  since {}",
                                share.id,
                                share.item_id,
                                share.status,
                                share.offered_at.format("%Y-%m-%d")
                            );
                        }

                        println!("\nNot shared yet");
                        println!("==============");
                        if mine.shareable.is_empty() {
                            println!("(none)");
                        }
                        for item in &mine.shareable {
                            println!("{}  {}", item.id, item);
                        }
                        Ok(())
                    }
                }
            }

            ShareSubcommand::Request { id } => {
                let id = parse_id(id, "shared item")?;
                engine.registry.request(id).await?;
                println!("Requested. The owner will see it as claimed.");
                Ok(())
            }

            ShareSubcommand::Withdraw { id } => {
                let id = parse_id(id, "shared item")?;
                engine.registry.withdraw(id, user).await?;
                println!("No longer shared");
                Ok(())
            }
        }
    }
}
