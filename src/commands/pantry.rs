use chrono::NaiveDate;
use clap::{Args, Subcommand};
use uuid::Uuid;

use pantryshare::models::PantryItem;
use pantryshare::Engine;

use super::{parse_id, print_json, CommandResult, OutputFormat};

#[derive(Args)]
pub struct PantryCommand {
    #[command(subcommand)]
    pub command: PantrySubcommand,
}

#[derive(Subcommand)]
pub enum PantrySubcommand {
    /// Add an item to your pantry
    Add {
        /// Item name
        name: String,

        /// Quantity
        #[arg(long, short, default_value_t = 1.0)]
        quantity: f64,

        /// Expiration date (YYYY-MM-DD)
        #[arg(long)]
        expires: Option<String>,
    },

    /// List your pantry items
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove an item from your pantry
    Remove {
        /// Pantry item ID (UUID)
        id: String,
    },
}

impl PantryCommand {
    pub async fn run(&self, engine: &Engine, user: Uuid) -> CommandResult {
        match &self.command {
            PantrySubcommand::Add {
                name,
                quantity,
                expires,
            } => {
                if name.trim().is_empty() {
                    return Err("Item name cannot be empty".into());
                }

                let mut item = PantryItem::new(user, name.trim()).with_quantity(*quantity);
                if let Some(date) = expires {
                    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                        .map_err(|_| format!("Invalid date '{}', expected YYYY-MM-DD", date))?;
                    item = item.with_expiration(date);
                }

                let created = engine.pantry.create(&item).await?;
                println!("Added {}", created);
                println!("ID: {}", created.id);
                Ok(())
            }

            PantrySubcommand::List { format } => {
                let items = engine.pantry.list_for_owner(user).await?;
                match format {
                    OutputFormat::Json => print_json(&items),
                    OutputFormat::Text => {
                        if items.is_empty() {
                            println!("Your pantry is empty");
                            return Ok(());
                        }
                        for item in &items {
                            println!("{}  {}", item.id, item);
                        }
                        println!("\nTotal: {} item(s)", items.len());
                        Ok(())
                    }
                }
            }

            PantrySubcommand::Remove { id } => {
                let id = parse_id(id, "pantry item")?;
                match engine.pantry.get(id).await? {
                    Some(item) if item.owner_id == user => {
                        engine.pantry.delete(id).await?;
                        println!("Removed {}", item.name);
                        Ok(())
                    }
                    Some(_) => Err("That pantry item belongs to another user".into()),
                    None => Err(format!("Pantry item not found: {}", id).into()),
                }
            }
        }
    }
}
