use clap::{Args, Subcommand};
use uuid::Uuid;

use pantryshare::models::{FoodRequest, NewFoodRequest, RequestEdit, Urgency};
use pantryshare::{CascadeReport, Config, Engine, SearchRadius};

use super::{parse_id, print_json, radius_or_default, CommandResult, OutputFormat};

#[derive(Args)]
pub struct RequestCommand {
    #[command(subcommand)]
    pub command: RequestSubcommand,
}

#[derive(Subcommand)]
pub enum RequestSubcommand {
    /// Ask your neighbors for something
    Create {
        /// What you need
        item_name: String,

        /// More details
        #[arg(long, short)]
        description: Option<String>,

        /// Urgency (low, medium, high)
        #[arg(long, short, default_value = "medium")]
        urgency: Urgency,

        /// Shared item (UUID) this request is about
        #[arg(long = "for-share", value_name = "SHARE_ID")]
        for_share: Option<String>,
    },

    /// Change one of your active requests
    Edit {
        /// Request ID (UUID)
        id: String,

        /// New item name
        #[arg(long)]
        name: Option<String>,

        /// New description
        #[arg(long, short)]
        description: Option<String>,

        /// New urgency (low, medium, high)
        #[arg(long, short)]
        urgency: Option<Urgency>,
    },

    /// Cancel one of your requests
    Cancel {
        /// Request ID (UUID)
        id: String,
    },

    /// List active requests from neighbors
    List {
        /// Search radius in km (0.5, 1, 2, 5, 10, 15, 25)
        #[arg(long, short)]
        radius: Option<SearchRadius>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List your own requests
    Mine {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl RequestCommand {
    pub async fn run(&self, engine: &Engine, config: &Config, user: Uuid) -> CommandResult {
        match &self.command {
            RequestSubcommand::Create {
                item_name,
                description,
                urgency,
                for_share,
            } => {
                if item_name.trim().is_empty() {
                    return Err("Item name cannot be empty".into());
                }

                let mut new = NewFoodRequest::new(user, item_name.trim(), *urgency);
                if let Some(description) = description {
                    new = new.with_description(description);
                }
                if let Some(share_id) = for_share {
                    let share_id = parse_id(share_id, "shared item")?;
                    let share = engine
                        .registry
                        .get(share_id)
                        .await?
                        .ok_or_else(|| format!("Shared item not found: {}", share_id))?;
                    new = new.for_item(share.owner_id, share.item_id);
                }

                let (request, report) = engine.board.create(new).await?;
                println!("Posted request:");
                println!("{}", request);
                print_warnings(&report);
                Ok(())
            }

            RequestSubcommand::Edit {
                id,
                name,
                description,
                urgency,
            } => {
                let edit = RequestEdit {
                    item_name: name.clone(),
                    description: description.clone(),
                    urgency: *urgency,
                };
                if edit.is_empty() {
                    return Err("No changes given. Use --name, --description or --urgency".into());
                }

                let id = parse_id(id, "request")?;
                engine.board.edit(id, user, edit).await?;
                println!("Request updated");
                Ok(())
            }

            RequestSubcommand::Cancel { id } => {
                let id = parse_id(id, "request")?;
                engine.board.cancel(id, user).await?;
                println!("Request cancelled");
                Ok(())
            }

            RequestSubcommand::List { radius, format } => {
                let radius = radius_or_default(config, radius);
                let candidates = engine.locator.find_neighbors_of(user, radius).await?;
                let requests = engine.board.list_active_for(&candidates).await?;
                print_requests(&requests, format, &format!("No open requests within {}", radius))
            }

            RequestSubcommand::Mine { format } => {
                let requests = engine.board.list_for_requester(user).await?;
                print_requests(&requests, format, "You have not posted any requests")
            }
        }
    }
}

fn print_requests(requests: &[FoodRequest], format: &OutputFormat, empty: &str) -> CommandResult {
    match format {
        OutputFormat::Json => print_json(requests),
        OutputFormat::Text => {
            if requests.is_empty() {
                println!("{}", empty);
                return Ok(());
            }
            for request in requests {
                println!("{}", request);
            }
            println!("\nTotal: {} request(s)", requests.len());
            Ok(())
        }
    }
}

pub(super) fn print_warnings(report: &CascadeReport) {
    for warning in &report.warnings {
        eprintln!("Warning: {} did not complete: {}", warning.step, warning.error);
    }
}
