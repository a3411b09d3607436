use clap::{Args, Subcommand};
use uuid::Uuid;

use pantryshare::models::Decision;
use pantryshare::Engine;

use super::request::print_warnings;
use super::{parse_id, print_json, CommandResult, OutputFormat};

#[derive(Args)]
pub struct OfferCommand {
    #[command(subcommand)]
    pub command: OfferSubcommand,
}

#[derive(Subcommand)]
pub enum OfferSubcommand {
    /// Offer to help with a neighbor's request
    Make {
        /// Request ID (UUID)
        request_id: String,

        /// Message to the requester
        #[arg(long, short, default_value = "")]
        message: String,

        /// One of your shared items (UUID) to hand over
        #[arg(long)]
        share: Option<String>,
    },

    /// List offers on your requests, or on one request
    List {
        /// Only offers on this request (UUID)
        #[arg(long)]
        request: Option<String>,

        /// List the offers you made instead
        #[arg(long)]
        made: bool,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Accept an offer. The request is fulfilled and other offers are dropped.
    Accept {
        /// Offer ID (UUID)
        id: String,

        /// Reply to the helper
        #[arg(long, short)]
        message: Option<String>,
    },

    /// Decline an offer
    Decline {
        /// Offer ID (UUID)
        id: String,

        /// Reply to the helper
        #[arg(long, short)]
        message: Option<String>,
    },
}

impl OfferCommand {
    pub async fn run(&self, engine: &Engine, user: Uuid) -> CommandResult {
        match &self.command {
            OfferSubcommand::Make {
                request_id,
                message,
                share,
            } => {
                let request_id = parse_id(request_id, "request")?;
                let share = share
                    .as_deref()
                    .map(|id| parse_id(id, "shared item"))
                    .transpose()?;

                let offer = engine
                    .matcher
                    .make_offer(request_id, user, message, share)
                    .await?;
                println!("Offer sent");
                println!("ID: {}", offer.id);
                if let Some(share) = offer.shared_item_id {
                    println!("Hands over shared item {}", share);
                }
                Ok(())
            }

            OfferSubcommand::List {
                request,
                made,
                format,
            } => {
                let offers = match (request, *made) {
                    (Some(id), _) => {
                        let id = parse_id(id, "request")?;
                        engine.matcher.offers_for_request(id).await?
                    }
                    (None, true) => engine.matcher.offers_by_helper(user).await?,
                    (None, false) => engine.matcher.offers_for_requester(user).await?,
                };

                match format {
                    OutputFormat::Json => print_json(&offers),
                    OutputFormat::Text => {
                        if offers.is_empty() {
                            println!("No offers");
                            return Ok(());
                        }
                        for offer in &offers {
                            println!("{}", offer);
                        }
                        println!("\nTotal: {} offer(s)", offers.len());
                        Ok(())
                    }
                }
            }

            OfferSubcommand::Accept { id, message } => {
                self.resolve(engine, user, id, Decision::Accept, message).await
            }

            OfferSubcommand::Decline { id, message } => {
                self.resolve(engine, user, id, Decision::Decline, message).await
            }
        }
    }

    async fn resolve(
        &self,
        engine: &Engine,
        user: Uuid,
        id: &str,
        decision: Decision,
        message: &Option<String>,
    ) -> CommandResult {
        let id = parse_id(id, "offer")?;
        let offer = engine
            .matcher
            .get_offer(id)
            .await?
            .ok_or_else(|| format!("Offer not found: {}", id))?;

        let request = engine.board.get(offer.request_id).await?;
        if request.map(|r| r.requester_id) != Some(user) {
            return Err("Only the requester can answer an offer".into());
        }

        let report = engine
            .matcher
            .resolve_offer(&offer, decision, message.as_deref())
            .await?;
        match decision {
            Decision::Accept => println!("Offer accepted. The request is fulfilled."),
            Decision::Decline => println!("Offer declined"),
        }
        print_warnings(&report);
        Ok(())
    }
}
