use clap::Args;
use std::time::Duration;
use uuid::Uuid;

use pantryshare::{Config, Engine, NeighborhoodView, SearchRadius};

use super::{radius_or_default, CommandResult, OutputFormat};

#[derive(Args)]
pub struct WatchCommand {
    /// Search radius in km (0.5, 1, 2, 5, 10, 15, 25)
    #[arg(long, short)]
    pub radius: Option<SearchRadius>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl WatchCommand {
    /// Prints the neighborhood every time it changes, until Ctrl-C.
    pub async fn run(&self, engine: &Engine, config: &Config, user: Uuid) -> CommandResult {
        let radius = radius_or_default(config, &self.radius);
        let handle = engine.watch(user, radius).await?;
        let poller = engine
            .external_changes(Duration::from_millis(config.poll_interval_ms.value))
            .await?
            .spawn();

        eprintln!("Watching neighbors within {} (Ctrl-C to stop)", radius);
        let mut updates = handle.subscribe();
        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = updates.borrow_and_update().clone();
                    self.print(&view);
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        poller.abort();
        handle.shutdown().await;
        Ok(())
    }

    fn print(&self, view: &NeighborhoodView) {
        match self.format {
            OutputFormat::Json => {
                let line = serde_json::json!({
                    "generation": view.generation,
                    "shares": &*view.shares,
                    "requests": &*view.requests,
                    "offers": &*view.offers,
                });
                println!("{}", line);
            }
            OutputFormat::Text => {
                println!(
                    "--- update {}: {} shared, {} requested, {} offer(s) on your requests",
                    view.generation,
                    view.shares.len(),
                    view.requests.len(),
                    view.offers.len()
                );
                for share in view.shares.iter() {
                    println!("  share    {}", share);
                }
                for request in view.requests.iter() {
                    println!("  request  {}", request);
                }
                for offer in view.offers.iter() {
                    println!("  offer    {}", offer);
                }
            }
        }
    }
}
