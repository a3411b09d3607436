use clap::Args;
use uuid::Uuid;

use pantryshare::Engine;

use super::{print_json, CommandResult, OutputFormat};

#[derive(Args)]
pub struct NotificationsCommand {
    /// Only show unread notifications
    #[arg(long)]
    pub unread: bool,

    /// Mark everything as read after listing
    #[arg(long)]
    pub mark_read: bool,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl NotificationsCommand {
    pub async fn run(&self, engine: &Engine, user: Uuid) -> CommandResult {
        let notifications = engine
            .notifications
            .list_for_user(user, self.unread)
            .await?;

        match self.format {
            OutputFormat::Json => print_json(&notifications)?,
            OutputFormat::Text => {
                if notifications.is_empty() {
                    println!("No notifications");
                }
                for notification in &notifications {
                    println!(
                        "{}  {}",
                        notification.created_at.format("%Y-%m-%d %H:%M"),
                        notification
                    );
                }
            }
        }

        if self.mark_read {
            let changed = engine.notifications.mark_all_read(user).await?;
            tracing::debug!("Marked {} notification(s) read", changed);
        }
        Ok(())
    }
}
