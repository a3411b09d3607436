use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;

use pantryshare::Config;

use super::{print_json, CommandResult, OutputFormat};

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> CommandResult {
        match &self.command {
            ConfigSubcommand::Show { format } => match format {
                OutputFormat::Json => print_json(config),
                OutputFormat::Text => {
                    println!("Configuration");
                    println!("=============\n");

                    if let Some(path) = &config.config_file {
                        println!("Config file: {}", path.display());
                    } else {
                        println!(
                            "Config file: {} (not found)",
                            Config::default_config_path().display()
                        );
                    }
                    println!();

                    println!("database_path: {}", config.database_path.value.display());
                    println!("  source: {}", config.database_path.source);
                    println!();

                    match config.user_id.value {
                        Some(id) => println!("user_id: {}", id),
                        None => println!("user_id: (not set)"),
                    }
                    println!("  source: {}", config.user_id.source);
                    println!();

                    println!("radius: {}", config.radius.value);
                    println!("  source: {}", config.radius.source);
                    println!();

                    println!("poll_interval_ms: {}", config.poll_interval_ms.value);
                    println!("  source: {}", config.poll_interval_ms.source);
                    println!();

                    match &config.neighbors.url {
                        Some(url) => println!("neighbors.url: {}", url),
                        None => println!("neighbors.url: (local lookup)"),
                    }
                    if config.neighbors.api_key.is_some() {
                        println!("neighbors.api_key: (set)");
                    }
                    Ok(())
                }
            },

            ConfigSubcommand::Init => {
                let config_path = Config::default_config_path();

                // Check if config already exists
                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'pantryshare config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let default_config = format!(
                    r#"# pantryshare configuration

# Path to SQLite database
# database_path: {}

# Who you are
user_id: {}

# Default search radius in km (0.5, 1, 2, 5, 10, 15, 25)
radius_km: 5

# Remote nearby-users lookup (optional)
# neighbors:
#   url: https://db.example.com
#   api_key: your-key
"#,
                    config.database_path.value.display(),
                    uuid::Uuid::new_v4()
                );

                let mut file = fs::File::create(&config_path)?;
                file.write_all(default_config.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}
