use clap::Args;

use super::{format_timestamp, CommandError, OutputFormat};
use crate::config::Config;
use crate::context::{open_session, runtime};

#[derive(Args)]
pub struct ListCommand {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Scenarios per page
    #[arg(long, default_value_t = 20)]
    pub page_size: u32,

    /// Only scenarios whose name or description contains this text
    #[arg(long)]
    pub filter: Option<String>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl ListCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        let rt = runtime().map_err(|e| CommandError::RuntimeError(e.to_string()))?;
        rt.block_on(self.list(config))
    }

    async fn list(&self, config: &Config) -> Result<(), CommandError> {
        let session = open_session(config)?;
        let listing = session
            .list(self.page, self.page_size, self.filter.as_deref())
            .await?;

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            }
            OutputFormat::Text => {
                if listing.items.is_empty() {
                    println!("No scenarios found.");
                    return Ok(());
                }

                println!("{:<36}  {:<16}  NAME", "ID", "UPDATED");
                for item in &listing.items {
                    println!(
                        "{:<36}  {:<16}  {}",
                        item.id,
                        format_timestamp(item.updated_at),
                        item.name
                    );
                }
                let p = &listing.pagination;
                println!();
                println!(
                    "Page {} of {} ({} scenario{})",
                    p.page,
                    p.total_pages.max(1),
                    p.total,
                    if p.total == 1 { "" } else { "s" }
                );
            }
        }
        Ok(())
    }
}
