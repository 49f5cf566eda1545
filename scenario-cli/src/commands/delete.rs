use clap::Args;
use std::io::{self, Write};

use super::CommandError;
use crate::config::Config;
use crate::context::{open_session, runtime};

#[derive(Args)]
pub struct DeleteCommand {
    /// Scenario ID
    pub id: String,

    /// Skip confirmation
    #[arg(long, short)]
    pub force: bool,
}

impl DeleteCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        let rt = runtime().map_err(|e| CommandError::RuntimeError(e.to_string()))?;
        rt.block_on(self.delete(config))
    }

    async fn delete(&self, config: &Config) -> Result<(), CommandError> {
        let session = open_session(config)?;
        let document = session.load(&self.id).await?;

        // Confirm unless --force
        if !self.force {
            print!("Delete scenario '{}' ({})? [y/N] ", document.meta.name, self.id);
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Deletion cancelled.");
                return Ok(());
            }
        }

        // Deleting the active scenario would initialize a fresh one.
        session.teardown();
        session.delete_scenario(&self.id).await?;
        println!("Deleted scenario: {}", document.meta.name);
        Ok(())
    }
}
