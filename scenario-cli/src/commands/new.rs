use clap::Args;
use scenario_core::{MetadataOverride, Path};

use super::CommandError;
use crate::config::Config;
use crate::context::{open_session, runtime};
use crate::edits::{parse_assignment, Assignment};

#[derive(Args)]
pub struct NewCommand {
    /// Defaults variant to start from (default: from config)
    #[arg(long)]
    pub variant: Option<String>,

    /// Scenario name
    #[arg(long, short)]
    pub name: Option<String>,

    /// Scenario description
    #[arg(long, short)]
    pub description: Option<String>,

    /// Setting to apply before the first save, as path=json (repeatable)
    #[arg(long = "set", value_name = "PATH=JSON")]
    pub sets: Vec<String>,
}

impl NewCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        let assignments = self
            .sets
            .iter()
            .map(|s| parse_assignment(s))
            .collect::<Result<Vec<Assignment>, _>>()?;

        let rt = runtime().map_err(|e| CommandError::RuntimeError(e.to_string()))?;
        rt.block_on(self.create(config, assignments))
    }

    async fn create(
        &self,
        config: &Config,
        assignments: Vec<Assignment>,
    ) -> Result<(), CommandError> {
        let session = open_session(config)?;
        match &self.variant {
            Some(variant) => session.initialize_variant(variant).await?,
            None => session.initialize().await?,
        };

        let settings = session.mount_form("settings", Path::root())?;
        for assignment in assignments {
            settings.set_field(assignment.path, assignment.value)?;
        }

        let mut overrides = MetadataOverride::new();
        if let Some(name) = &self.name {
            overrides = overrides.with_name(name.clone());
        }
        if let Some(description) = &self.description {
            overrides = overrides.with_description(description.clone());
        }

        let receipt = session.save(Some(overrides)).await?;
        println!("Created scenario: {}", receipt.id);
        Ok(())
    }
}
