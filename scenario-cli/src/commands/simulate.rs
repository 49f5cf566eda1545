use clap::Args;
use std::path::PathBuf;

use scenario_core::simulation::DEFAULT_ITERATIONS;
use scenario_core::{
    DistributionSpec, PercentileSeries, RunConfig, SimulationKind, SimulationRequest,
};

use super::{CommandError, OutputFormat};
use crate::config::Config;
use crate::context::{open_session, runtime};

/// Values printed per series before eliding the rest
const PREVIEW_LEN: usize = 6;

#[derive(Args)]
pub struct SimulateCommand {
    /// Scenario ID
    pub id: String,

    /// JSON file with the distributions to sample
    #[arg(long, value_name = "FILE")]
    pub spec: PathBuf,

    /// Number of iterations
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    pub iterations: u32,

    /// Random seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Percentiles to report (default: 5,50,95)
    #[arg(long, value_delimiter = ',')]
    pub percentiles: Vec<f64>,

    /// Store results as output simulations instead of input simulations
    #[arg(long)]
    pub output: bool,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl SimulateCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        let request = self.request()?;
        let rt = runtime().map_err(|e| CommandError::RuntimeError(e.to_string()))?;
        rt.block_on(self.simulate(config, request))
    }

    fn request(&self) -> Result<SimulationRequest, CommandError> {
        let contents = std::fs::read_to_string(&self.spec)?;
        let distributions: Vec<DistributionSpec> = serde_json::from_str(&contents)?;

        let mut run = RunConfig {
            iterations: self.iterations,
            seed: self.seed,
            ..RunConfig::default()
        };
        if !self.percentiles.is_empty() {
            run.percentiles = self.percentiles.clone();
        }

        Ok(SimulationRequest {
            distributions,
            config: run,
        })
    }

    async fn simulate(
        &self,
        config: &Config,
        request: SimulationRequest,
    ) -> Result<(), CommandError> {
        let kind = if self.output {
            SimulationKind::Output
        } else {
            SimulationKind::Input
        };

        let session = open_session(config)?;
        session.load(&self.id).await?;
        let response = session.run_simulation(kind, &request).await?;
        session.update(None).await?;

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
            OutputFormat::Text => {
                println!(
                    "Simulated {} distribution{} ({} iterations)",
                    response.results.len(),
                    if response.results.len() == 1 { "" } else { "s" },
                    request.config.iterations
                );
                for (id, series) in &response.results {
                    println!();
                    println!("{}:", id);
                    print_series(series);
                }
                println!();
                println!("Saved to {} of scenario {}", kind.key(), self.id);
            }
        }
        Ok(())
    }
}

fn print_series(series: &PercentileSeries) {
    for (label, values) in &series.0 {
        println!("  {:<6} {}", label, preview(values));
    }
}

fn preview(values: &[f64]) -> String {
    let shown: Vec<String> = values
        .iter()
        .take(PREVIEW_LEN)
        .map(|v| format!("{:.2}", v))
        .collect();
    if values.len() > PREVIEW_LEN {
        format!("{} ... ({} values)", shown.join(" "), values.len())
    } else {
        shown.join(" ")
    }
}
