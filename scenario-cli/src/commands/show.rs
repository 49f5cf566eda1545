use clap::Args;
use scenario_core::{Document, Path};
use serde_json::{json, Value};

use super::{format_timestamp, CommandError, OutputFormat};
use crate::config::Config;
use crate::context::{open_session, runtime};
use crate::edits::EditError;

#[derive(Args)]
pub struct ShowCommand {
    /// Scenario ID
    pub id: String,

    /// Only show the setting at this dotted path
    #[arg(long, short)]
    pub path: Option<String>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl ShowCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        let path = match &self.path {
            Some(text) => Some(Path::parse(text).map_err(EditError::from)?),
            None => None,
        };

        let rt = runtime().map_err(|e| CommandError::RuntimeError(e.to_string()))?;
        rt.block_on(self.show(config, path))
    }

    async fn show(&self, config: &Config, path: Option<Path>) -> Result<(), CommandError> {
        let session = open_session(config)?;
        let document = session.load(&self.id).await?;

        if let Some(path) = path {
            let value = session.store().get(&path).map(Value::from);
            match self.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                OutputFormat::Text => match value {
                    Some(value) => println!("{}: {}", path, value),
                    None => println!("{}: (not set)", path),
                },
            }
            return Ok(());
        }

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&document_json(&document))?);
            }
            OutputFormat::Text => print_document(&document)?,
        }
        Ok(())
    }
}

fn document_json(document: &Document) -> Value {
    json!({
        "meta": document.meta,
        "settings": document.settings,
        "simulation": document.simulation,
    })
}

fn print_document(document: &Document) -> Result<(), serde_json::Error> {
    let meta = &document.meta;
    println!("{}", meta.name);
    println!("{}", "=".repeat(meta.name.chars().count()));
    println!();
    println!("ID:          {}", meta.id.as_deref().unwrap_or("-"));
    if !meta.description.is_empty() {
        println!("Description: {}", meta.description);
    }
    println!("Created:     {}", format_timestamp(meta.created_at));
    println!("Updated:     {}", format_timestamp(meta.updated_at));
    println!();

    println!("Settings:");
    println!("{}", serde_json::to_string_pretty(&document.settings)?);

    let has_results = document
        .simulation
        .as_object()
        .is_some_and(|sections| sections.values().any(has_entries));
    if has_results {
        println!();
        println!("Simulation:");
        println!("{}", serde_json::to_string_pretty(&document.simulation)?);
    }
    Ok(())
}

fn has_entries(section: &scenario_core::Node) -> bool {
    section.as_object().is_some_and(|entries| !entries.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_core::Node;

    #[test]
    fn test_document_json_shape() {
        let mut document = Document::new(Node::from(json!({"capex": {"total": 10}})));
        document.meta.id = Some("abc".to_string());
        document.meta.name = "North".to_string();

        let value = document_json(&document);
        assert_eq!(value["meta"]["id"], "abc");
        assert_eq!(value["meta"]["name"], "North");
        assert_eq!(value["settings"]["capex"]["total"], 10);
        assert!(value["simulation"].is_object());
    }
}
