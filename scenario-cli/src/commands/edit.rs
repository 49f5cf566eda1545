use clap::Args;
use scenario_core::{ArrayFormView, MetadataOverride, Path, ScenarioSession};

use super::CommandError;
use crate::config::Config;
use crate::context::{open_session, runtime};
use crate::edits::{parse_assignment, parse_keyed, parse_keyed_assignment, Assignment};

#[derive(Args)]
pub struct EditCommand {
    /// Scenario ID
    pub id: String,

    /// Set a setting, as path=json (repeatable)
    #[arg(long = "set", value_name = "PATH=JSON")]
    pub sets: Vec<String>,

    /// Append an item to the array at path, as path=json (repeatable)
    #[arg(long = "add", value_name = "PATH=JSON")]
    pub adds: Vec<String>,

    /// Merge fields into the item with this id, as path:id=json (repeatable)
    #[arg(long = "update", value_name = "PATH:ID=JSON")]
    pub updates: Vec<String>,

    /// Remove the item with this id, as path:id (repeatable)
    #[arg(long = "remove", value_name = "PATH:ID")]
    pub removes: Vec<String>,

    /// New scenario name
    #[arg(long, short)]
    pub name: Option<String>,

    /// New scenario description
    #[arg(long, short)]
    pub description: Option<String>,
}

/// Parsed edits, grouped the way they are mounted.
struct EditPlan {
    settings: Vec<Assignment>,
    arrays: Vec<(Path, Vec<ArrayEdit>)>,
}

enum ArrayEdit {
    Add(scenario_core::Node),
    Update(String, scenario_core::Object),
    Remove(String),
}

impl EditPlan {
    fn push_array(&mut self, path: Path, edit: ArrayEdit) {
        match self.arrays.iter_mut().find(|(p, _)| *p == path) {
            Some((_, edits)) => edits.push(edit),
            None => self.arrays.push((path, vec![edit])),
        }
    }

    fn is_empty(&self) -> bool {
        self.settings.is_empty() && self.arrays.is_empty()
    }
}

impl EditCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        let plan = self.plan()?;
        if plan.is_empty() && self.name.is_none() && self.description.is_none() {
            println!("Nothing to change.");
            return Ok(());
        }

        let rt = runtime().map_err(|e| CommandError::RuntimeError(e.to_string()))?;
        rt.block_on(self.edit(config, plan))
    }

    fn plan(&self) -> Result<EditPlan, CommandError> {
        let mut plan = EditPlan {
            settings: self
                .sets
                .iter()
                .map(|s| parse_assignment(s))
                .collect::<Result<_, _>>()?,
            arrays: Vec::new(),
        };

        for text in &self.adds {
            let add = parse_assignment(text)?;
            plan.push_array(add.path, ArrayEdit::Add(add.value));
        }
        for text in &self.updates {
            let update = parse_keyed_assignment(text)?;
            let patch = update.patch()?;
            plan.push_array(update.path, ArrayEdit::Update(update.id, patch));
        }
        for text in &self.removes {
            let remove = parse_keyed(text)?;
            plan.push_array(remove.path, ArrayEdit::Remove(remove.id));
        }
        Ok(plan)
    }

    async fn edit(&self, config: &Config, plan: EditPlan) -> Result<(), CommandError> {
        let session = open_session(config)?;
        session.load(&self.id).await?;

        let settings = session.mount_form("settings", Path::root())?;
        for assignment in plan.settings {
            settings.set_field(assignment.path, assignment.value)?;
        }

        let arrays = mount_arrays(&session, plan.arrays)?;

        let mut overrides = MetadataOverride::new();
        if let Some(name) = &self.name {
            overrides = overrides.with_name(name.clone());
        }
        if let Some(description) = &self.description {
            overrides = overrides.with_description(description.clone());
        }

        let receipt = session.update(Some(overrides)).await?;

        for view in &arrays {
            if let Some(report) = view.last_report() {
                for id in &report.unmatched {
                    println!("  no item '{}' in {}", id, view.section().path());
                }
            }
        }
        println!("Updated scenario: {}", receipt.id);
        Ok(())
    }
}

fn mount_arrays(
    session: &ScenarioSession,
    arrays: Vec<(Path, Vec<ArrayEdit>)>,
) -> Result<Vec<ArrayFormView>, CommandError> {
    let mut views = Vec::with_capacity(arrays.len());
    for (path, edits) in arrays {
        let view = session.mount_array(format!("array:{}", path), path)?;
        for edit in edits {
            match edit {
                ArrayEdit::Add(item) => view.add(item),
                ArrayEdit::Update(id, patch) => view.update(id, patch),
                ArrayEdit::Remove(id) => view.remove(id),
            }
        }
        views.push(view);
    }
    Ok(views)
}
