//! Command-line arguments.

use serde_json::{json, Value};

pub const USAGE: &str = "usage:
  optiboard                                   list projects and server info
  optiboard profile <project_id> [name] [batch_size] [core_count]
                                              run a performance profile
  optiboard optim <project_id> [name] [training_epochs]
                                              save training epochs, then
                                              create an optimization
  optiboard modifier <project_id> <optim_id> <modifier_id> <settings_json>
                                              change a modifier's pruning settings
  optiboard delete <project_id>               delete a project";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Overview,
    Profile {
        project_id: String,
        name: Option<String>,
        batch_size: u32,
        core_count: Option<u32>,
    },
    Optim {
        project_id: String,
        name: Option<String>,
        training_epochs: Option<u32>,
    },
    Modifier {
        project_id: String,
        optim_id: String,
        modifier_id: String,
        settings: Value,
    },
    Delete {
        project_id: String,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("{message}\n\n{usage}", usage = USAGE)]
pub struct UsageError {
    message: String,
}

fn usage(message: impl Into<String>) -> UsageError {
    UsageError {
        message: message.into(),
    }
}

impl Command {
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, UsageError> {
        let mut args = args.into_iter();
        let Some(command) = args.next() else {
            return Ok(Command::Overview);
        };

        match command.as_str() {
            "profile" => {
                let project_id = args.next().ok_or_else(|| usage("missing project_id"))?;
                let name = args.next();
                let batch_size = match args.next() {
                    Some(raw) => parse_count(&raw, "batch_size")?,
                    None => 1,
                };
                let core_count = args
                    .next()
                    .map(|raw| parse_count(&raw, "core_count"))
                    .transpose()?;
                Ok(Command::Profile {
                    project_id,
                    name,
                    batch_size,
                    core_count,
                })
            }
            "optim" => {
                let project_id = args.next().ok_or_else(|| usage("missing project_id"))?;
                let name = args.next();
                let training_epochs = args
                    .next()
                    .map(|raw| parse_count(&raw, "training_epochs"))
                    .transpose()?;
                Ok(Command::Optim {
                    project_id,
                    name,
                    training_epochs,
                })
            }
            "modifier" => {
                let mut next = |what: &str| {
                    args.next()
                        .ok_or_else(|| usage(format!("missing {what}")))
                };
                let project_id = next("project_id")?;
                let optim_id = next("optim_id")?;
                let modifier_id = next("modifier_id")?;
                let raw = next("settings_json")?;
                let settings: Value = serde_json::from_str(&raw)
                    .map_err(|e| usage(format!("settings_json is not valid JSON: {e}")))?;
                Ok(Command::Modifier {
                    project_id,
                    optim_id,
                    modifier_id,
                    settings,
                })
            }
            "delete" => {
                let project_id = args.next().ok_or_else(|| usage("missing project_id"))?;
                Ok(Command::Delete { project_id })
            }
            other => Err(usage(format!("unknown command '{other}'"))),
        }
    }

    /// Start parameters for the slice this command drives.
    pub fn params(&self) -> Value {
        match self {
            Command::Overview => Value::Null,
            Command::Profile {
                project_id,
                name,
                batch_size,
                core_count,
            } => json!({
                "project_id": project_id,
                "name": name,
                "batch_size": batch_size,
                "core_count": core_count,
            }),
            Command::Optim {
                project_id, name, ..
            } => json!({
                "project_id": project_id,
                "name": name,
                "add_pruning": true,
            }),
            Command::Modifier {
                project_id,
                optim_id,
                modifier_id,
                settings,
            } => json!({
                "project_id": project_id,
                "optim_id": optim_id,
                "modifier_id": modifier_id,
                "settings": settings,
            }),
            Command::Delete { project_id } => json!({ "project_id": project_id }),
        }
    }

    /// Project settings to save before the command's job starts, if any.
    pub fn project_update(&self) -> Option<Value> {
        match self {
            Command::Optim {
                project_id,
                training_epochs: Some(epochs),
                ..
            } => Some(json!({
                "project_id": project_id,
                "training_epochs": epochs,
            })),
            _ => None,
        }
    }
}

fn parse_count(raw: &str, what: &str) -> Result<u32, UsageError> {
    raw.parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| usage(format!("{what} must be a positive integer, got '{raw}'")))
}
