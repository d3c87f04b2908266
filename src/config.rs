use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

use crate::process::CommandSpec;

/// Contents of `tools/config.json`. Only the `run` task reads it.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub emulator: EmulatorConfig,
    /// Disk image handed to the emulator, relative to the project root.
    pub image: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmulatorConfig {
    pub program: String,
    /// Emulator arguments. `{{image}}` is replaced with the image path.
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("config missing required field: {0}")]
    MissingField(String),
    #[error("emulator option {0} is empty")]
    EmptyOption(usize),
}

impl RunConfig {
    pub fn emulator_command(&self) -> CommandSpec {
        let mut vars = BTreeMap::new();
        vars.insert("image", self.image.as_str());

        CommandSpec::new(&self.emulator.program).args(
            self.emulator
                .options
                .iter()
                .map(|option| replace_placeholders(option, &vars)),
        )
    }
}

pub fn load_run_config(path: &Path) -> anyhow::Result<RunConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading config at {}", path.display()))?;
    let config: RunConfig = serde_json::from_str(&data)
        .with_context(|| format!("parsing config at {}", path.display()))?;
    validate_config(config).with_context(|| format!("validating config at {}", path.display()))
}

fn validate_config(config: RunConfig) -> Result<RunConfig, ConfigValidationError> {
    if config.emulator.program.trim().is_empty() {
        return Err(ConfigValidationError::MissingField(
            "emulator.program".to_string(),
        ));
    }

    if config.image.trim().is_empty() {
        return Err(ConfigValidationError::MissingField("image".to_string()));
    }

    if let Some(idx) = config
        .emulator
        .options
        .iter()
        .position(|option| option.is_empty())
    {
        return Err(ConfigValidationError::EmptyOption(idx));
    }

    Ok(config)
}

fn replace_placeholders(template: &str, vars: &BTreeMap<&str, &str>) -> String {
    let mut result = String::new();
    let mut remainder = template;
    while let Some(start) = remainder.find("{{") {
        if let Some(end) = remainder[start + 2..].find("}}") {
            let end_index = start + 2 + end;
            result.push_str(&remainder[..start]);
            let key = &remainder[start + 2..end_index];
            match vars.get(key.trim()) {
                Some(value) => result.push_str(value),
                None => {
                    result.push_str("{{");
                    result.push_str(key);
                    result.push_str("}}");
                }
            }
            remainder = &remainder[end_index + 2..];
            continue;
        }
        break;
    }
    result.push_str(remainder);
    result
}
