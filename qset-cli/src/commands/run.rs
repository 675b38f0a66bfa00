use crate::workspace::Workspace;
use anyhow::{anyhow, Result};
use clap::Args;
use qset_core::RunResults;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

#[derive(Args)]
pub struct RunArgs {
    /// Set name
    pub name: String,

    /// Parameter binding, repeatable
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Only print the results of this stage
    #[arg(short, long)]
    pub stage: Option<String>,

    /// Print compact JSON
    #[arg(long)]
    pub compact: bool,
}

/// Parse a `key=value` pair. The value may itself contain `=`.
pub fn parse_param(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got {:?}", s))?;
    if key.is_empty() {
        return Err(anyhow!("parameter name must not be empty in {:?}", s));
    }
    Ok((key.to_string(), value.to_string()))
}

pub fn execute_run_command(workspace: &Workspace, args: RunArgs) -> Result<()> {
    let engine = workspace.engine()?;
    let params: HashMap<String, String> = args.params.into_iter().collect();

    let results = engine.run(&args.name, &params)?;
    let output = render(&results, args.stage.as_deref())?;

    if args.compact {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(())
}

fn render(results: &RunResults, stage: Option<&str>) -> Result<JsonValue> {
    let docs = |name: &str| -> Option<JsonValue> {
        results
            .get(name)
            .map(|docs| JsonValue::Array(docs.iter().map(|d| d.to_json_value()).collect()))
    };

    match stage {
        Some(name) => docs(name).ok_or_else(|| anyhow!("stage {:?} returned no results", name)),
        None => {
            let mut out = Map::new();
            for name in results.keys() {
                if let Some(value) = docs(name) {
                    out.insert(name.clone(), value);
                }
            }
            Ok(JsonValue::Object(out))
        }
    }
}
