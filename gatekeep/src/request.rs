//! Building a request context from command-line input.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use clap::Args;
use gatekeep_policy::{AttributeMap, AttributeProvider, RequestContext, Value};

#[derive(Args, Debug, Clone, Default)]
pub struct RequestArgs {
    /// Plain request value, e.g. `--set action=read`
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_key_val)]
    pub sets: Vec<(String, String)>,

    /// Attribute of a structured value, e.g. `--attr subject.role=admin`;
    /// `--attr subject.groups[]=ops` appends to a list
    #[arg(long = "attr", value_name = "NAME.KEY=VALUE", value_parser = parse_key_val)]
    pub attrs: Vec<(String, String)>,

    /// Whole request as a JSON object; `--set`/`--attr` entries are applied on top
    #[arg(long, value_name = "JSON")]
    pub request: Option<String>,
}

fn parse_key_val(s: &str) -> Result<(String, String)> {
    let Some((key, value)) = s.split_once('=') else {
        bail!("expected NAME=VALUE, got '{s}'");
    };
    if key.is_empty() {
        bail!("empty name in '{s}'");
    }
    Ok((key.to_string(), value.to_string()))
}

impl RequestArgs {
    /// Build the request context.
    ///
    /// `--request` is read first. `--attr name.key=value` extends the structured
    /// value `name`, starting from the `--request` member of that name when
    /// there is one (a plain string there becomes its canonical name).
    /// `--set` replaces plain values and renames structured ones.
    pub fn to_context(&self) -> Result<RequestContext> {
        let request = match self.request {
            Some(ref json) => {
                let value: serde_json::Value =
                    serde_json::from_str(json).context("--request is not valid JSON")?;
                match value {
                    serde_json::Value::Object(members) => members,
                    _ => bail!("--request must be a JSON object"),
                }
            }
            None => serde_json::Map::new(),
        };

        let mut ctx = RequestContext::new();
        for (name, value) in &request {
            ctx.insert(name, value);
        }

        let mut structured: BTreeMap<String, AttributeMap> = BTreeMap::new();
        for (path, value) in &self.attrs {
            let Some((name, key)) = path.split_once('.') else {
                bail!("attribute '{path}' must look like NAME.KEY");
            };
            let name = name.to_lowercase();
            let map = structured
                .entry(name.clone())
                .or_insert_with(|| seed(&request, &name));
            match key.strip_suffix("[]") {
                Some(list_key) => match map
                    .attributes
                    .entry(list_key.to_string())
                    .or_insert_with(|| Value::List(vec![]))
                {
                    Value::List(items) => items.push(value.clone()),
                    _ => bail!("attribute '{name}.{list_key}' is both a value and a list"),
                },
                None => {
                    map.attributes.insert(key.to_string(), Value::Str(value.clone()));
                }
            }
        }

        for (name, value) in &self.sets {
            match structured.get_mut(&name.to_lowercase()) {
                Some(map) => map.name = value.clone(),
                None => ctx.insert(name, value.as_str()),
            }
        }

        for (name, map) in structured {
            ctx.insert(&name, AttributeProvider::from(map));
        }

        Ok(ctx)
    }
}

/// Starting point for `--attr name.*` flags: the `--request` member `name`.
fn seed(request: &serde_json::Map<String, serde_json::Value>, name: &str) -> AttributeMap {
    let member = request
        .iter()
        .find(|(key, _)| key.to_lowercase() == name)
        .map(|(_, value)| value);
    match member {
        Some(serde_json::Value::Object(members)) => AttributeMap::from_json_object(members),
        Some(other) => AttributeMap::new(Value::from(other).to_match_string()),
        None => AttributeMap::default(),
    }
}
