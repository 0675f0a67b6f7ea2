use crate::{codec::GraphFormat, enrich::OverwritePolicy, resolver::DEFAULT_CAPACITY_URL};

pub const CAPACITY_URL_ENV: &str = "LNTOPO_CAPACITY_URL";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    BuildCapacities {
        input_graph: String,
        output_cache: String,
    },
    AddCapacities {
        input_graph: String,
        output_graph: String,
        capacities_file: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLineConfig {
    pub format: GraphFormat,
    pub overwrite: OverwritePolicy,
    pub quiet: bool,
    pub json: bool,
    pub capacity_url: String,
    pub command: Command,
}

impl CommandLineConfig {
    pub fn from_args(args: &[&str]) -> Result<Self, String> {
        let mut format = GraphFormat::default();
        let mut overwrite = OverwritePolicy::default();
        let mut quiet = false;
        let mut json = false;
        let mut positional = Vec::new();
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            match *arg {
                "--fmt" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| "--fmt requires a value".to_string())?;
                    format = value.parse().map_err(|e| format!("--fmt: {e}"))?;
                }
                "--yes" => overwrite = OverwritePolicy::Force,
                "--confirm" => overwrite = OverwritePolicy::Prompt,
                "--no-clobber" => overwrite = OverwritePolicy::Abort,
                "-q" | "--quiet" => quiet = true,
                "--json" => json = true,
                other if other.starts_with("--fmt=") => {
                    format = other["--fmt=".len()..]
                        .parse()
                        .map_err(|e| format!("--fmt: {e}"))?;
                }
                other if other.starts_with('-') && other.len() > 1 => {
                    return Err(format!("unknown flag {other}"));
                }
                other => positional.push(other.to_string()),
            }
        }

        let mut positional = positional.into_iter();
        let command = match positional.next().as_deref() {
            Some("build-capacities") => {
                let [input_graph, output_cache] = take_args::<2>(&mut positional, "build-capacities")?;
                Command::BuildCapacities {
                    input_graph,
                    output_cache,
                }
            }
            Some("add-capacities") => {
                let [input_graph, output_graph, capacities_file] =
                    take_args::<3>(&mut positional, "add-capacities")?;
                Command::AddCapacities {
                    input_graph,
                    output_graph,
                    capacities_file,
                }
            }
            Some(other) => return Err(format!("unknown command {other}")),
            None => return Err("missing command".to_string()),
        };
        if let Some(extra) = positional.next() {
            return Err(format!("unexpected argument {extra}"));
        }

        Ok(Self {
            format,
            overwrite,
            quiet,
            json,
            capacity_url: DEFAULT_CAPACITY_URL.to_string(),
            command,
        })
    }

    /// Applies environment overrides; `lookup` is `std::env::var` outside tests.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(CAPACITY_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.capacity_url = url;
        }
        self
    }

    pub fn help() -> &'static str {
        r#"Usage:
  lntopo build-capacities [--fmt dot|gml|graphml|json] [--yes|--confirm|--no-clobber] INPUT_GRAPH OUTPUT_CACHE
  lntopo add-capacities [--fmt dot|gml|graphml|json] INPUT_GRAPH OUTPUT_GRAPH CAPACITIES_FILE

Options:
  --fmt FORMAT     graph serialization (default: gml)
  --yes            extend a populated cache without asking (default)
  --confirm        ask before extending a populated cache
  --no-clobber     refuse to touch a populated cache
  -q, --quiet      only log warnings and errors
  --json           print the run report as JSON

Environment:
  LNTOPO_CAPACITY_URL  capacity endpoint template with a {scid} placeholder
  RUST_LOG             log filter (default: info)
"#
    }
}

fn take_args<const N: usize>(
    positional: &mut std::vec::IntoIter<String>,
    command: &str,
) -> Result<[String; N], String> {
    let values: Vec<String> = positional.by_ref().take(N).collect();
    values
        .try_into()
        .map_err(|got: Vec<String>| format!("{command} expects {N} arguments, got {}", got.len()))
}
