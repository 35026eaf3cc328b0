//! Declarative request commands.
//!
//! `requests.json` holds an array of entries, each naming a command path
//! and the request to fire. At startup the catalog is merged into one
//! command tree per root word and registered as async leaf commands.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::command::{AsyncHandler, Command, CommandBuilder, Invocation, Registry};
use crate::error::{ShellError, StoreError};
use crate::repl::Shell;
use crate::token;

use super::{CompletedResponse, RequestDraft};

/// One entry in `requests.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    /// Space-separated command path, e.g. `"get users"`.
    pub cmd: String,
    pub url: String,
    pub http_method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// `key=` parameter names offered in suggestions.
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub desc: String,
}

/// Load the catalog; a missing file is an empty catalog.
pub fn load(path: &Path) -> Result<Vec<RequestSpec>, StoreError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::Read(e)),
    };
    let specs: Vec<RequestSpec> = serde_json::from_str(&raw)?;
    debug!(path = %path.display(), count = specs.len(), "loaded request catalog");
    Ok(specs)
}

/// Merge the catalog into the registry, one root command per first path
/// word, shared intermediate group nodes, async leaves.
pub fn register(registry: &mut Registry, specs: Vec<RequestSpec>) {
    let mut roots: BTreeMap<String, TreeNode> = BTreeMap::new();
    for spec in specs {
        let path: Vec<String> = spec.cmd.split_whitespace().map(str::to_string).collect();
        let Some((first, rest)) = path.split_first() else {
            continue;
        };
        roots.entry(first.clone()).or_default().insert(rest, spec);
    }
    for (name, node) in roots {
        registry.register(node.into_builder(&name));
    }
}

#[derive(Default)]
struct TreeNode {
    children: BTreeMap<String, TreeNode>,
    spec: Option<RequestSpec>,
}

impl TreeNode {
    fn insert(&mut self, path: &[String], spec: RequestSpec) {
        match path.split_first() {
            None => self.spec = Some(spec),
            Some((first, rest)) => {
                self.children.entry(first.clone()).or_default().insert(rest, spec);
            }
        }
    }

    fn into_builder(self, name: &str) -> CommandBuilder {
        let mut builder = CommandBuilder::new(name);
        if let Some(spec) = self.spec {
            let desc = if spec.desc.is_empty() {
                format!("{} {}", spec.http_method.to_uppercase(), spec.url)
            } else {
                spec.desc.clone()
            };
            let params: Vec<&str> = spec.params.iter().map(String::as_str).collect();
            builder = builder
                .desc(desc)
                .params(&params)
                .run_async(RequestCommand { spec });
        }
        for (child_name, child) in self.children {
            builder = builder.sub(child.into_builder(&child_name));
        }
        builder
    }
}

/// Async body for one catalog entry: draft, expand, send, report through
/// the invocation's task.
struct RequestCommand {
    spec: RequestSpec,
}

impl RequestCommand {
    fn wants_body(&self) -> bool {
        matches!(
            self.spec.http_method.to_uppercase().as_str(),
            "POST" | "PUT" | "PATCH"
        )
    }

    async fn send(&self, inv: &Invocation, shell: &Shell) -> Result<CompletedResponse, ShellError> {
        let mut draft = RequestDraft::default();
        draft.set_url(&self.spec.url);
        draft.set_method(&self.spec.http_method);
        for (name, value) in &self.spec.headers {
            draft.set_header(name, value);
        }

        // key=value arguments become the JSON payload for body methods,
        // query parameters otherwise.
        let args = token::key_vals(&inv.args)?;
        if self.wants_body() && !args.is_empty() {
            draft.payload = Some(serde_json::to_value(&args)?);
        } else {
            for (key, value) in args {
                draft.set_query(key, value);
            }
        }

        let prepared = draft.finalize(shell.envs())?;
        Ok(shell.requests().build_and_send(prepared).await?)
    }
}

#[async_trait]
impl AsyncHandler for RequestCommand {
    async fn execute(&self, _cmd: Arc<Command>, inv: Invocation, shell: Arc<Shell>) {
        let task = inv.task();
        task.update_message(format!(
            "{} {}",
            self.spec.http_method.to_uppercase(),
            self.spec.url
        ));

        match self.send(&inv, &shell).await {
            Ok(resp) if resp.is_success() => {
                task.complete_with_message(resp.summary(), Some(resp.body));
            }
            Ok(resp) => {
                // Keep the body around for inspection even on HTTP errors.
                task.set_result(resp.body.clone());
                task.fail(resp.summary());
            }
            Err(e) => task.fail(e),
        }
    }
}
