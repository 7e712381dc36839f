use crate::types::FunctionMeta;
use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Deploy the CDK app in `infra_dir`, writing its outputs to `outputs_file`
/// (relative to `infra_dir`). A non-zero exit aborts the run.
#[tracing::instrument(skip_all, fields(infra_dir = %infra_dir.display()))]
pub async fn deploy_stack(infra_dir: &Path, outputs_file: &str) -> Result<()> {
    println!("Deploying stack from {} ...", infra_dir.display());
    let output = Command::new("npx")
        .args([
            "cdk",
            "deploy",
            "--outputs-file",
            outputs_file,
            "--require-approval",
            "never",
        ])
        .current_dir(infra_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .await
        .context("Failed to launch `npx cdk deploy`")?;

    tracing::debug!(
        stdout = %String::from_utf8_lossy(&output.stdout),
        "cdk deploy finished"
    );
    if !output.status.success() {
        bail!("cdk deploy failed with {}", output.status);
    }
    println!("✓ Stack deployed");
    Ok(())
}

/// Build one record per (memory, framework) pair from a CDK outputs document.
/// Memory sizes form the outer loop, frameworks the inner one.
pub fn parse_stack_outputs(
    outputs: &Value,
    stack_name: &str,
    frameworks: &[String],
    memories: &[u32],
) -> Result<Vec<FunctionMeta>> {
    let stack = outputs
        .get(stack_name)
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("Stack '{}' not found in deployment outputs", stack_name))?;

    let mut metas = Vec::with_capacity(frameworks.len() * memories.len());
    for &memory in memories {
        for framework in frameworks {
            let url = stack
                .get(&format!("url{}{}", framework, memory))
                .and_then(Value::as_str);
            let name = stack
                .get(&format!("name{}{}", framework, memory))
                .and_then(Value::as_str);
            match (url, name) {
                (Some(url), Some(name)) if !url.is_empty() && !name.is_empty() => {
                    metas.push(FunctionMeta {
                        framework: framework.clone(),
                        memory,
                        url: url.to_string(),
                        name: name.to_string(),
                    });
                }
                _ => {
                    let keys: Vec<&str> = stack.keys().map(String::as_str).collect();
                    bail!(
                        "Missing outputs for {}@{}. Got keys: {}",
                        framework,
                        memory,
                        keys.join(", ")
                    );
                }
            }
        }
    }
    Ok(metas)
}

/// Read a CDK outputs file from disk and parse it.
pub fn read_stack_outputs(
    path: &Path,
    stack_name: &str,
    frameworks: &[String],
    memories: &[u32],
) -> Result<Vec<FunctionMeta>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read deployment outputs: {}", path.display()))?;
    let outputs: Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in deployment outputs: {}", path.display()))?;
    parse_stack_outputs(&outputs, stack_name, frameworks, memories)
}
