use crate::types::RetryPolicy;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_sdk_lambda::error::ProvideErrorMetadata;
use aws_sdk_lambda::types::{Environment, LastUpdateStatus};
use aws_sdk_lambda::Client as LambdaClient;
use std::collections::HashMap;

/// Environment variable bumped on every forced cold start.
pub const VERSION_VARIABLE: &str = "VERSION";

/// Platform view of the most recent configuration update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    InProgress,
    Successful,
    Failed(String),
    Unknown,
}

/// The slice of the function configuration API the forcer needs.
#[async_trait]
pub trait FunctionControl: Send + Sync {
    /// Set (or overwrite) the given environment variables on a function.
    async fn set_environment(&self, function_name: &str, vars: &[(String, String)])
        -> Result<()>;

    /// Status of the last configuration update.
    async fn update_status(&self, function_name: &str) -> Result<UpdateStatus>;
}

fn describe_sdk_error<E, R>(err: aws_sdk_lambda::error::SdkError<E, R>) -> String
where
    E: ProvideErrorMetadata + std::error::Error,
    R: std::fmt::Debug,
{
    match err {
        aws_sdk_lambda::error::SdkError::ServiceError(context) => format!(
            "Service error: {} ({})",
            context.err().message().unwrap_or_default(),
            context.err().code().unwrap_or_default()
        ),
        other_err => format!("SDK error: {}", other_err),
    }
}

#[async_trait]
impl FunctionControl for LambdaClient {
    async fn set_environment(
        &self,
        function_name: &str,
        vars: &[(String, String)],
    ) -> Result<()> {
        let current = self
            .get_function_configuration()
            .function_name(function_name)
            .send()
            .await
            .map_err(|err| {
                anyhow!(
                    "Failed to get configuration for '{}': {}",
                    function_name,
                    describe_sdk_error(err)
                )
            })?;

        // Merge so variables the handler relies on survive.
        let mut env_vars: HashMap<String, String> = current
            .environment()
            .and_then(|e| e.variables())
            .cloned()
            .unwrap_or_default();
        for (key, value) in vars {
            env_vars.insert(key.clone(), value.clone());
        }

        self.update_function_configuration()
            .function_name(function_name)
            .environment(Environment::builder().set_variables(Some(env_vars)).build())
            .send()
            .await
            .map_err(|err| {
                anyhow!(
                    "Failed to update function configuration for '{}': {}",
                    function_name,
                    describe_sdk_error(err)
                )
            })?;
        Ok(())
    }

    async fn update_status(&self, function_name: &str) -> Result<UpdateStatus> {
        let config = self
            .get_function_configuration()
            .function_name(function_name)
            .send()
            .await
            .map_err(|err| {
                anyhow!(
                    "Failed to get configuration for '{}': {}",
                    function_name,
                    describe_sdk_error(err)
                )
            })?;

        Ok(match config.last_update_status() {
            Some(LastUpdateStatus::Successful) => UpdateStatus::Successful,
            Some(LastUpdateStatus::InProgress) => UpdateStatus::InProgress,
            Some(LastUpdateStatus::Failed) => UpdateStatus::Failed(
                config
                    .last_update_status_reason()
                    .unwrap_or("no reason given")
                    .to_string(),
            ),
            _ => UpdateStatus::Unknown,
        })
    }
}

/// Invalidate any warm execution environment of `function_name` and wait for
/// the platform to apply the change.
///
/// Returns `true` once the update is confirmed. Running out of attempts, or a
/// failed status, is tolerated and returns `false`; the next invocation then
/// measures whatever state the function is in.
#[tracing::instrument(skip(control, policy))]
pub async fn force_cold_start(
    control: &dyn FunctionControl,
    function_name: &str,
    policy: RetryPolicy,
) -> Result<bool> {
    let version_tag = chrono::Utc::now().timestamp_millis().to_string();
    control
        .set_environment(
            function_name,
            &[(VERSION_VARIABLE.to_string(), version_tag.clone())],
        )
        .await?;
    tracing::debug!(%version_tag, "configuration update submitted");

    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.delay).await;
        match control.update_status(function_name).await {
            Ok(UpdateStatus::Successful) => {
                tracing::debug!(attempt, "configuration update applied");
                return Ok(true);
            }
            Ok(UpdateStatus::Failed(reason)) => {
                tracing::warn!(%reason, "configuration update failed, continuing anyway");
                return Ok(false);
            }
            Ok(status) => {
                tracing::trace!(attempt, ?status, "waiting for configuration update");
            }
            Err(e) => {
                tracing::debug!(attempt, error = %e, "status check failed, retrying");
            }
        }
    }

    tracing::warn!(
        attempts = policy.max_attempts,
        "configuration update not confirmed, continuing anyway"
    );
    Ok(false)
}
