use crate::types::RetryPolicy;
use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::Client as CwlClient;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Filter pattern sent to the log service.
pub const INIT_DURATION_FILTER: &str = "Init Duration";

#[derive(Debug, Error)]
pub enum LogQueryError {
    /// The log group does not exist yet; it is created on first invocation.
    #[error("log group '{0}' not found")]
    GroupNotFound(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Filtered log lookup, oldest line first.
#[async_trait]
pub trait LogQuery: Send + Sync {
    async fn filter_events(
        &self,
        log_group: &str,
        start_time_ms: i64,
        filter_pattern: &str,
    ) -> Result<Vec<String>, LogQueryError>;
}

#[async_trait]
impl LogQuery for CwlClient {
    async fn filter_events(
        &self,
        log_group: &str,
        start_time_ms: i64,
        filter_pattern: &str,
    ) -> Result<Vec<String>, LogQueryError> {
        let mut messages = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let request = self
                .filter_log_events()
                .log_group_name(log_group)
                .start_time(start_time_ms)
                .filter_pattern(filter_pattern)
                .set_next_token(next_token.take());

            match request.send().await {
                Ok(output) => {
                    if let Some(events) = output.events {
                        messages.extend(events.into_iter().filter_map(|event| event.message));
                    }
                    match output.next_token {
                        Some(token) => {
                            tracing::trace!(%log_group, "more log events, following next token");
                            next_token = Some(token);
                        }
                        None => break,
                    }
                }
                Err(err) => {
                    if err
                        .as_service_error()
                        .is_some_and(|e| e.is_resource_not_found_exception())
                    {
                        return Err(LogQueryError::GroupNotFound(log_group.to_string()));
                    }
                    return Err(LogQueryError::Other(anyhow::Error::new(err).context(
                        format!("Failed to filter log events for {}", log_group),
                    )));
                }
            }
        }

        Ok(messages)
    }
}

fn init_duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Init Duration: ([\d.]+) ms").expect("init duration pattern is valid")
    })
}

/// Extract the `Init Duration` value from a platform REPORT line.
pub fn parse_init_duration(line: &str) -> Option<f64> {
    init_duration_regex()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

pub fn log_group_for(function_name: &str) -> String {
    format!("/aws/lambda/{}", function_name)
}

/// Time range searched for the REPORT line of one cold start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogWindow {
    /// Upper limit on how far back the query reaches.
    pub lookback: Duration,
    /// Epoch millis before which lines belong to an earlier invocation.
    pub not_before_ms: Option<i64>,
}

impl LogWindow {
    pub fn start_ms(&self, now_ms: i64) -> i64 {
        let floor = now_ms - self.lookback.as_millis() as i64;
        self.not_before_ms.map_or(floor, |nb| nb.max(floor))
    }
}

/// Poll the function's log group for the most recent `Init Duration` that
/// has not been reported before.
///
/// Lines in `consumed` are skipped and the matched line is added to it, so a
/// REPORT line from an earlier cold start is never counted twice. Returns
/// `Ok(None)` when the budget runs out. A missing log group counts as
/// "not yet" and is retried; any other query error is returned.
#[tracing::instrument(skip(logs, window, consumed, policy))]
pub async fn get_init_duration(
    logs: &dyn LogQuery,
    function_name: &str,
    window: LogWindow,
    consumed: &mut HashSet<String>,
    policy: RetryPolicy,
) -> Result<Option<f64>, LogQueryError> {
    let group = log_group_for(function_name);
    let since = window.start_ms(chrono::Utc::now().timestamp_millis());

    for attempt in 1..=policy.max_attempts {
        match logs
            .filter_events(&group, since, INIT_DURATION_FILTER)
            .await
        {
            Ok(lines) => {
                let fresh = lines
                    .into_iter()
                    .rev()
                    .filter(|l| !consumed.contains(l))
                    .find_map(|l| parse_init_duration(&l).map(|init| (l, init)));
                if let Some((line, init)) = fresh {
                    tracing::debug!(attempt, init, "found init duration");
                    consumed.insert(line);
                    return Ok(Some(init));
                }
                tracing::trace!(attempt, "no new init duration yet");
            }
            Err(LogQueryError::GroupNotFound(_)) => {
                tracing::trace!(attempt, %group, "log group not created yet");
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(policy.delay).await;
    }

    tracing::warn!(%group, attempts = policy.max_attempts, "init duration unavailable");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_parse_init_duration_report_line() {
        let line = "REPORT RequestId: 0b2c Duration: 12.3 ms Billed Duration: 13 ms Memory Size: 512 MB Max Memory Used: 80 MB Init Duration: 123.45 ms";
        assert_eq!(parse_init_duration(line), Some(123.45));
    }

    #[test]
    fn test_parse_init_duration_is_case_insensitive() {
        assert_eq!(parse_init_duration("init duration: 7 MS"), Some(7.0));
    }

    #[test]
    fn test_parse_init_duration_no_match() {
        assert_eq!(
            parse_init_duration("REPORT RequestId: 0b2c Duration: 12.3 ms"),
            None
        );
        assert_eq!(parse_init_duration(""), None);
        assert_eq!(parse_init_duration("Init Duration: ... ms"), None);
    }

    #[test]
    fn test_log_group_for() {
        assert_eq!(log_group_for("my-fn"), "/aws/lambda/my-fn");
    }

    fn lookback() -> LogWindow {
        LogWindow {
            lookback: Duration::from_secs(300),
            not_before_ms: None,
        }
    }

    #[test]
    fn test_log_window_start() {
        let now = 1_000_000;
        assert_eq!(lookback().start_ms(now), 700_000);

        let after_trigger = LogWindow {
            not_before_ms: Some(990_000),
            ..lookback()
        };
        assert_eq!(after_trigger.start_ms(now), 990_000);

        let stale_trigger = LogWindow {
            not_before_ms: Some(1),
            ..lookback()
        };
        assert_eq!(stale_trigger.start_ms(now), 700_000);
    }

    enum Reply {
        NotFound,
        Lines(Vec<&'static str>),
        Fail,
    }

    struct ScriptedLogs {
        replies: Mutex<Vec<Reply>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedLogs {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LogQuery for ScriptedLogs {
        async fn filter_events(
            &self,
            log_group: &str,
            _start_time_ms: i64,
            filter_pattern: &str,
        ) -> Result<Vec<String>, LogQueryError> {
            self.calls
                .lock()
                .unwrap()
                .push((log_group.to_string(), filter_pattern.to_string()));
            let mut replies = self.replies.lock().unwrap();
            let reply = if replies.is_empty() {
                Reply::Lines(vec![])
            } else {
                replies.remove(0)
            };
            match reply {
                Reply::NotFound => Err(LogQueryError::GroupNotFound(log_group.to_string())),
                Reply::Lines(lines) => Ok(lines.into_iter().map(String::from).collect()),
                Reply::Fail => Err(LogQueryError::Other(anyhow::anyhow!("throttled"))),
            }
        }
    }

    #[tokio::test]
    async fn test_get_init_duration_retries_not_found() {
        let logs = ScriptedLogs::new(vec![
            Reply::NotFound,
            Reply::Lines(vec!["REPORT Init Duration: 250.5 ms"]),
        ]);
        let init = get_init_duration(
            &logs,
            "fn-a",
            lookback(),
            &mut HashSet::new(),
            RetryPolicy::immediate(5),
        )
        .await
        .unwrap();

        assert_eq!(init, Some(250.5));
        assert_eq!(logs.call_count(), 2);
        let calls = logs.calls.lock().unwrap();
        assert_eq!(calls[0].0, "/aws/lambda/fn-a");
        assert_eq!(calls[0].1, INIT_DURATION_FILTER);
    }

    #[tokio::test]
    async fn test_get_init_duration_prefers_latest_line() {
        let logs = ScriptedLogs::new(vec![Reply::Lines(vec![
            "REPORT Init Duration: 100 ms",
            "REPORT Init Duration: 200 ms",
            "garbage",
        ])]);
        let init = get_init_duration(
            &logs,
            "fn-a",
            lookback(),
            &mut HashSet::new(),
            RetryPolicy::immediate(1),
        )
        .await
        .unwrap();
        assert_eq!(init, Some(200.0));
    }

    #[tokio::test]
    async fn test_get_init_duration_exhausted_budget() {
        let logs = ScriptedLogs::new(vec![Reply::NotFound, Reply::Lines(vec![])]);
        let init = get_init_duration(
            &logs,
            "fn-a",
            lookback(),
            &mut HashSet::new(),
            RetryPolicy::immediate(3),
        )
        .await
        .unwrap();

        assert_eq!(init, None);
        assert_eq!(logs.call_count(), 3);
    }

    #[tokio::test]
    async fn test_get_init_duration_other_error_propagates() {
        let logs = ScriptedLogs::new(vec![Reply::Fail]);
        let result = get_init_duration(
            &logs,
            "fn-a",
            lookback(),
            &mut HashSet::new(),
            RetryPolicy::immediate(3),
        )
        .await;

        assert!(matches!(result, Err(LogQueryError::Other(_))));
        assert_eq!(logs.call_count(), 1);
    }

    #[tokio::test]
    async fn test_get_init_duration_skips_consumed_lines() {
        let first = "REPORT RequestId: r1 Init Duration: 100 ms";
        let second = "REPORT RequestId: r2 Init Duration: 999 ms";
        let logs = ScriptedLogs::new(vec![
            Reply::Lines(vec![first]),
            // Second cold start: its line is not ingested yet on the first query.
            Reply::Lines(vec![first]),
            Reply::Lines(vec![first, second]),
        ]);
        let mut consumed = HashSet::new();

        let run1 = get_init_duration(
            &logs,
            "fn-a",
            lookback(),
            &mut consumed,
            RetryPolicy::immediate(3),
        )
        .await
        .unwrap();
        let run2 = get_init_duration(
            &logs,
            "fn-a",
            lookback(),
            &mut consumed,
            RetryPolicy::immediate(3),
        )
        .await
        .unwrap();

        assert_eq!(run1, Some(100.0));
        assert_eq!(run2, Some(999.0));
        assert_eq!(logs.call_count(), 3);
        assert!(consumed.contains(second));
    }

    #[tokio::test]
    async fn test_get_init_duration_only_stale_lines_is_unavailable() {
        let stale = "REPORT RequestId: r1 Init Duration: 100 ms";
        let logs = ScriptedLogs::new(vec![
            Reply::Lines(vec![stale]),
            Reply::Lines(vec![stale]),
        ]);
        let mut consumed = HashSet::from([stale.to_string()]);

        let init = get_init_duration(
            &logs,
            "fn-a",
            lookback(),
            &mut consumed,
            RetryPolicy::immediate(2),
        )
        .await
        .unwrap();
        assert_eq!(init, None);
    }
}
