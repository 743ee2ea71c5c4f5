//! Subprocess adapter for collaborators.
//!
//! The request goes to the program's stdin as one JSON document; the reply is
//! the first JSON object found on stdout, bare or inside a fenced block.

use crate::agents::{PlanReviser, ResearchEngine, Reviewer, Revision};
use crate::boardroom::{CritiqueOutcome, ReviewerRole, Vote};
use crate::pipeline::{ExploreOutput, PlanDocument, WorkItem};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

/// Request written to a collaborator's stdin.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentRequest<'a> {
    Explore {
        topic: &'a str,
        context: &'a str,
    },
    Review {
        role: ReviewerRole,
        role_name: &'static str,
        focus_areas: Vec<&'static str>,
        plan: &'a PlanDocument,
        work_item: &'a WorkItem,
    },
    Revise {
        plan: &'a PlanDocument,
        outcome: &'a CritiqueOutcome,
        work_item: &'a WorkItem,
    },
}

/// A collaborator backed by an external program.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandAgent {
    /// Build from a command line: the first element is the program.
    pub fn from_command(command: &[String], timeout: Duration) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("Agent command is empty")?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            working_dir: None,
            timeout,
        })
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Send `request` and parse the reply as `T`.
    pub async fn call<T: DeserializeOwned>(&self, request: &AgentRequest<'_>) -> Result<T> {
        let payload = serde_json::to_string(request).context("Failed to serialize agent request")?;
        let output = tokio::time::timeout(self.timeout, self.run(&payload))
            .await
            .with_context(|| {
                format!(
                    "Agent '{}' timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                )
            })??;

        let json = extract_json(&output)
            .with_context(|| format!("Agent '{}' returned no JSON object", self.program))?;
        serde_json::from_str(json)
            .with_context(|| format!("Agent '{}' returned malformed JSON", self.program))
    }

    async fn run(&self, payload: &str) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn agent '{}'", self.program))?;
        debug!(program = %self.program, bytes = payload.len(), "Agent spawned");

        // Both pipes are driven at once so neither side stalls on a full buffer.
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let write = async {
            if let Some(mut stdin) = stdin {
                stdin
                    .write_all(payload.as_bytes())
                    .await
                    .context("Failed to write request to stdin")?;
                stdin.shutdown().await.context("Failed to close stdin")?;
            }
            Ok::<_, anyhow::Error>(())
        };
        let read = async {
            let mut output = String::new();
            if let Some(mut stdout) = stdout {
                stdout
                    .read_to_string(&mut output)
                    .await
                    .context("Failed to read agent stdout")?;
            }
            Ok::<_, anyhow::Error>(output)
        };
        let (written, output) = tokio::join!(write, read);
        written?;
        let output = output?;

        let status = child.wait().await.context("Failed to wait for agent")?;
        if !status.success() {
            anyhow::bail!(
                "Agent '{}' exited with code {}",
                self.program,
                status.code().unwrap_or(-1)
            );
        }

        Ok(output)
    }
}

#[async_trait]
impl ResearchEngine for CommandAgent {
    async fn explore(&self, topic: &str, context: &str) -> Result<ExploreOutput> {
        self.call(&AgentRequest::Explore { topic, context }).await
    }
}

#[async_trait]
impl Reviewer for CommandAgent {
    async fn review(
        &self,
        role: ReviewerRole,
        plan: &PlanDocument,
        work_item: &WorkItem,
    ) -> Result<Vote> {
        self.call(&AgentRequest::Review {
            role,
            role_name: role.display_name(),
            focus_areas: role.focus_areas(),
            plan,
            work_item,
        })
        .await
    }
}

#[async_trait]
impl PlanReviser for CommandAgent {
    async fn revise(
        &self,
        plan: &PlanDocument,
        outcome: &CritiqueOutcome,
        work_item: &WorkItem,
    ) -> Result<Revision> {
        self.call(&AgentRequest::Revise {
            plan,
            outcome,
            work_item,
        })
        .await
    }
}

/// Locate the JSON object in free-form output.
///
/// Prefers a ```json fenced block, then the first balanced `{...}` span.
/// Braces inside string literals do not count toward the balance.
pub fn extract_json(output: &str) -> Option<&str> {
    if let Some(start) = output.find("```json") {
        let after = &output[start + 7..];
        if let Some(end) = after.find("```") {
            return Some(after[..end].trim());
        }
    }

    let start = output.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in output[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&output[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boardroom::Verdict;

    #[test]
    fn test_extract_json_code_block() {
        let output = "Here is my vote:\n```json\n{\"verdict\": \"approve\"}\n```\n";
        assert_eq!(extract_json(output), Some("{\"verdict\": \"approve\"}"));
    }

    #[test]
    fn test_extract_json_raw_with_braces_in_strings() {
        let output = r#"noise {"rationale": "uses } and {", "n": {"x": 1}} trailing"#;
        assert_eq!(
            extract_json(output),
            Some(r#"{"rationale": "uses } and {", "n": {"x": 1}}"#)
        );
    }

    #[test]
    fn test_extract_json_none() {
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("{ unterminated").is_none());
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandAgent::from_command(&[], Duration::from_secs(1)).is_err());
    }

    #[test]
    fn review_request_carries_role_context() {
        let plan = PlanDocument {
            objectives: vec![],
            constraints: vec![],
            scope: vec![],
            sizing: Default::default(),
        };
        let item = WorkItem::new("WI-1", "Item");
        let request = AgentRequest::Review {
            role: ReviewerRole::SecuritySentinel,
            role_name: ReviewerRole::SecuritySentinel.display_name(),
            focus_areas: ReviewerRole::SecuritySentinel.focus_areas(),
            plan: &plan,
            work_item: &item,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["kind"], "review");
        assert_eq!(json["role"], "security_sentinel");
        assert_eq!(json["work_item"]["id"], "WI-1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_agent_reads_vote_from_stdout() {
        let script = r#"cat > /dev/null; echo 'Vote follows'; echo '{"role":"devils_advocate","verdict":"block","rationale":"too big"}'"#;
        let agent = CommandAgent::from_command(
            &["sh".to_string(), "-c".to_string(), script.to_string()],
            Duration::from_secs(10),
        )
        .unwrap();
        let plan = PlanDocument {
            objectives: vec![],
            constraints: vec![],
            scope: vec![],
            sizing: Default::default(),
        };
        let vote = agent
            .review(ReviewerRole::DevilsAdvocate, &plan, &WorkItem::new("WI-1", "x"))
            .await
            .unwrap();
        assert_eq!(vote.verdict, Verdict::Block);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn large_request_and_early_output_do_not_stall() {
        let script = r#"head -c 200000 /dev/zero | tr '\0' 'x'; echo
cat > /dev/null
echo '{"approaches":[],"recommendation":{"name":"tokens","summary":"Signed tokens"}}'"#;
        let agent = CommandAgent::from_command(
            &["sh".to_string(), "-c".to_string(), script.to_string()],
            Duration::from_secs(10),
        )
        .unwrap();
        let context = "c".repeat(1 << 20);
        let explore = agent.explore("topic", &context).await.unwrap();
        assert_eq!(explore.recommendation.name, "tokens");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_agent_times_out() {
        let agent = CommandAgent::from_command(
            &["sh".to_string(), "-c".to_string(), "sleep 5".to_string()],
            Duration::from_millis(100),
        )
        .unwrap();
        let err = agent.explore("topic", "").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_is_an_error() {
        let agent = CommandAgent::from_command(
            &["sh".to_string(), "-c".to_string(), "cat > /dev/null; exit 3".to_string()],
            Duration::from_secs(10),
        )
        .unwrap();
        let err = agent.explore("topic", "").await.unwrap_err();
        assert!(err.to_string().contains("code 3"));
    }
}
