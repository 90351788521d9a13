//! Decision backend that shells out to `codex exec --output-schema`.
//!
//! Each decision writes the model schema and the rendered frame to a scratch
//! directory, feeds the flattened transcript on stdin, and reads the final
//! message back as the tool arguments.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::state::Usage;
use crate::io::decider::{DecisionClient, DecisionRequest, DecisionResponse};
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::PromptBuilder;

/// Scratch file locations for one decision.
#[derive(Debug, Clone)]
pub struct CodexPaths {
    pub dir: PathBuf,
    pub schema_path: PathBuf,
    pub image_path: PathBuf,
    pub output_path: PathBuf,
    pub log_path: PathBuf,
}

impl CodexPaths {
    pub fn new(work_dir: &Path, game_id: &str, turn: u32) -> Self {
        let dir = work_dir.join(game_id).join(turn.to_string());
        Self {
            schema_path: dir.join("schema.json"),
            image_path: dir.join("frame.png"),
            output_path: dir.join("decision.json"),
            log_path: dir.join("codex.log"),
            dir,
        }
    }
}

/// Process-based decision client.
pub struct CodexDecisionClient {
    program: String,
    model: String,
    reasoning_effort: Option<String>,
    work_dir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
    prompts: PromptBuilder,
}

impl CodexDecisionClient {
    pub fn new(
        model: &str,
        reasoning_effort: Option<String>,
        work_dir: PathBuf,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<Self> {
        // The child runs inside the per-turn directory, so every path handed to it is absolute.
        let work_dir = std::path::absolute(&work_dir)
            .with_context(|| format!("resolve codex work dir {}", work_dir.display()))?;
        Ok(Self {
            program: "codex".to_string(),
            model: model.to_string(),
            reasoning_effort,
            work_dir,
            timeout,
            output_limit_bytes,
            prompts: PromptBuilder::new()?,
        })
    }

    /// Use a different executable in place of `codex`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, paths: &CodexPaths, with_image: bool) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("exec").arg("--model").arg(&self.model);
        if let Some(effort) = &self.reasoning_effort {
            cmd.arg("-c")
                .arg(format!("model_reasoning_effort={effort}"));
        }
        cmd.arg("--sandbox")
            .arg("read-only")
            .arg("--skip-git-repo-check")
            .arg("--output-schema")
            .arg(&paths.schema_path)
            .arg("--output-last-message")
            .arg(&paths.output_path);
        if with_image {
            cmd.arg("--image").arg(&paths.image_path);
        }
        cmd.arg("-").current_dir(&paths.dir);
        // Ctrl-C is for the interrupt watcher; the in-flight decision must finish.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }
}

impl DecisionClient for CodexDecisionClient {
    #[instrument(
        skip_all,
        fields(
            game_id = request.game_id,
            turn = request.turn,
            timeout_secs = self.timeout.as_secs()
        )
    )]
    fn decide(&self, request: &DecisionRequest<'_>) -> Result<DecisionResponse> {
        let paths = CodexPaths::new(&self.work_dir, request.game_id, request.turn);
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create codex work dir {}", paths.dir.display()))?;
        write_json(&paths.schema_path, &request.schema.model_schema())?;
        if paths.output_path.exists() {
            fs::remove_file(&paths.output_path)
                .with_context(|| format!("remove stale {}", paths.output_path.display()))?;
        }
        let with_image = match &request.prompt.image {
            Some(image) => {
                fs::write(&paths.image_path, &image.png)
                    .with_context(|| format!("write {}", paths.image_path.display()))?;
                true
            }
            None => false,
        };
        let transcript = self.prompts.transcript(
            request.instructions,
            &request.history,
            &request.prompt.text,
        )?;

        info!(workdir = %paths.dir.display(), "starting codex exec");
        let output = run_command_with_timeout(
            self.command(&paths, with_image),
            Some(transcript.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .context("run codex exec")?;
        fs::write(&paths.log_path, output.render_log("codex"))
            .with_context(|| format!("write codex log {}", paths.log_path.display()))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "codex exec timed out");
            return Err(anyhow!("codex exec timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "codex exec failed");
            return Err(anyhow!(
                "codex exec failed with status {:?}",
                output.status.code()
            ));
        }
        if !paths.output_path.exists() {
            return Err(anyhow!(
                "missing codex output {}",
                paths.output_path.display()
            ));
        }

        let arguments = read_arguments(&paths.output_path)?;
        debug!(has_action = arguments.is_some(), "codex exec completed");
        Ok(DecisionResponse {
            output_items: arguments.iter().cloned().collect(),
            arguments,
            call_id: None,
            usage: Usage::default(),
        })
    }
}

/// Final message as JSON; a message that is not a JSON object counts as no action.
fn read_arguments(path: &Path) -> Result<Option<Value>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read codex output {}", path.display()))?;
    match serde_json::from_str::<Value>(contents.trim()) {
        Ok(value @ Value::Object(_)) => Ok(Some(value)),
        _ => Ok(None),
    }
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ActionSchema;
    use crate::core::types::GameAction;
    use crate::core::window::PromptContent;

    #[test]
    fn paths_are_stable_per_turn() {
        let paths = CodexPaths::new(Path::new("/tmp/work"), "ls20", 4);
        assert!(paths.dir.ends_with("ls20/4"));
        assert!(paths.schema_path.ends_with("schema.json"));
        assert!(paths.output_path.ends_with("decision.json"));
    }

    #[test]
    fn non_object_output_is_no_action() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("decision.json");
        fs::write(&path, "I would press ACTION1").expect("write");
        assert_eq!(read_arguments(&path).expect("read"), None);
        fs::write(&path, "{\"action\":\"ACTION1\"}\n").expect("write");
        assert!(read_arguments(&path).expect("read").is_some());
    }

    /// Verifies the full exec flow against a stand-in program that writes the last message.
    #[cfg(unix)]
    #[test]
    fn runs_program_and_reads_last_message() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("fake-codex");
        // Writes a fixed decision to the path after --output-last-message.
        fs::write(
            &script,
            "#!/bin/sh\n\
             cat > transcript.txt\n\
             while [ $# -gt 0 ]; do\n\
               if [ \"$1\" = \"--output-last-message\" ]; then out=\"$2\"; fi\n\
               shift\n\
             done\n\
             printf '{\"action\":\"ACTION1\",\"reason\":\"r\"}' > \"$out\"\n",
        )
        .expect("write script");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");

        let client = CodexDecisionClient::new(
            "o4-mini",
            None,
            temp.path().join("work"),
            Duration::from_secs(10),
            10_000,
        )
        .expect("client")
        .with_program(script.to_string_lossy());

        let schema = ActionSchema::new(&[GameAction::Action1]);
        let prompt = PromptContent {
            text: "Turn 1 of `ls20`.".to_string(),
            image: None,
        };
        let request = DecisionRequest {
            game_id: "ls20",
            turn: 1,
            instructions: "play",
            history: Vec::new(),
            prompt: &prompt,
            schema: &schema,
        };
        let response = client.decide(&request).expect("decide");
        assert_eq!(
            response.arguments.as_ref().and_then(|args| args.get("action")),
            Some(&Value::String("ACTION1".to_string()))
        );
        assert_eq!(response.output_items.len(), 1);

        let paths = CodexPaths::new(&temp.path().join("work"), "ls20", 1);
        assert!(paths.schema_path.is_file());
        assert!(paths.log_path.is_file());
        let transcript = fs::read_to_string(paths.dir.join("transcript.txt")).expect("transcript");
        assert!(transcript.contains("Turn 1 of `ls20`."));
    }

    /// Verifies codex runs as the leader of its own process group, out of reach of
    /// the terminal's Ctrl-C.
    #[cfg(target_os = "linux")]
    #[test]
    fn codex_runs_in_its_own_process_group() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("fake-codex");
        fs::write(
            &script,
            "#!/bin/sh\n\
             read -r pid _ _ _ pgrp _ < /proc/$$/stat\n\
             if [ \"$pid\" = \"$pgrp\" ]; then echo leader; else echo member; fi\n",
        )
        .expect("write script");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");

        let client = CodexDecisionClient::new(
            "o4-mini",
            None,
            temp.path().join("work"),
            Duration::from_secs(10),
            10_000,
        )
        .expect("client")
        .with_program(script.to_string_lossy());
        let paths = CodexPaths::new(&client.work_dir, "ls20", 1);
        fs::create_dir_all(&paths.dir).expect("work dir");

        let cmd = client.command(&paths, false);
        let output =
            run_command_with_timeout(cmd, None, Duration::from_secs(10), 1024).expect("run");
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "leader");
    }
}
