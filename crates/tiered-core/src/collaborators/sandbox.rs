//! Code sandbox collaborator.
//!
//! `ProcessSandbox` runs user code in a child interpreter process:
//!   1. wrap the code so it receives `input` and returns a value
//!   2. spawn `node -e` / `python3 -c` with the input as JSON on stdin
//!   3. read the JSON result that follows the result marker on stdout
//!   4. kill the process if it outlives the timeout

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::config::SandboxConfig;

const RESULT_MARKER: &str = "__TIERED_RESULT__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeLanguage {
    Javascript,
    Python,
}

impl CodeLanguage {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "javascript" | "js" | "node" | "typescript" => Some(Self::Javascript),
            "python" | "py" | "python3" => Some(Self::Python),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxRequest {
    pub code: String,
    pub code_language: String,
    #[serde(default)]
    pub input: Value,
}

/// Result of running user code, tagged by `__type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__type", rename_all = "lowercase")]
pub enum SandboxOutcome {
    Output { output: Value },
    Error { error: String },
}

#[async_trait::async_trait]
pub trait CodeSandbox: Send + Sync {
    async fn run_user_code(&self, request: SandboxRequest) -> SandboxOutcome;
}

/// Sandbox backed by local interpreter processes.
pub struct ProcessSandbox {
    config: SandboxConfig,
}

impl ProcessSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    fn command_for(&self, language: CodeLanguage, code: &str) -> (String, &'static str, String) {
        match language {
            CodeLanguage::Javascript => (self.config.node_bin.clone(), "-e", wrap_javascript(code)),
            CodeLanguage::Python => (self.config.python_bin.clone(), "-c", wrap_python(code)),
        }
    }
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

#[async_trait::async_trait]
impl CodeSandbox for ProcessSandbox {
    async fn run_user_code(&self, request: SandboxRequest) -> SandboxOutcome {
        let Some(language) = CodeLanguage::from_str(&request.code_language) else {
            return SandboxOutcome::Error {
                error: format!("Unsupported code language: {}", request.code_language),
            };
        };

        let (program, flag, script) = self.command_for(language, &request.code);
        let mut child = match tokio::process::Command::new(&program)
            .arg(flag)
            .arg(&script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                return SandboxOutcome::Error {
                    error: format!("Failed to spawn '{}': {}. Is it installed and in PATH?", program, e),
                }
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            let input = serde_json::to_vec(&request.input).unwrap_or_else(|_| b"null".to_vec());
            if let Err(e) = stdin.write_all(&input).await {
                tracing::warn!("[Sandbox] Failed to write input to {}: {}", program, e);
            }
        }

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return SandboxOutcome::Error {
                    error: format!("Sandbox process failed: {}", e),
                }
            }
            Err(_) => {
                return SandboxOutcome::Error {
                    error: format!("Code execution timed out after {}ms", self.config.timeout_ms),
                }
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.trim();
            return SandboxOutcome::Error {
                error: if message.is_empty() {
                    format!("Code exited with {}", output.status)
                } else {
                    message.to_string()
                },
            };
        }

        parse_result(&stdout)
    }
}

fn parse_result(stdout: &str) -> SandboxOutcome {
    let Some((_, raw)) = stdout.rsplit_once(RESULT_MARKER) else {
        return SandboxOutcome::Error {
            error: "Code produced no result".to_string(),
        };
    };
    match serde_json::from_str(raw.trim()) {
        Ok(output) => SandboxOutcome::Output { output },
        Err(e) => SandboxOutcome::Error {
            error: format!("Code result is not valid JSON: {}", e),
        },
    }
}

fn wrap_javascript(code: &str) -> String {
    format!(
        r#"const __input = JSON.parse(require("fs").readFileSync(0, "utf8") || "null");
Promise.resolve((async (input) => {{
{code}
}})(__input)).then(
  (r) => {{ process.stdout.write("\n{marker}" + JSON.stringify(r === undefined ? null : r)); }},
  (e) => {{ process.stderr.write(String((e && e.message) || e)); process.exit(1); }}
);"#,
        code = code,
        marker = RESULT_MARKER
    )
}

fn wrap_python(code: &str) -> String {
    let body: String = if code.trim().is_empty() {
        "    pass\n".to_string()
    } else {
        code.lines().map(|l| format!("    {}\n", l)).collect()
    };
    format!(
        "import json, sys\n\
         __input = json.loads(sys.stdin.read() or \"null\")\n\
         def __user_main(input):\n\
         {body}\
         __result = __user_main(__input)\n\
         sys.stdout.write(\"\\n{marker}\" + json.dumps(__result))\n",
        body = body,
        marker = RESULT_MARKER
    )
}
