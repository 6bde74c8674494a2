//! Subprocess-backed layout-switch tool

use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::LayoutTool;
use crate::constants::strategy;
use crate::error::{Result, TopologyError};

/// Runs an external program (by default `DisplaySwitch.exe`) and waits for it
/// with a bounded timeout
#[derive(Debug, Clone)]
pub struct CommandLayoutTool {
    program: String,
}

impl CommandLayoutTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandLayoutTool {
    fn default() -> Self {
        Self::new(strategy::LAYOUT_TOOL)
    }
}

impl LayoutTool for CommandLayoutTool {
    fn run(&self, args: &[String], timeout: Duration) -> Result<i32> {
        debug!(program = %self.program, ?args, "Launching layout tool");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| TopologyError::ExternalToolFailed(format!("{}: {}", self.program, e)))?;

        let started = Instant::now();
        loop {
            match child.try_wait()? {
                Some(exit) => {
                    // Killed by a signal: no exit code
                    return Ok(exit.code().unwrap_or(-1));
                }
                None if started.elapsed() >= timeout => {
                    warn!(program = %self.program, timeout_ms = timeout.as_millis() as u64, "Layout tool timed out");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(TopologyError::ExternalToolFailed(format!(
                        "{} did not finish within {}ms",
                        self.program,
                        timeout.as_millis()
                    )));
                }
                None => thread::sleep(strategy::LAYOUT_TOOL_POLL),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_tool_failure() {
        let tool = CommandLayoutTool::new("displaytopo-no-such-layout-tool");
        let err = tool.run(&[], Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, TopologyError::ExternalToolFailed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_is_reported() {
        let tool = CommandLayoutTool::new("sh");
        let code = tool
            .run(&["-c".to_string(), "exit 3".to_string()], Duration::from_secs(5))
            .unwrap();
        assert_eq!(code, 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_tool() {
        let tool = CommandLayoutTool::new("sleep");
        let err = tool.run(&["5".to_string()], Duration::from_millis(200)).unwrap_err();
        assert!(err.to_string().contains("did not finish"));
    }
}
