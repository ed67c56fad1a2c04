// src/telephony/transport.rs — Outbound text transports
//
// `CommandTransport` hands the text to an external gateway program (for
// example an SMS CLI on the device). `DryRunTransport` only logs; it is the
// default so a half-configured install never texts anybody.

use async_trait::async_trait;

use crate::infra::config::{TransportConfig, TransportKind};
use crate::infra::errors::AutoPromoError;
use crate::telephony::{MessageTransport, SendReceipt};

/// Number of transport units `text` occupies at `max_chars` characters per unit.
/// Diagnostic only; the gateway does the real partitioning.
pub fn segment_count(text: &str, max_chars: usize) -> usize {
    let chars = text.chars().count();
    if chars == 0 || max_chars == 0 {
        return 1;
    }
    chars.div_ceil(max_chars)
}

/// Replace `{number}` and `{text}` in each argument. Substituted values are
/// never scanned again.
pub fn render_args(args: &[String], number: &str, text: &str) -> Vec<String> {
    args.iter().map(|a| render_arg(a, number, text)).collect()
}

fn render_arg(template: &str, number: &str, text: &str) -> String {
    let mut out = String::with_capacity(template.len() + number.len() + text.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{number}") {
            out.push_str(number);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{text}") {
            out.push_str(text);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Build the transport described by the application config.
pub fn from_config(config: &TransportConfig) -> anyhow::Result<Box<dyn MessageTransport>> {
    match config.kind {
        TransportKind::DryRun => Ok(Box::new(DryRunTransport::new(config.max_segment_chars))),
        TransportKind::Command => {
            let program = config.program.clone().ok_or_else(|| {
                AutoPromoError::Config("command transport needs a program".into())
            })?;
            Ok(Box::new(CommandTransport::new(
                program,
                config.args.clone(),
                config.max_segment_chars,
            )))
        }
    }
}

pub struct CommandTransport {
    program: String,
    args: Vec<String>,
    max_segment_chars: usize,
}

impl CommandTransport {
    pub fn new(program: impl Into<String>, args: Vec<String>, max_segment_chars: usize) -> Self {
        Self {
            program: program.into(),
            args,
            max_segment_chars,
        }
    }
}

#[async_trait]
impl MessageTransport for CommandTransport {
    fn name(&self) -> &str {
        "command"
    }

    async fn send(&self, number: &str, text: &str) -> anyhow::Result<SendReceipt> {
        let args = render_args(&self.args, number, text);
        let segments = segment_count(text, self.max_segment_chars);

        tracing::debug!(
            target: "autopromo::transport",
            "Running {} for {} ({} segment(s))",
            self.program,
            number,
            segments
        );

        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AutoPromoError::Transport {
                transport: self.program.clone(),
                message: format!("spawn failed: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AutoPromoError::Transport {
                transport: self.program.clone(),
                message: format!("exited with {}: {}", output.status, stderr.trim()),
            }
            .into());
        }

        Ok(SendReceipt { segments })
    }
}

pub struct DryRunTransport {
    max_segment_chars: usize,
}

impl DryRunTransport {
    pub fn new(max_segment_chars: usize) -> Self {
        Self { max_segment_chars }
    }
}

#[async_trait]
impl MessageTransport for DryRunTransport {
    fn name(&self) -> &str {
        "dry_run"
    }

    async fn send(&self, number: &str, text: &str) -> anyhow::Result<SendReceipt> {
        let segments = segment_count(text, self.max_segment_chars);
        tracing::info!(
            target: "autopromo::transport",
            "[dry run] would send {} char(s) in {} segment(s) to {}",
            text.chars().count(),
            segments,
            number
        );
        Ok(SendReceipt { segments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_count() {
        assert_eq!(segment_count("", 70), 1);
        assert_eq!(segment_count("Hi", 70), 1);
        assert_eq!(segment_count(&"a".repeat(70), 70), 1);
        assert_eq!(segment_count(&"a".repeat(71), 70), 2);
        // Counted in characters, not bytes.
        assert_eq!(segment_count(&"안".repeat(70), 70), 1);
    }

    #[test]
    fn test_render_args() {
        let args = vec!["-n".to_string(), "{number}".to_string(), "msg={text}".to_string()];
        assert_eq!(
            render_args(&args, "+8210", "Hi there"),
            vec!["-n", "+8210", "msg=Hi there"]
        );
    }

    #[test]
    fn test_render_args_does_not_expand_substituted_values() {
        let args = vec!["{number}".to_string(), "{text}".to_string(), "{number}:{text}".to_string()];
        assert_eq!(
            render_args(&args, "{text}", "call {number} {x"),
            vec!["{text}", "call {number} {x", "{text}:call {number} {x"]
        );
        assert_eq!(
            render_args(&["{{number}}".to_string()], "+8210", ""),
            vec!["{+8210}"]
        );
    }

    #[test]
    fn test_from_config_defaults_to_dry_run() {
        let transport = from_config(&TransportConfig::default()).unwrap();
        assert_eq!(transport.name(), "dry_run");
    }

    #[tokio::test]
    async fn test_dry_run_always_succeeds() {
        let transport = DryRunTransport::new(10);
        let receipt = transport.send("+8210", &"x".repeat(25)).await.unwrap();
        assert_eq!(receipt.segments, 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_transport_reports_exit_status() {
        let ok = CommandTransport::new("true", vec![], 70);
        assert!(ok.send("+8210", "Hi").await.is_ok());

        let failing = CommandTransport::new("false", vec![], 70);
        let err = failing.send("+8210", "Hi").await.unwrap_err();
        assert!(err.to_string().contains("false"));
    }

    #[tokio::test]
    async fn test_command_transport_missing_program() {
        let missing = CommandTransport::new("autopromo-no-such-gateway", vec![], 70);
        let err = missing.send("+8210", "Hi").await.unwrap_err();
        assert!(err.to_string().contains("spawn failed"));
    }
}
