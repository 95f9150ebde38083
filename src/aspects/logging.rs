//! Logging aspect.
//!
//! Writes one entry before and one after each call, with detail controlled by
//! [`Verbosity`]. At [`Verbosity::Full`] the elapsed time of the call is
//! appended to the return entry; the stopwatch lives in the invocation's
//! [`AspectScope`], so concurrent calls never share it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::error::{ConfigError, Fault};
use crate::intercept::{AspectDescriptor, AspectScope, CallMessage, Processor, ReturnMessage};

/// Target used by [`TracingLogSink`].
pub const ASPECT_LOG_TARGET: &str = "interpose::aspect_log";

/// Detail level of the logging aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Verbosity {
    /// Emit nothing.
    None,
    /// Method signature only.
    #[default]
    Light,
    /// Signature plus arguments and return value.
    Medium,
    /// Medium plus elapsed time.
    Full,
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verbosity::None => "none",
            Verbosity::Light => "light",
            Verbosity::Medium => "medium",
            Verbosity::Full => "full",
        };
        f.write_str(s)
    }
}

impl FromStr for Verbosity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match crate::config::normalize_token(s).as_str() {
            "none" => Ok(Verbosity::None),
            "light" | "lite" => Ok(Verbosity::Light),
            "medium" => Ok(Verbosity::Medium),
            "full" => Ok(Verbosity::Full),
            _ => Err(ConfigError::InvalidValue {
                key: "verbosity".to_string(),
                message: format!("unknown verbosity level {s:?}"),
            }),
        }
    }
}

/// Destination for formatted log entries.
///
/// Fire-and-forget: implementations must not fail or panic.
pub trait LogSink: Send + Sync {
    fn write(&self, entry: &str);
}

/// Sink that forwards entries to `tracing`.
///
/// Failure entries (`[E]...`) go out at error level, everything else at info.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn write(&self, entry: &str) {
        if entry.starts_with("[E]") {
            tracing::error!(target: ASPECT_LOG_TARGET, "{}", entry);
        } else {
            tracing::info!(target: ASPECT_LOG_TARGET, "{}", entry);
        }
    }
}

/// Start time of one invocation, kept in the aspect's scope.
struct Stopwatch(Instant);

/// Processor writing call and return entries to a [`LogSink`].
pub struct LogProcessor {
    verbosity: Verbosity,
    sink: Arc<dyn LogSink>,
}

impl LogProcessor {
    /// Processor writing at `verbosity` to `sink`.
    pub fn new(verbosity: Verbosity, sink: Arc<dyn LogSink>) -> Self {
        Self { verbosity, sink }
    }

    /// Configured detail level.
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }
}

impl Processor for LogProcessor {
    fn name(&self) -> &str {
        "builtin:log"
    }

    fn process_call(
        &self,
        call: &CallMessage,
        _aspect: &AspectDescriptor,
        scope: &mut AspectScope,
    ) -> Result<(), Fault> {
        let entry = match self.verbosity {
            Verbosity::None => return Ok(()),
            Verbosity::Light => light_call_entry(call),
            Verbosity::Medium => medium_call_entry(call),
            Verbosity::Full => {
                scope.insert(Stopwatch(Instant::now()));
                medium_call_entry(call)
            }
        };
        self.sink.write(&entry);
        Ok(())
    }

    fn process_return(
        &self,
        ret: &mut ReturnMessage,
        _aspect: &AspectDescriptor,
        scope: &mut AspectScope,
    ) -> Result<(), Fault> {
        let entry = match self.verbosity {
            Verbosity::None => return Ok(()),
            Verbosity::Light => light_return_entry(ret),
            Verbosity::Medium => medium_return_entry(ret),
            Verbosity::Full => {
                let elapsed = scope.take::<Stopwatch>().map(|s| s.0.elapsed().as_millis());
                let mut entry = medium_return_entry(ret);
                if let Some(ms) = elapsed {
                    entry.push_str(&format!("[STOPWATCH: {ms} ms]"));
                }
                entry
            }
        };
        self.sink.write(&entry);
        Ok(())
    }
}

fn light_call_entry(call: &CallMessage) -> String {
    format!("[I][IN][METHOD SIGNATURE: {}]", call.method())
}

fn medium_call_entry(call: &CallMessage) -> String {
    let args = if call.arguments().is_empty() {
        "No parameters".to_string()
    } else {
        call.arguments()
            .iter()
            .map(|a| display_value(&a.value))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("{}[PARAMETERS: {}]", light_call_entry(call), args)
}

fn light_return_entry(ret: &ReturnMessage) -> String {
    match ret.exception() {
        None => format!("[I][OUT][METHOD SIGNATURE: {}]", ret.method()),
        Some(fault) => failure_entry(ret, fault),
    }
}

fn medium_return_entry(ret: &ReturnMessage) -> String {
    match ret.exception() {
        None => {
            let value = ret
                .return_value()
                .map(display_value)
                .unwrap_or_else(|| "No return value".to_string());
            format!("{}[RETURN VALUE: {}]", light_return_entry(ret), value)
        }
        Some(fault) => failure_entry(ret, fault),
    }
}

fn failure_entry(ret: &ReturnMessage, fault: &Fault) -> String {
    let trace = fault
        .chain()
        .map(|cause| cause.to_string().trim().to_string())
        .collect::<Vec<_>>()
        .join(" <- ");
    format!(
        "[E][OUT][METHOD SIGNATURE: {}][EXCEPTION MESSAGE: {}][STACK TRACE: {}]",
        ret.method(),
        fault.to_string().trim(),
        trace
    )
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tracing_test::traced_test;

    use super::*;
    use crate::aspects::recording::MemoryLogSink;

    fn descriptor(processor: &Arc<LogProcessor>) -> AspectDescriptor {
        AspectDescriptor::new(0, Arc::clone(processor) as Arc<dyn Processor>)
    }

    /// Runs both hooks for one call and returns what the sink received.
    fn run(verbosity: Verbosity, call: &CallMessage, result: Result<Option<Value>, Fault>) -> Vec<String> {
        let sink = Arc::new(MemoryLogSink::new());
        let processor = Arc::new(LogProcessor::new(verbosity, sink.clone()));
        let aspect = descriptor(&processor);
        let mut scope = AspectScope::new();

        processor.process_call(call, &aspect, &mut scope).unwrap();
        let mut ret = match result {
            Ok(v) => ReturnMessage::value(call, v),
            Err(f) => ReturnMessage::fault(call, f),
        };
        processor.process_return(&mut ret, &aspect, &mut scope).unwrap();
        sink.entries()
    }

    fn transfer_call() -> CallMessage {
        CallMessage::new("Accounts::transfer")
            .with_arg("amount", &250)
            .with_arg("memo", "rent")
    }

    #[test]
    fn test_none_writes_nothing() {
        let entries = run(Verbosity::None, &transfer_call(), Ok(Some(json!(true))));
        assert!(entries.is_empty());
    }

    #[test]
    fn test_light_writes_signature_only() {
        let entries = run(Verbosity::Light, &transfer_call(), Ok(Some(json!(true))));
        assert_eq!(
            entries,
            vec![
                "[I][IN][METHOD SIGNATURE: Accounts::transfer]",
                "[I][OUT][METHOD SIGNATURE: Accounts::transfer]",
            ]
        );
    }

    #[test]
    fn test_medium_includes_arguments_and_value() {
        let entries = run(Verbosity::Medium, &transfer_call(), Ok(Some(json!(true))));
        assert_eq!(
            entries,
            vec![
                "[I][IN][METHOD SIGNATURE: Accounts::transfer][PARAMETERS: 250, rent]",
                "[I][OUT][METHOD SIGNATURE: Accounts::transfer][RETURN VALUE: true]",
            ]
        );
    }

    #[test]
    fn test_medium_placeholders_for_empty_call() {
        let entries = run(Verbosity::Medium, &CallMessage::new("Clock::tick"), Ok(None));
        assert_eq!(
            entries,
            vec![
                "[I][IN][METHOD SIGNATURE: Clock::tick][PARAMETERS: No parameters]",
                "[I][OUT][METHOD SIGNATURE: Clock::tick][RETURN VALUE: No return value]",
            ]
        );
    }

    #[test]
    fn test_failure_entry_at_light_has_message_and_trace() {
        let fault = anyhow::anyhow!("connection reset").context("transfer failed");
        let entries = run(Verbosity::Light, &transfer_call(), Err(fault));
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[1],
            "[E][OUT][METHOD SIGNATURE: Accounts::transfer][EXCEPTION MESSAGE: transfer failed]\
             [STACK TRACE: transfer failed <- connection reset]"
        );
    }

    #[test]
    fn test_full_appends_stopwatch() {
        let entries = run(Verbosity::Full, &transfer_call(), Ok(Some(json!(1))));
        assert_eq!(entries.len(), 2);
        assert!(entries[0].ends_with("[PARAMETERS: 250, rent]"));
        let stopwatch = entries[1]
            .split("[STOPWATCH: ")
            .nth(1)
            .and_then(|s| s.strip_suffix(" ms]"))
            .expect("stopwatch section");
        assert!(stopwatch.parse::<u128>().is_ok());
    }

    #[test]
    fn test_verbosity_parse() {
        assert_eq!("FULL".parse::<Verbosity>().unwrap(), Verbosity::Full);
        assert_eq!("lite".parse::<Verbosity>().unwrap(), Verbosity::Light);
        assert_eq!("me-dium".parse::<Verbosity>().unwrap(), Verbosity::Medium);
        assert_eq!("Full_".parse::<Verbosity>().unwrap(), Verbosity::Full);
        assert!("chatty".parse::<Verbosity>().is_err());
        assert_eq!(Verbosity::default(), Verbosity::Light);
    }

    #[test]
    #[traced_test]
    fn test_tracing_sink_emits_entries() {
        TracingLogSink.write("[I][IN][METHOD SIGNATURE: Traced::call]");
        TracingLogSink.write("[E][OUT][EXCEPTION MESSAGE: nope]");
        assert!(logs_contain("[I][IN][METHOD SIGNATURE: Traced::call]"));
        assert!(logs_contain("[E][OUT][EXCEPTION MESSAGE: nope]"));
    }
}
