//! Exception-handling aspect.
//!
//! On a faulted return, asks an [`ExceptionPolicyEvaluator`] what to do with
//! the fault under the aspect's configured policy. The evaluator may rethrow
//! the fault as is, rethrow a wrapped or replacement fault, or swallow it, in
//! which case the invocation completes normally with no value.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{ConfigError, Fault};
use crate::intercept::{AspectDescriptor, AspectScope, CallMessage, Processor, ReturnMessage};

/// How a fault should be treated once it reaches the aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionPolicy {
    /// Rethrow unchanged.
    Propagate,
    /// Rethrow wrapped in a new fault that keeps the original as its cause.
    Wrap,
    /// Rethrow a different fault; the original is lost.
    Replace,
}

impl ExceptionPolicy {
    /// Name the evaluator looks the policy up by.
    pub fn policy_name(self) -> &'static str {
        match self {
            ExceptionPolicy::Propagate => "PROPAGATE",
            ExceptionPolicy::Wrap => "WRAP",
            ExceptionPolicy::Replace => "REPLACE",
        }
    }
}

impl fmt::Display for ExceptionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.policy_name())
    }
}

impl FromStr for ExceptionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match crate::config::normalize_token(s).as_str() {
            "propagate" => Ok(ExceptionPolicy::Propagate),
            "wrap" => Ok(ExceptionPolicy::Wrap),
            "replace" => Ok(ExceptionPolicy::Replace),
            _ => Err(ConfigError::InvalidValue {
                key: "policy".to_string(),
                message: format!("unknown exception handling policy {s:?}"),
            }),
        }
    }
}

/// Decision returned by an [`ExceptionPolicyEvaluator`].
#[derive(Debug)]
pub enum PolicyVerdict {
    /// Keep propagating this fault, which may differ from the one evaluated.
    Rethrow(Fault),
    /// Drop the fault; the call completes with no value.
    Swallow,
}

/// Host-supplied policy engine consulted by [`ExceptionHandlingProcessor`].
pub trait ExceptionPolicyEvaluator: Send + Sync {
    fn evaluate(&self, fault: Fault, policy_name: &str) -> PolicyVerdict;
}

/// Processor enforcing an [`ExceptionPolicy`] on faulted returns.
pub struct ExceptionHandlingProcessor {
    policy: ExceptionPolicy,
    evaluator: Arc<dyn ExceptionPolicyEvaluator>,
}

impl ExceptionHandlingProcessor {
    /// Processor consulting `evaluator` under `policy`.
    pub fn new(policy: ExceptionPolicy, evaluator: Arc<dyn ExceptionPolicyEvaluator>) -> Self {
        Self { policy, evaluator }
    }

    /// Policy this processor evaluates faults under.
    pub fn policy(&self) -> ExceptionPolicy {
        self.policy
    }
}

impl Processor for ExceptionHandlingProcessor {
    fn name(&self) -> &str {
        "builtin:exception_handling"
    }

    fn process_call(
        &self,
        _call: &CallMessage,
        _aspect: &AspectDescriptor,
        _scope: &mut AspectScope,
    ) -> Result<(), Fault> {
        Ok(())
    }

    fn process_return(
        &self,
        ret: &mut ReturnMessage,
        _aspect: &AspectDescriptor,
        _scope: &mut AspectScope,
    ) -> Result<(), Fault> {
        if !ret.is_fault() {
            return Ok(());
        }
        if ret.rethrow_decided() {
            tracing::debug!(
                method = %ret.method(),
                policy = %self.policy,
                "Rethrow already decided by an earlier aspect, not re-evaluating"
            );
            return Ok(());
        }
        let Some(fault) = ret.take_exception() else {
            return Ok(());
        };

        match self.evaluator.evaluate(fault, self.policy.policy_name()) {
            PolicyVerdict::Rethrow(fault) => {
                tracing::debug!(
                    method = %ret.method(),
                    policy = %self.policy,
                    error = %fault,
                    "Exception policy rethrows"
                );
                ret.rethrow(fault);
            }
            PolicyVerdict::Swallow => {
                tracing::debug!(
                    method = %ret.method(),
                    policy = %self.policy,
                    "Exception policy swallowed fault"
                );
                ret.swallow_exception();
            }
        }
        Ok(())
    }
}

/// What the standard evaluator does with a fault under a named policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PostHandlingAction {
    Swallow,
    Rethrow,
    Wrap { message: String },
    Replace { message: String },
}

/// Table-driven [`ExceptionPolicyEvaluator`].
///
/// Ships with one action per built-in policy name. Unknown names rethrow the
/// fault unchanged.
#[derive(Debug, Clone)]
pub struct StandardPolicyEvaluator {
    actions: HashMap<String, PostHandlingAction>,
}

impl StandardPolicyEvaluator {
    /// Evaluator with the built-in action for each policy.
    pub fn new() -> Self {
        let mut actions = HashMap::new();
        actions.insert(
            ExceptionPolicy::Propagate.policy_name().to_string(),
            PostHandlingAction::Rethrow,
        );
        actions.insert(
            ExceptionPolicy::Wrap.policy_name().to_string(),
            PostHandlingAction::Wrap {
                message: "an error occurred while processing the call".to_string(),
            },
        );
        actions.insert(
            ExceptionPolicy::Replace.policy_name().to_string(),
            PostHandlingAction::Replace {
                message: "the call failed".to_string(),
            },
        );
        Self { actions }
    }

    /// Override or add the action for a policy name.
    pub fn with_action(mut self, policy_name: impl Into<String>, action: PostHandlingAction) -> Self {
        self.actions.insert(policy_name.into(), action);
        self
    }

    /// Action configured for `policy_name`.
    pub fn action(&self, policy_name: &str) -> Option<&PostHandlingAction> {
        self.actions.get(policy_name)
    }
}

impl Default for StandardPolicyEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExceptionPolicyEvaluator for StandardPolicyEvaluator {
    fn evaluate(&self, fault: Fault, policy_name: &str) -> PolicyVerdict {
        let Some(action) = self.actions.get(policy_name) else {
            tracing::warn!(policy = policy_name, "No action for exception policy, rethrowing");
            return PolicyVerdict::Rethrow(fault);
        };

        match action {
            PostHandlingAction::Swallow => PolicyVerdict::Swallow,
            PostHandlingAction::Rethrow => PolicyVerdict::Rethrow(fault),
            PostHandlingAction::Wrap { message } => PolicyVerdict::Rethrow(fault.context(message.clone())),
            PostHandlingAction::Replace { message } => {
                PolicyVerdict::Rethrow(anyhow::anyhow!("{}", message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    /// Evaluator that records the policy names it was asked about.
    struct FixedEvaluator {
        rethrow: bool,
        seen: Mutex<Vec<String>>,
    }

    impl FixedEvaluator {
        fn new(rethrow: bool) -> Self {
            Self {
                rethrow,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ExceptionPolicyEvaluator for FixedEvaluator {
        fn evaluate(&self, fault: Fault, policy_name: &str) -> PolicyVerdict {
            self.seen.lock().unwrap().push(policy_name.to_string());
            if self.rethrow {
                PolicyVerdict::Rethrow(fault)
            } else {
                PolicyVerdict::Swallow
            }
        }
    }

    fn run_return(processor: &ExceptionHandlingProcessor, ret: &mut ReturnMessage) {
        let aspect = AspectDescriptor::new(0, Arc::new(NoopMarker));
        processor
            .process_return(ret, &aspect, &mut AspectScope::new())
            .unwrap();
    }

    struct NoopMarker;

    impl Processor for NoopMarker {
        fn name(&self) -> &str {
            "noop"
        }

        fn process_call(
            &self,
            _call: &CallMessage,
            _aspect: &AspectDescriptor,
            _scope: &mut AspectScope,
        ) -> Result<(), Fault> {
            Ok(())
        }

        fn process_return(
            &self,
            _ret: &mut ReturnMessage,
            _aspect: &AspectDescriptor,
            _scope: &mut AspectScope,
        ) -> Result<(), Fault> {
            Ok(())
        }
    }

    #[test]
    fn test_policy_parse_and_names() {
        assert_eq!("propagate".parse::<ExceptionPolicy>().unwrap(), ExceptionPolicy::Propagate);
        assert_eq!("WRAP".parse::<ExceptionPolicy>().unwrap(), ExceptionPolicy::Wrap);
        assert_eq!("Replace".parse::<ExceptionPolicy>().unwrap(), ExceptionPolicy::Replace);
        assert_eq!("pro-pagate_".parse::<ExceptionPolicy>().unwrap(), ExceptionPolicy::Propagate);
        assert_eq!(ExceptionPolicy::Wrap.policy_name(), "WRAP");

        let err = "retry".parse::<ExceptionPolicy>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "policy"));
    }

    #[test]
    fn test_success_is_not_evaluated() {
        let evaluator = Arc::new(FixedEvaluator::new(true));
        let processor = ExceptionHandlingProcessor::new(ExceptionPolicy::Propagate, evaluator.clone());
        let call = CallMessage::new("m");
        let mut ret = ReturnMessage::value(&call, Some(json!(5)));

        run_return(&processor, &mut ret);
        assert!(evaluator.seen.lock().unwrap().is_empty());
        assert_eq!(ret.return_value(), Some(&json!(5)));
    }

    #[test]
    fn test_swallow_clears_fault() {
        let evaluator = Arc::new(FixedEvaluator::new(false));
        let processor = ExceptionHandlingProcessor::new(ExceptionPolicy::Propagate, evaluator.clone());
        let call = CallMessage::new("m");
        let mut ret = ReturnMessage::fault(&call, anyhow::anyhow!("boom"));

        run_return(&processor, &mut ret);
        assert!(!ret.is_fault());
        assert_eq!(ret.into_result().unwrap(), None);
        assert_eq!(*evaluator.seen.lock().unwrap(), vec!["PROPAGATE"]);
    }

    #[test]
    fn test_rethrow_keeps_fault_with_policy_name() {
        let evaluator = Arc::new(FixedEvaluator::new(true));
        let processor = ExceptionHandlingProcessor::new(ExceptionPolicy::Replace, evaluator.clone());
        let call = CallMessage::new("m");
        let mut ret = ReturnMessage::fault(&call, anyhow::anyhow!("boom"));

        run_return(&processor, &mut ret);
        assert_eq!(ret.exception().unwrap().to_string(), "boom");
        assert_eq!(*evaluator.seen.lock().unwrap(), vec!["REPLACE"]);
    }

    #[test]
    fn test_decided_rethrow_is_not_re_evaluated() {
        let first_evaluator = Arc::new(FixedEvaluator::new(true));
        let second_evaluator = Arc::new(FixedEvaluator::new(false));
        let first = ExceptionHandlingProcessor::new(ExceptionPolicy::Propagate, first_evaluator.clone());
        let second = ExceptionHandlingProcessor::new(ExceptionPolicy::Replace, second_evaluator.clone());
        let call = CallMessage::new("m");
        let mut ret = ReturnMessage::fault(&call, anyhow::anyhow!("boom"));

        run_return(&first, &mut ret);
        assert!(ret.rethrow_decided());
        run_return(&second, &mut ret);

        assert_eq!(ret.exception().unwrap().to_string(), "boom");
        assert_eq!(*first_evaluator.seen.lock().unwrap(), vec!["PROPAGATE"]);
        assert!(second_evaluator.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fault_raised_by_plain_hook_is_still_evaluated() {
        let evaluator = Arc::new(FixedEvaluator::new(false));
        let processor = ExceptionHandlingProcessor::new(ExceptionPolicy::Propagate, evaluator.clone());
        let call = CallMessage::new("m");
        let mut ret = ReturnMessage::value(&call, Some(json!(1)));
        ret.replace_exception(anyhow::anyhow!("late"));
        assert!(!ret.rethrow_decided());

        run_return(&processor, &mut ret);
        assert!(!ret.is_fault());
        assert_eq!(*evaluator.seen.lock().unwrap(), vec!["PROPAGATE"]);
    }

    #[test]
    fn test_standard_evaluator_wrap_keeps_cause() {
        let evaluator = StandardPolicyEvaluator::new();
        let verdict = evaluator.evaluate(anyhow::anyhow!("disk full"), "WRAP");
        let PolicyVerdict::Rethrow(fault) = verdict else {
            panic!("expected rethrow");
        };
        assert_eq!(fault.to_string(), "an error occurred while processing the call");
        assert_eq!(fault.root_cause().to_string(), "disk full");
    }

    #[test]
    fn test_standard_evaluator_replace_drops_cause() {
        let evaluator = StandardPolicyEvaluator::new();
        let PolicyVerdict::Rethrow(fault) = evaluator.evaluate(anyhow::anyhow!("disk full"), "REPLACE")
        else {
            panic!("expected rethrow");
        };
        assert_eq!(fault.to_string(), "the call failed");
        assert_eq!(fault.chain().count(), 1);
    }

    #[test]
    fn test_standard_evaluator_overrides_and_unknown() {
        let evaluator = StandardPolicyEvaluator::new()
            .with_action("PROPAGATE", PostHandlingAction::Swallow);
        assert!(matches!(
            evaluator.evaluate(anyhow::anyhow!("x"), "PROPAGATE"),
            PolicyVerdict::Swallow
        ));

        let PolicyVerdict::Rethrow(fault) = evaluator.evaluate(anyhow::anyhow!("x"), "AUDIT") else {
            panic!("unknown policy should rethrow");
        };
        assert_eq!(fault.to_string(), "x");
    }
}
