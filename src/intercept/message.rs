//! Call and return messages carried through the pipeline.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Fault;

/// Identifier of an interceptable method, usually its signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(Arc<str>);

impl MethodId {
    /// Identifier for `signature`.
    pub fn new(signature: impl AsRef<str>) -> Self {
        Self(Arc::from(signature.as_ref()))
    }

    /// The signature text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MethodId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for MethodId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

/// A single positional argument of a call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Argument {
    pub name: String,
    pub value: Value,
    /// Rust type name of the original value.
    pub type_name: String,
}

/// Snapshot of one invocation request.
///
/// Built once per invocation and shared read-only with every pre-call hook
/// and with the target.
#[derive(Debug, Clone)]
pub struct CallMessage {
    method: MethodId,
    arguments: Vec<Argument>,
    invocation_id: Uuid,
}

impl CallMessage {
    /// An argument-less call to `method` with a fresh invocation id.
    pub fn new(method: impl Into<MethodId>) -> Self {
        Self {
            method: method.into(),
            arguments: Vec::new(),
            invocation_id: Uuid::new_v4(),
        }
    }

    /// Append an argument, serializing it to a JSON value.
    ///
    /// Values that fail to serialize are recorded as `null`.
    pub fn with_arg<T: Serialize + ?Sized>(mut self, name: impl Into<String>, value: &T) -> Self {
        let name = name.into();
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(argument = %name, "Argument is not serializable, recording null: {}", e);
                Value::Null
            }
        };
        self.arguments.push(Argument {
            name,
            value,
            type_name: std::any::type_name::<T>().to_string(),
        });
        self
    }

    /// Append an argument whose value and type name are already known.
    pub fn with_raw_arg(
        mut self,
        name: impl Into<String>,
        value: Value,
        type_name: impl Into<String>,
    ) -> Self {
        self.arguments.push(Argument {
            name: name.into(),
            value,
            type_name: type_name.into(),
        });
        self
    }

    /// Method being called.
    pub fn method(&self) -> &MethodId {
        &self.method
    }

    /// Arguments in call order.
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Value of the argument named `name`.
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.arguments
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    /// Id unique to this invocation.
    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }
}

/// Outcome of one invocation, handed to every post-call hook in turn.
///
/// Exactly one of `return_value` / `exception` is meaningful. Hooks that
/// replace the exception change what every later hook observes and what the
/// caller finally sees. Once an aspect commits to rethrowing, the decision
/// sticks for the rest of the post-call pass.
#[derive(Debug)]
pub struct ReturnMessage {
    method: MethodId,
    invocation_id: Uuid,
    return_value: Option<Value>,
    exception: Option<Fault>,
    rethrow_decided: bool,
}

impl ReturnMessage {
    /// A successful return, with or without a value.
    pub fn value(call: &CallMessage, value: Option<Value>) -> Self {
        Self {
            method: call.method.clone(),
            invocation_id: call.invocation_id,
            return_value: value,
            exception: None,
            rethrow_decided: false,
        }
    }

    /// A faulted return.
    pub fn fault(call: &CallMessage, fault: Fault) -> Self {
        Self {
            method: call.method.clone(),
            invocation_id: call.invocation_id,
            return_value: None,
            exception: Some(fault),
            rethrow_decided: false,
        }
    }

    pub(crate) fn from_result(call: &CallMessage, result: Result<Option<Value>, Fault>) -> Self {
        match result {
            Ok(value) => Self::value(call, value),
            Err(fault) => Self::fault(call, fault),
        }
    }

    /// Method the call was made on.
    pub fn method(&self) -> &MethodId {
        &self.method
    }

    /// Id shared with the originating [`CallMessage`].
    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    /// The return value; `None` when the call faulted or returned nothing.
    pub fn return_value(&self) -> Option<&Value> {
        if self.exception.is_some() {
            return None;
        }
        self.return_value.as_ref()
    }

    /// The current exception, if the call faulted.
    pub fn exception(&self) -> Option<&Fault> {
        self.exception.as_ref()
    }

    /// Whether an exception is currently set.
    pub fn is_fault(&self) -> bool {
        self.exception.is_some()
    }

    /// Remove the exception without deciding anything about it.
    pub fn take_exception(&mut self) -> Option<Fault> {
        self.exception.take()
    }

    /// Set `fault` as the exception and commit to propagating it.
    ///
    /// Exception-handling aspects later in the pass see the fault but do not
    /// re-evaluate it.
    pub fn rethrow(&mut self, fault: Fault) {
        self.return_value = None;
        self.exception = Some(fault);
        self.rethrow_decided = true;
    }

    /// Whether an aspect has already committed to rethrowing.
    pub fn rethrow_decided(&self) -> bool {
        self.rethrow_decided
    }

    /// Replace the current exception, returning the previous one.
    pub fn replace_exception(&mut self, fault: Fault) -> Option<Fault> {
        self.return_value = None;
        self.exception.replace(fault)
    }

    /// Drop the exception and turn this into a normal return with no value.
    pub fn swallow_exception(&mut self) -> Option<Fault> {
        self.return_value = None;
        self.rethrow_decided = false;
        self.exception.take()
    }

    /// Final outcome as seen by the caller.
    pub fn into_result(self) -> Result<Option<Value>, Fault> {
        match self.exception {
            Some(fault) => Err(fault),
            None => Ok(self.return_value),
        }
    }
}
