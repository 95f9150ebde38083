//! Declarative configuration: which aspects attach to which methods.
//!
//! ```toml
//! [[methods]]
//! name = "Accounts::transfer"
//!
//! [[methods.aspects]]
//! kind = "log"
//! priority = 1
//! verbosity = "full"
//!
//! [[methods.aspects]]
//! kind = "exception_handling"
//! priority = 2
//! policy = "wrap"
//!
//! [policies.WRAP]
//! action = "wrap"
//! message = "transfer service unavailable"
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::aspects::{
    ExceptionHandlingProcessor, ExceptionPolicy, ExceptionPolicyEvaluator, LogProcessor, LogSink,
    PostHandlingAction, StandardPolicyEvaluator, TracingLogSink, Verbosity,
};
use crate::error::ConfigError;
use crate::intercept::{AspectRegistry, MethodId, Processor, ProcessorFactory};

/// Environment variable holding the path of the TOML config file.
pub const CONFIG_PATH_ENV: &str = "INTERCEPT_CONFIG";

/// Root of the interception config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterceptConfig {
    #[serde(default)]
    pub methods: Vec<MethodSpec>,
    /// Overrides for the standard exception policy evaluator, keyed by
    /// policy name (`PROPAGATE`, `WRAP`, `REPLACE`, or custom).
    #[serde(default)]
    pub policies: HashMap<String, PostHandlingAction>,
}

/// One interceptable method and its aspects.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodSpec {
    pub name: String,
    #[serde(default)]
    pub aspects: Vec<AspectSpec>,
}

/// One aspect as written in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AspectSpec {
    pub kind: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub verbosity: Option<String>,
    #[serde(default)]
    pub policy: Option<String>,
}

/// A validated aspect spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectKind {
    Log(Verbosity),
    ExceptionHandling(ExceptionPolicy),
}

impl AspectSpec {
    /// Validate the spec's strings into an [`AspectKind`].
    pub fn kind(&self) -> Result<AspectKind, ConfigError> {
        match normalize_token(&self.kind).as_str() {
            "log" | "logging" => {
                let verbosity = require(&self.verbosity, "verbosity", &self.kind)?;
                Ok(AspectKind::Log(verbosity.parse()?))
            }
            "exceptionhandling" | "exception" => {
                let policy = require(&self.policy, "policy", &self.kind)?;
                Ok(AspectKind::ExceptionHandling(policy.parse()?))
            }
            _ => Err(ConfigError::InvalidValue {
                key: "kind".to_string(),
                message: format!("unknown aspect kind {:?}", self.kind),
            }),
        }
    }
}

fn require<'a>(value: &'a Option<String>, key: &str, kind: &str) -> Result<&'a str, ConfigError> {
    value.as_deref().ok_or_else(|| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("required for aspect kind {kind:?}"),
    })
}

impl InterceptConfig {
    /// Parse config from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load the file named by `INTERCEPT_CONFIG`, or an empty config if unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        match optional_env(CONFIG_PATH_ENV)? {
            Some(path) => {
                tracing::debug!(path = %path, "Loading interception config");
                Self::from_file(path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Validate every method and aspect spec.
    pub fn validate(&self) -> Result<Vec<(MethodId, i32, AspectKind)>, ConfigError> {
        let mut out = Vec::new();
        for method in &self.methods {
            if method.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "methods.name".to_string(),
                    message: "method name must not be empty".to_string(),
                });
            }
            let id = MethodId::new(method.name.trim());
            for aspect in &method.aspects {
                out.push((id.clone(), aspect.priority, aspect.kind()?));
            }
        }
        Ok(out)
    }

    /// Standard evaluator with this config's policy overrides applied.
    pub fn policy_evaluator(&self) -> StandardPolicyEvaluator {
        self.policies
            .iter()
            .fold(StandardPolicyEvaluator::new(), |evaluator, (name, action)| {
                evaluator.with_action(name.clone(), action.clone())
            })
    }
}

/// Host collaborators handed to aspects built from config.
#[derive(Clone)]
pub struct Collaborators {
    pub log_sink: Arc<dyn LogSink>,
    pub evaluator: Arc<dyn ExceptionPolicyEvaluator>,
}

impl Collaborators {
    /// Tracing sink plus the config's standard policy evaluator.
    pub fn from_config(config: &InterceptConfig) -> Self {
        Self {
            log_sink: Arc::new(TracingLogSink),
            evaluator: Arc::new(config.policy_evaluator()),
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            log_sink: Arc::new(TracingLogSink),
            evaluator: Arc::new(StandardPolicyEvaluator::new()),
        }
    }
}

impl AspectRegistry {
    /// Build a registry from config, failing on the first invalid spec.
    pub fn from_config(
        config: &InterceptConfig,
        collaborators: &Collaborators,
    ) -> Result<Self, ConfigError> {
        let mut builder = AspectRegistry::builder();
        for (method, priority, kind) in config.validate()? {
            builder.push(method, priority, factory_for(kind, collaborators));
        }
        let registry = builder.build();
        tracing::debug!(methods = registry.len(), "Built aspect registry from config");
        Ok(registry)
    }
}

fn factory_for(kind: AspectKind, collaborators: &Collaborators) -> ProcessorFactory {
    match kind {
        AspectKind::Log(verbosity) => {
            let sink = Arc::clone(&collaborators.log_sink);
            Arc::new(move || {
                Arc::new(LogProcessor::new(verbosity, Arc::clone(&sink))) as Arc<dyn Processor>
            })
        }
        AspectKind::ExceptionHandling(policy) => {
            let evaluator = Arc::clone(&collaborators.evaluator);
            Arc::new(move || {
                Arc::new(ExceptionHandlingProcessor::new(policy, Arc::clone(&evaluator)))
                    as Arc<dyn Processor>
            })
        }
    }
}

// Helper functions

/// Lowercase `s` and drop `_` and `-`, so `Exception-Handling` matches
/// `exceptionhandling`.
pub(crate) fn normalize_token(s: &str) -> String {
    s.to_lowercase().replace(['_', '-'], "")
}

pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) if val.is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::ParseError(format!(
            "failed to read {key}: {e}"
        ))),
    }
}
