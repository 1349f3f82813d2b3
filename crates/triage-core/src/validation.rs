//! Step validation previews.
//!
//! A step may carry `warn` and `error` query templates. Once the step is
//! filled, each template has its `$key` placeholders replaced by the
//! sanitized argument values, is scoped to the action's base query and is
//! run as a count-only search. The counts decide the step's status.

use crate::error::Result;
use crate::operation::{OperationStep, ValidationRule};
use crate::readiness::{step_filled, step_filled_for};
use crate::resolver::ArgumentResolver;
use crate::search::{scoped_query, SearchBackend, SearchRequest};
use crate::throttle::{Debounced, Throttle};
use crate::values::{ArgValue, ArgValues};
use futures::future::BoxFuture;
use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Query composition
// ---------------------------------------------------------------------------

const METACHARACTERS: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\', '/',
];

/// Backslash-escape every query metacharacter and whitespace in `term`.
pub fn sanitize_term(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if METACHARACTERS.contains(&c) || c.is_whitespace() {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Render a value as a literal query fragment. Lists become `(a OR b)`.
pub fn sanitize(value: &ArgValue) -> String {
    match value {
        ArgValue::Text(s) => sanitize_term(s),
        ArgValue::List(items) => {
            let terms: Vec<String> = items.iter().map(|i| sanitize_term(i)).collect();
            format!("({})", terms.join(" OR "))
        }
        ArgValue::Custom(serde_json::Value::String(s)) => sanitize_term(s),
        ArgValue::Custom(other) => sanitize_term(&other.to_string()),
    }
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"))
}

/// Replace each `$key` in `template` with the sanitized value of `key`.
///
/// Placeholders match whole identifiers, so `$label` never touches
/// `$label_type`. Keys with no value are left as written.
pub fn substitute(template: &str, values: &ArgValues) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures<'_>| match values.get(&caps[1]) {
            Some(value) => sanitize(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// The full query a rule previews for `values` under `base_query`.
pub fn preview_query(base_query: &str, rule: &ValidationRule, values: &ArgValues) -> String {
    scoped_query(base_query, &substitute(&rule.query, values))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    #[default]
    Unset,
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValidationStatus::Unset => "unset",
            ValidationStatus::Success => "success",
            ValidationStatus::Warning => "warning",
            ValidationStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Error beats warning beats success; nothing ran means unset.
pub fn classify(error_total: Option<u64>, warn_total: Option<u64>) -> ValidationStatus {
    if error_total.is_some_and(|n| n > 0) {
        ValidationStatus::Error
    } else if warn_total.is_some_and(|n| n > 0) {
        ValidationStatus::Warning
    } else if error_total.is_some() || warn_total.is_some() {
        ValidationStatus::Success
    } else {
        ValidationStatus::Unset
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepValidation {
    pub status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warn_total: Option<u64>,
    /// Message of the rule that decided the status, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// StepValidator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StepValidator {
    backend: Arc<dyn SearchBackend>,
    resolver: ArgumentResolver,
}

impl StepValidator {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            backend,
            resolver: ArgumentResolver::default(),
        }
    }

    /// Judge filledness with `resolver`, honouring its handlers' overrides.
    pub fn with_resolver(mut self, resolver: ArgumentResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Run the step's preview queries. An unfilled step is `unset` without searching.
    pub async fn validate_step(
        &self,
        step: &OperationStep,
        base_query: &str,
        values: &ArgValues,
    ) -> Result<StepValidation> {
        self.validate(None, step, base_query, values).await
    }

    /// [`Self::validate_step`] for a step of `operation_id`, with the
    /// handler's active arguments deciding whether the step is filled.
    pub async fn validate_operation_step(
        &self,
        operation_id: &str,
        step: &OperationStep,
        base_query: &str,
        values: &ArgValues,
    ) -> Result<StepValidation> {
        self.validate(Some(operation_id), step, base_query, values)
            .await
    }

    fn is_filled(&self, operation_id: Option<&str>, step: &OperationStep, values: &ArgValues) -> bool {
        match operation_id {
            Some(id) => step_filled_for(&self.resolver, id, step, values),
            None => step_filled(step, values),
        }
    }

    async fn validate(
        &self,
        operation_id: Option<&str>,
        step: &OperationStep,
        base_query: &str,
        values: &ArgValues,
    ) -> Result<StepValidation> {
        let Some(rules) = step.validation.as_ref() else {
            return Ok(StepValidation::default());
        };
        if !self.is_filled(operation_id, step, values) {
            return Ok(StepValidation::default());
        }

        let (error_total, warn_total) = futures::try_join!(
            self.count(base_query, rules.error.as_ref(), values),
            self.count(base_query, rules.warn.as_ref(), values),
        )?;

        let status = classify(error_total, warn_total);
        let message = match status {
            ValidationStatus::Error => rules.error.as_ref().map(|r| r.message.clone()),
            ValidationStatus::Warning => rules.warn.as_ref().map(|r| r.message.clone()),
            _ => None,
        };
        Ok(StepValidation {
            status,
            error_total,
            warn_total,
            message,
        })
    }

    async fn count(
        &self,
        base_query: &str,
        rule: Option<&ValidationRule>,
        values: &ArgValues,
    ) -> Result<Option<u64>> {
        let Some(rule) = rule else {
            return Ok(None);
        };
        let request = SearchRequest::count_only(preview_query(base_query, rule, values));
        let response = self.backend.search(&request).await?;
        Ok(Some(response.total))
    }
}

// ---------------------------------------------------------------------------
// ValidationSession
// ---------------------------------------------------------------------------

/// Debounced validation for a single step being edited.
///
/// Only the most recently triggered edit may set the status; a preview that
/// resolves after a newer edit was made is discarded.
#[derive(Clone)]
pub struct ValidationSession {
    validator: StepValidator,
    operation_id: Option<String>,
    throttle: Throttle,
    current: Arc<Mutex<StepValidation>>,
}

impl ValidationSession {
    pub fn new(backend: Arc<dyn SearchBackend>, window: Duration) -> Self {
        Self {
            validator: StepValidator::new(backend),
            operation_id: None,
            throttle: Throttle::new(window),
            current: Arc::new(Mutex::new(StepValidation::default())),
        }
    }

    /// A session for a step of `operation_id`, judged through `resolver`.
    pub fn for_operation(
        backend: Arc<dyn SearchBackend>,
        window: Duration,
        resolver: ArgumentResolver,
        operation_id: impl Into<String>,
    ) -> Self {
        let mut session = Self::new(backend, window);
        session.validator = session.validator.with_resolver(resolver);
        session.operation_id = Some(operation_id.into());
        session
    }

    pub fn current(&self) -> StepValidation {
        self.lock().clone()
    }

    /// Report an edit of the step's values.
    ///
    /// The returned future resolves to the status after this edit settles,
    /// which is the previous status if the edit was superseded or its
    /// preview failed.
    pub fn changed(
        &self,
        step: &OperationStep,
        base_query: &str,
        values: &ArgValues,
    ) -> BoxFuture<'static, StepValidation> {
        let operation_id = self.operation_id.clone();
        if !self.validator.is_filled(operation_id.as_deref(), step, values) {
            self.throttle.supersede();
            let mut current = self.lock();
            *current = StepValidation::default();
            return Box::pin(futures::future::ready(current.clone()));
        }

        let validator = self.validator.clone();
        let (step, base, values) = (step.clone(), base_query.to_string(), values.clone());
        let pending = self.throttle.debounce(move || async move {
            validator
                .validate(operation_id.as_deref(), &step, &base, &values)
                .await
        });

        let session = self.clone();
        Box::pin(async move {
            match pending.await {
                Debounced::Fired {
                    seq,
                    output: Ok(result),
                } => {
                    let mut current = session.lock();
                    if session.throttle.is_latest(seq) {
                        tracing::debug!(seq, status = %result.status, "validation applied");
                        *current = result;
                    } else {
                        tracing::debug!(seq, "discarding preview of a superseded edit");
                    }
                }
                Debounced::Fired { seq, output: Err(e) } => {
                    tracing::warn!(seq, error = %e, "validation preview failed");
                }
                Debounced::Superseded => {}
            }
            session.current()
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StepValidation> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
