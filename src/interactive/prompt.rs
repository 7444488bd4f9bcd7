//! Prompt rules and detection.
//!
//! A [`PromptRule`] pairs one detection mode with the text to type when it
//! matches. Three modes exist:
//!
//! - [`DetectionMode::Pattern`]: a regular expression
//! - [`DetectionMode::Sync`]: a predicate over the latest output
//! - [`DetectionMode::Async`]: an async predicate that may also choose the
//!   response
//!
//! A detector that fails falls back to the rule's pattern when one is set. A
//! detector that answers "no" is final; the pattern is not consulted.
//!
//! # Example
//!
//! ```rust,ignore
//! use winrm_shell::interactive::PromptRule;
//!
//! let rules = vec![
//!     PromptRule::regex(r"(?i)continue\?", "y")?,
//!     PromptRule::sync_detector(|out| Ok(out.contains("Password:")), "s3cret").secure(),
//! ];
//! ```

use futures::future::{BoxFuture, FutureExt};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};

/// Placeholder written instead of secure values
pub const HIDDEN: &str = "[HIDDEN]";

const CUSTOM_DETECTOR: &str = "custom-detector";

/// Synchronous predicate over the latest output
pub type SyncDetector = Arc<dyn Fn(&str) -> anyhow::Result<bool> + Send + Sync>;

/// Async detector resolving to the response to send on a match
pub type AsyncDetector =
    Arc<dyn Fn(String) -> BoxFuture<'static, anyhow::Result<Option<String>>> + Send + Sync>;

/// How a rule recognises its prompt
#[derive(Clone)]
pub enum DetectionMode {
    Pattern,
    Sync(SyncDetector),
    Async(AsyncDetector),
}

impl DetectionMode {
    fn name(&self) -> &'static str {
        match self {
            DetectionMode::Pattern => "pattern",
            DetectionMode::Sync(_) => "sync",
            DetectionMode::Async(_) => "async",
        }
    }
}

impl fmt::Debug for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A prompt to answer during an interactive run
#[derive(Clone)]
pub struct PromptRule {
    mode: DetectionMode,
    pattern: Option<Regex>,
    response: String,
    secure: bool,
}

impl PromptRule {
    /// Answer `response` whenever `pattern` matches
    pub fn pattern(pattern: Regex, response: impl Into<String>) -> Self {
        Self {
            mode: DetectionMode::Pattern,
            pattern: Some(pattern),
            response: response.into(),
            secure: false,
        }
    }

    /// Compile `pattern` and answer `response` whenever it matches
    pub fn regex(pattern: &str, response: impl Into<String>) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            Error::InvalidConfig(format!("Invalid prompt pattern '{}': {}", pattern, e))
        })?;
        Ok(Self::pattern(regex, response))
    }

    /// Answer `response` whenever `detector` returns true
    pub fn sync_detector<F>(detector: F, response: impl Into<String>) -> Self
    where
        F: Fn(&str) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            mode: DetectionMode::Sync(Arc::new(detector)),
            pattern: None,
            response: response.into(),
            secure: false,
        }
    }

    /// Answer `response` whenever the async `detector` resolves to true
    pub fn async_detector<F, Fut>(detector: F, response: impl Into<String>) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        let response = response.into();
        let answer = response.clone();
        let detector = Arc::new(detector);
        Self {
            mode: DetectionMode::Async(Arc::new(move |output: String| {
                let detector = Arc::clone(&detector);
                let answer = answer.clone();
                async move {
                    let matched = detector(output).await?;
                    Ok::<_, anyhow::Error>(matched.then_some(answer))
                }
                .boxed()
            })),
            pattern: None,
            response,
            secure: false,
        }
    }

    /// Let the async `responder` decide both whether to answer and what
    pub fn async_responder<F, Fut>(responder: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<String>>> + Send + 'static,
    {
        Self {
            mode: DetectionMode::Async(Arc::new(move |output: String| responder(output).boxed())),
            pattern: None,
            response: String::new(),
            secure: false,
        }
    }

    /// Pattern consulted when the detector fails
    pub fn with_fallback(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Response sent when the fallback pattern matches
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = response.into();
        self
    }

    /// Keep output and response out of logs
    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Set whether the rule is secure
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn mode(&self) -> &DetectionMode {
        &self.mode
    }

    pub fn pattern_regex(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    /// Configured response; async responders choose theirs at match time
    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Identity of this rule when it answers with `response`
    pub fn identity_for(&self, response: &str) -> String {
        let source = self
            .pattern
            .as_ref()
            .map(|p| p.as_str())
            .unwrap_or(CUSTOM_DETECTOR);
        format!("{}:{}", source, response)
    }

    /// Identity of this rule with its configured response
    pub fn identity(&self) -> String {
        self.identity_for(&self.response)
    }

    fn redact<'a>(&self, value: &'a str) -> &'a str {
        if self.secure {
            HIDDEN
        } else {
            value
        }
    }

    fn pattern_match(&self, output: &str) -> Option<String> {
        self.pattern
            .as_ref()
            .filter(|p| p.is_match(output))
            .map(|_| self.response.clone())
    }

    /// Evaluate the rule against `output`, returning the response to send.
    pub async fn evaluate(&self, output: &str) -> Option<String> {
        match &self.mode {
            DetectionMode::Pattern => self.pattern_match(output),
            DetectionMode::Sync(detector) => match detector(output) {
                Ok(true) => Some(self.response.clone()),
                Ok(false) => None,
                Err(e) => {
                    debug!(error = %e, "Prompt detector failed, trying pattern");
                    self.pattern_match(output)
                }
            },
            DetectionMode::Async(detector) => match detector(output.to_string()).await {
                Ok(answer) => answer,
                Err(e) => {
                    debug!(error = %e, "Async prompt detector failed, trying pattern");
                    self.pattern_match(output)
                }
            },
        }
    }
}

impl fmt::Debug for PromptRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptRule")
            .field("mode", &self.mode)
            .field("pattern", &self.pattern.as_ref().map(|p| p.as_str()))
            .field("response", &self.redact(&self.response))
            .field("secure", &self.secure)
            .finish()
    }
}

/// A rule that matched and the response to send for it
#[derive(Clone, PartialEq, Eq)]
pub struct PromptMatch {
    /// Index of the matching rule
    pub rule: usize,
    pub identity: String,
    pub response: String,
    pub secure: bool,
}

impl fmt::Debug for PromptMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let response = if self.secure { HIDDEN } else { &self.response };
        f.debug_struct("PromptMatch")
            .field("rule", &self.rule)
            .field(
                "identity",
                &if self.secure {
                    HIDDEN
                } else {
                    self.identity.as_str()
                },
            )
            .field("response", &response)
            .finish()
    }
}

/// Scan `rules` in order against `output`.
///
/// Rules whose identity is already in `fired` are skipped and the scan goes
/// on. Empty output never matches.
pub async fn detect_prompt(
    output: &str,
    rules: &[PromptRule],
    fired: &HashSet<String>,
) -> Option<PromptMatch> {
    if output.is_empty() {
        return None;
    }

    for (index, rule) in rules.iter().enumerate() {
        if matches!(rule.mode, DetectionMode::Pattern | DetectionMode::Sync(_))
            && fired.contains(&rule.identity())
        {
            continue;
        }

        let Some(response) = rule.evaluate(output).await else {
            continue;
        };

        let identity = rule.identity_for(&response);
        if fired.contains(&identity) {
            continue;
        }

        debug!(
            rule = index,
            mode = rule.mode.name(),
            output = %rule.redact(output),
            "Prompt matched"
        );
        return Some(PromptMatch {
            rule: index,
            identity,
            response,
            secure: rule.secure,
        });
    }

    None
}
