//! Per-run shared state threaded through every stage.
//!
//! Stages write fields additively; a later stage reading a field nobody
//! wrote gets `MissingContextField`, never a default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use labrig_core::obs::run_span;
use tracing::Span;
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};

/// Mutable record shared by the stages of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    span: Span,

    /// Checked-out project directory.
    pub work_dir: Option<PathBuf>,

    /// Revision identifier of the checkout.
    pub revision: Option<String>,

    /// Resolved classpath, in order.
    pub classpath: Vec<String>,

    /// Where measurement artifacts are collected.
    pub artifacts_dir: Option<PathBuf>,

    /// Instrumentation agent handed to the test run.
    pub agent_path: Option<PathBuf>,

    /// Script that runs the project's test suite.
    pub test_script: Option<PathBuf>,

    scratch: BTreeMap<String, String>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    /// Fresh context with a new run id.
    pub fn new() -> Self {
        let run_id = Uuid::new_v4();
        Self {
            run_id,
            started_at: Utc::now(),
            span: run_span(&run_id.to_string()),
            work_dir: None,
            revision: None,
            classpath: Vec::new(),
            artifacts_dir: None,
            agent_path: None,
            test_script: None,
            scratch: BTreeMap::new(),
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(dir.into());
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Run-scoped span; stages log inside it.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn require_work_dir(&self) -> PipelineResult<&Path> {
        self.work_dir
            .as_deref()
            .ok_or_else(|| PipelineError::missing("work_dir"))
    }

    pub fn require_revision(&self) -> PipelineResult<&str> {
        self.revision
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| PipelineError::missing("revision"))
    }

    pub fn require_classpath(&self) -> PipelineResult<&[String]> {
        if self.classpath.is_empty() {
            return Err(PipelineError::missing("classpath"));
        }
        Ok(&self.classpath)
    }

    pub fn require_artifacts_dir(&self) -> PipelineResult<&Path> {
        self.artifacts_dir
            .as_deref()
            .ok_or_else(|| PipelineError::missing("artifacts_dir"))
    }

    pub fn require_agent_path(&self) -> PipelineResult<&Path> {
        self.agent_path
            .as_deref()
            .ok_or_else(|| PipelineError::missing("agent_path"))
    }

    pub fn require_test_script(&self) -> PipelineResult<&Path> {
        self.test_script
            .as_deref()
            .ok_or_else(|| PipelineError::missing("test_script"))
    }

    pub fn set_scratch(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.scratch.insert(key.into(), value.into());
    }

    pub fn scratch(&self, key: &str) -> Option<&str> {
        self.scratch.get(key).map(String::as_str)
    }

    pub fn require_scratch(&self, key: &str) -> PipelineResult<&str> {
        self.scratch(key).ok_or_else(|| PipelineError::missing(key))
    }

    /// Replace `{field}` placeholders with context values.
    ///
    /// Known fields: `run_id`, `work_dir`, `revision`, `classpath`
    /// (joined with `:`), `artifacts_dir`, `agent_path`, `test_script`;
    /// any other name is looked up in scratch. A placeholder that cannot be
    /// resolved is a `MissingContextField`. Shell expansions (`${VAR}`) and
    /// braces that do not enclose a plain name are copied through.
    pub fn render(&self, template: &str) -> PipelineResult<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            let (head, tail) = rest.split_at(open);
            out.push_str(head);
            let name = tail[1..]
                .find('}')
                .map(|close| &tail[1..=close])
                .filter(|name| is_placeholder(name) && !out.ends_with('$'));
            match name {
                Some(name) => {
                    out.push_str(&self.lookup(name)?);
                    rest = &tail[name.len() + 2..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    fn lookup(&self, name: &str) -> PipelineResult<String> {
        let path = |p: &Path| p.to_string_lossy().into_owned();
        match name {
            "run_id" => Ok(self.run_id.to_string()),
            "work_dir" => self.require_work_dir().map(path),
            "revision" => self.require_revision().map(str::to_string),
            "classpath" => self.require_classpath().map(|cp| cp.join(":")),
            "artifacts_dir" => self.require_artifacts_dir().map(path),
            "agent_path" => self.require_agent_path().map(path),
            "test_script" => self.require_test_script().map(path),
            key => self.require_scratch(key).map(str::to_string),
        }
    }
}

/// `name` in `{name}` is an identifier, optionally dotted (`tests.exit_code`).
fn is_placeholder(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_are_errors() {
        let ctx = RunContext::new();
        assert!(matches!(
            ctx.require_work_dir(),
            Err(PipelineError::MissingContextField { ref field }) if field == "work_dir"
        ));
        assert!(ctx.require_revision().is_err());
        assert!(ctx.require_classpath().is_err());
        assert!(ctx.require_scratch("tests.exit_code").is_err());
    }

    #[test]
    fn test_blank_revision_counts_as_missing() {
        let ctx = RunContext::new().with_revision("  ");
        assert!(ctx.require_revision().is_err());
    }

    #[test]
    fn test_render_known_fields_and_scratch() {
        let mut ctx = RunContext::new()
            .with_work_dir("/tmp/project")
            .with_revision("abc123");
        ctx.classpath = vec!["a.jar".to_string(), "b.jar".to_string()];
        ctx.set_scratch("tool", "/opt/tool");
        ctx.set_scratch("tests.exit_code", "0");

        let rendered = ctx
            .render("cd {work_dir} && run {revision} -cp {classpath} {tool} {tests.exit_code}")
            .unwrap();
        assert_eq!(rendered, "cd /tmp/project && run abc123 -cp a.jar:b.jar /opt/tool 0");
    }

    #[test]
    fn test_render_unset_field_is_missing() {
        let ctx = RunContext::new().with_work_dir("/tmp/project");

        let err = ctx.render("java -cp {classpath} org.junit.runner.JUnitCore").unwrap_err();
        assert!(matches!(err, PipelineError::MissingContextField { ref field } if field == "classpath"));

        let err = ctx.render("run --agent {agent_path}").unwrap_err();
        assert!(matches!(err, PipelineError::MissingContextField { ref field } if field == "agent_path"));
    }

    #[test]
    fn test_render_unknown_key_is_missing() {
        let ctx = RunContext::new();
        let err = ctx.render("make bench REV={short_rev}").unwrap_err();
        assert!(matches!(err, PipelineError::MissingContextField { ref field } if field == "short_rev"));
    }

    #[test]
    fn test_render_leaves_shell_syntax_alone() {
        let ctx = RunContext::new().with_work_dir("/w");
        let template = "echo ${HOME} {} && awk '{print $1}' x && cd {work_dir} {";
        assert_eq!(
            ctx.render(template).unwrap(),
            "echo ${HOME} {} && awk '{print $1}' x && cd /w {"
        );
    }

    #[test]
    fn test_each_context_has_its_own_run_id() {
        assert_ne!(RunContext::new().run_id(), RunContext::new().run_id());
    }
}
