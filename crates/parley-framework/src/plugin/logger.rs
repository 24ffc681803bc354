use std::fmt;
use std::sync::Arc;

use tracing::Span;

/// A named logging scope handed to plugins.
///
/// Events logged through it, or inside [`Logger::in_scope`], carry the
/// logger's span and therefore its name.
#[derive(Clone)]
pub struct Logger {
    name: Arc<str>,
    span: Span,
}

impl Logger {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        let span = tracing::info_span!("logger", name = %name);
        Self { name, span }
    }

    /// A logger nested under this one, named `<parent>.<name>`.
    pub fn child(&self, name: &str) -> Self {
        let name: Arc<str> = format!("{}.{name}", self.name).into();
        let span = tracing::info_span!(parent: &self.span, "logger", name = %name);
        Self { name, span }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        self.span.in_scope(f)
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::debug!(logger = %self.name, "{message}"));
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::info!(logger = %self.name, "{message}"));
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::warn!(logger = %self.name, "{message}"));
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::error!(logger = %self.name, "{message}"));
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Logger").field(&self.name).finish()
    }
}
