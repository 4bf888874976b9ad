//! Session context propagation.
//!
//! Generated triggers read the acting user and request URL from two
//! connection-scoped settings. They are written with `set_config(.., false)`, so
//! they live as long as the session, which under pooling outlives the request.
//! [`ContextPropagator::bind`] therefore sets both values on the exact executor
//! the request is about to write through, every time it is checked out, and the
//! returned [`ContextGuard`] clears them again when it goes out of scope.

use crate::error::AuditError;
use crate::executor::{ExecutorError, SqlExecutor};
use may_postgres::types::ToSql;
use may_postgres::Row;

/// Default namespace for the two session settings.
pub const DEFAULT_SESSION_NAMESPACE: &str = "super_audit";

const SET_CONTEXT_SQL: &str = "SELECT set_config($1, $2, false), set_config($3, $4, false)";

/// Names of the connection-scoped settings read by the triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionVariables {
    namespace: String,
}

impl SessionVariables {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// `<namespace>.current_user_id`
    pub fn user_id(&self) -> String {
        format!("{}.current_user_id", self.namespace)
    }

    /// `<namespace>.current_url`
    pub fn url(&self) -> String {
        format!("{}.current_url", self.namespace)
    }
}

impl Default for SessionVariables {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_NAMESPACE)
    }
}

/// Who is acting and where the request came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditContext {
    pub user_id: Option<i64>,
    pub url: Option<String>,
}

impl AuditContext {
    /// No user, no URL; triggers record NULL for both.
    pub const fn empty() -> Self {
        Self {
            user_id: None,
            url: None,
        }
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Write both settings on `executor`.
    ///
    /// Absent values are written as the empty string, which triggers read back as
    /// NULL; a previous request's values are always overwritten.
    pub fn apply(
        &self,
        executor: &dyn SqlExecutor,
        variables: &SessionVariables,
    ) -> Result<(), AuditError> {
        let user_id_name = variables.user_id();
        let url_name = variables.url();
        let user_id = self.user_id.map(|id| id.to_string()).unwrap_or_default();
        let url = self.url.clone().unwrap_or_default();

        executor
            .execute(SET_CONTEXT_SQL, &[&user_id_name, &user_id, &url_name, &url])
            .map(|_| ())
            .map_err(|e| AuditError::ContextPropagationFailed(e.to_string()))
    }
}

/// Binds request context to checked-out connections.
#[derive(Debug, Clone)]
pub struct ContextPropagator {
    variables: SessionVariables,
    enabled: bool,
}

impl ContextPropagator {
    pub fn new(variables: SessionVariables, enabled: bool) -> Self {
        Self { variables, enabled }
    }

    pub fn variables(&self) -> &SessionVariables {
        &self.variables
    }

    /// Set `context` on `executor` and return a guard that writes through it.
    ///
    /// A failure to set the variables is logged and swallowed: the request's own
    /// writes still go ahead, recorded without user or URL.
    pub fn bind<'a>(&self, executor: &'a dyn SqlExecutor, context: &AuditContext) -> ContextGuard<'a> {
        let mut bound = false;
        if self.enabled {
            match context.apply(executor, &self.variables) {
                Ok(()) => bound = true,
                Err(e) => log::error!("Audit: failed to set session context: {}", e),
            }
        }
        ContextGuard {
            executor,
            variables: self.variables.clone(),
            bound,
        }
    }
}

/// Executor handle carrying request context; clears it on drop.
pub struct ContextGuard<'a> {
    executor: &'a dyn SqlExecutor,
    variables: SessionVariables,
    bound: bool,
}

impl ContextGuard<'_> {
    /// Whether the context was actually written to the session.
    pub fn is_bound(&self) -> bool {
        self.bound
    }
}

impl SqlExecutor for ContextGuard<'_> {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, ExecutorError> {
        self.executor.execute(query, params)
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, ExecutorError> {
        self.executor.query_all(query, params)
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        if !self.bound {
            return;
        }
        if let Err(e) = AuditContext::empty().apply(self.executor, &self.variables) {
            log::warn!("Audit: failed to clear session context: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingExecutor;

    #[test]
    fn test_session_variable_names() {
        let vars = SessionVariables::default();
        assert_eq!(vars.user_id(), "super_audit.current_user_id");
        assert_eq!(vars.url(), "super_audit.current_url");
        assert_eq!(SessionVariables::new("app").url(), "app.current_url");
    }

    #[test]
    fn test_apply_writes_both_settings() {
        let executor = RecordingExecutor::new();
        AuditContext::empty()
            .with_user_id(42)
            .with_url("https://example.test/orders?page=2")
            .apply(&executor, &SessionVariables::default())
            .unwrap();

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].sql.contains("set_config"));
        assert_eq!(
            calls[0].params,
            vec![
                "\"super_audit.current_user_id\"",
                "\"42\"",
                "\"super_audit.current_url\"",
                "\"https://example.test/orders?page=2\"",
            ]
        );
    }

    #[test]
    fn test_guard_clears_on_drop() {
        let executor = RecordingExecutor::new();
        let propagator = ContextPropagator::new(SessionVariables::default(), true);
        {
            let guard = propagator.bind(&executor, &AuditContext::empty().with_user_id(7));
            assert!(guard.is_bound());
            guard.execute("UPDATE orders SET status = 'paid' WHERE id = 1", &[]).unwrap();
        }

        let calls = executor.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].params[1], "\"7\"");
        assert!(calls[1].sql.starts_with("UPDATE orders"));
        assert_eq!(calls[2].params[1], "\"\"");
        assert_eq!(calls[2].params[3], "\"\"");
    }

    #[test]
    fn test_failed_propagation_does_not_block_writes() {
        let executor = RecordingExecutor::new().fail_on("set_config");
        let propagator = ContextPropagator::new(SessionVariables::default(), true);

        let guard = propagator.bind(&executor, &AuditContext::empty().with_user_id(1));
        assert!(!guard.is_bound());
        assert!(guard.execute("INSERT INTO notes (body) VALUES ('x')", &[]).is_ok());
    }

    #[test]
    fn test_disabled_propagator_is_pass_through() {
        let executor = RecordingExecutor::new();
        let propagator = ContextPropagator::new(SessionVariables::default(), false);
        {
            let guard = propagator.bind(&executor, &AuditContext::empty().with_user_id(1));
            assert!(!guard.is_bound());
        }
        assert!(executor.calls().is_empty());
    }
}
