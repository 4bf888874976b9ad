//! Request context on pooled connections.
//!
//! `PooledSession` stands in for one physical connection: it keeps the session
//! settings written by `set_config` and, like the generated triggers, reads the
//! current user id whenever an audited write runs on it.

use lifeguard_audit::{AuditContext, ContextPropagator, ExecutorError, SessionVariables, SqlExecutor};
use may_postgres::types::ToSql;
use may_postgres::Row;
use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Default)]
struct PooledSession {
    settings: RefCell<HashMap<String, String>>,
    audited_user_ids: RefCell<Vec<Option<String>>>,
}

fn unquote(param: &&dyn ToSql) -> String {
    format!("{param:?}").trim_matches('"').to_string()
}

impl SqlExecutor for PooledSession {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, ExecutorError> {
        if query.contains("set_config") {
            let mut settings = self.settings.borrow_mut();
            for pair in params.chunks(2) {
                settings.insert(unquote(&pair[0]), unquote(&pair[1]));
            }
            return Ok(1);
        }
        // What NULLIF(current_setting(.., true), '') yields inside the trigger.
        let user_id = self
            .settings
            .borrow()
            .get("super_audit.current_user_id")
            .filter(|v| !v.is_empty())
            .cloned();
        self.audited_user_ids.borrow_mut().push(user_id);
        Ok(1)
    }

    fn query_all(&self, _query: &str, _params: &[&dyn ToSql]) -> Result<Vec<Row>, ExecutorError> {
        Ok(Vec::new())
    }
}

fn handle_request(propagator: &ContextPropagator, connection: &PooledSession, context: AuditContext) {
    let guard = propagator.bind(connection, &context);
    guard
        .execute("UPDATE orders SET status = 'shipped' WHERE id = 1", &[])
        .unwrap();
}

#[test]
fn sequential_requests_never_see_each_others_user() {
    let propagator = ContextPropagator::new(SessionVariables::default(), true);
    let connection = PooledSession::default();

    handle_request(&propagator, &connection, AuditContext::empty().with_user_id(1));
    handle_request(&propagator, &connection, AuditContext::empty().with_user_id(2));
    handle_request(&propagator, &connection, AuditContext::empty());

    assert_eq!(
        *connection.audited_user_ids.borrow(),
        vec![Some("1".to_string()), Some("2".to_string()), None]
    );
}

#[test]
fn writes_outside_a_bound_request_carry_no_user() {
    let propagator = ContextPropagator::new(SessionVariables::default(), true);
    let connection = PooledSession::default();

    handle_request(&propagator, &connection, AuditContext::empty().with_user_id(9).with_url("/admin"));
    connection
        .execute("DELETE FROM orders WHERE id = 1", &[])
        .unwrap();

    assert_eq!(
        *connection.audited_user_ids.borrow(),
        vec![Some("9".to_string()), None]
    );
    assert_eq!(
        connection.settings.borrow().get("super_audit.current_url").map(String::as_str),
        Some("")
    );
}
