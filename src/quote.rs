//! Identifier and literal quoting for generated SQL.
//!
//! Every name that ends up inside generated DDL or PL/pgSQL passes through this
//! module; nothing else in the crate concatenates user-controlled names into SQL.

use std::fmt;

/// Quote an identifier: `users` -> `"users"`, `we"ird` -> `"we""ird"`.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal: `o'brien` -> `'o''brien'`.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Wrap a function body in dollar quotes using a tag that does not occur in it.
pub fn dollar_quote(body: &str) -> String {
    let mut tag = String::from("audit");
    let mut n = 0usize;
    while body.contains(&format!("${tag}$")) {
        n += 1;
        tag = format!("audit_{n}");
    }
    format!("${tag}$\n{body}${tag}$")
}

/// Schema-qualified relation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_ident("Order Items"), "\"Order Items\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("users"), "'users'");
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
        assert_eq!(quote_literal(""), "''");
    }

    #[test]
    fn test_dollar_quote_picks_free_tag() {
        assert_eq!(dollar_quote("BEGIN END;\n"), "$audit$\nBEGIN END;\n$audit$");

        let tricky = "SELECT '$audit$';\n";
        let quoted = dollar_quote(tricky);
        assert!(quoted.starts_with("$audit_1$\n"));
        assert!(quoted.ends_with("$audit_1$"));
    }

    #[test]
    fn test_qualified_name_display() {
        let name = QualifiedName::new("public", "super_audit_logs");
        assert_eq!(name.to_string(), "\"public\".\"super_audit_logs\"");
    }
}
