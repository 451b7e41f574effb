// warden-core/src/domain/compiler/sql_guard.rs

use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::ports::connector::ConnectorError;

/// User-supplied rule SQL must be exactly one `SELECT` / `WITH` statement.
pub fn ensure_read_only(sql: &str) -> Result<(), ConnectorError> {
    let dialect = GenericDialect {};
    let statements =
        Parser::parse_sql(&dialect, sql).map_err(|e| ConnectorError::QuerySyntax(e.to_string()))?;

    match statements.as_slice() {
        [Statement::Query(_)] => Ok(()),
        [] => Err(ConnectorError::QuerySyntax("empty query".to_string())),
        [_] => Err(ConnectorError::QuerySyntax(
            "only read-only SELECT or WITH queries are allowed".to_string(),
        )),
        _ => Err(ConnectorError::QuerySyntax(format!(
            "expected a single statement, found {}",
            statements.len()
        ))),
    }
}

/// `${...}` left in a query marks a template rule that was never instantiated.
pub fn has_unresolved_placeholder(sql: &str) -> bool {
    sql.find("${").is_some_and(|start| sql[start..].contains('}'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_select_and_with() {
        assert!(ensure_read_only("SELECT COUNT(*) FROM orders WHERE total < 0").is_ok());
        let cte = "WITH neg AS (SELECT * FROM orders WHERE total < 0) SELECT COUNT(*) FROM neg";
        assert!(ensure_read_only(cte).is_ok());
    }

    #[test]
    fn test_rejects_writes_and_garbage() {
        assert!(matches!(
            ensure_read_only("DELETE FROM orders"),
            Err(ConnectorError::QuerySyntax(_))
        ));
        assert!(ensure_read_only("SELECT 1; DROP TABLE orders").is_err());
        assert!(ensure_read_only("SELEC * FRM orders").is_err());
        assert!(ensure_read_only("").is_err());
    }

    #[test]
    fn test_placeholders() {
        assert!(has_unresolved_placeholder("SELECT * FROM ${table}"));
        assert!(!has_unresolved_placeholder("SELECT '$' || name FROM t"));
    }
}
