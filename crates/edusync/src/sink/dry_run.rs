//! Dry-run executor: renders statements instead of running them

use async_trait::async_trait;
use tracing::info;

use super::{ExecutorError, InsertStatement, SqlParam, StatementExecutor};

/// Quote a value as a SQL string literal, doubling every `'`.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// The statement with its parameters spliced in as literals.
pub fn render_sql(statement: &InsertStatement) -> String {
    let values: Vec<String> = statement
        .params
        .iter()
        .map(|param| match param {
            SqlParam::Text(Some(text)) => quote_literal(text),
            SqlParam::Date(Some(day)) => quote_literal(&day.to_string()),
            SqlParam::Text(None) | SqlParam::Date(None) => "NULL".to_string(),
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        statement.table,
        statement.columns.join(", "),
        values.join(", ")
    )
}

/// Logs each statement and keeps its rendered text.
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    rendered: Vec<String>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statements(&self) -> &[String] {
        &self.rendered
    }
}

#[async_trait]
impl StatementExecutor for DryRunExecutor {
    async fn execute(&mut self, statement: &InsertStatement) -> Result<u64, ExecutorError> {
        let sql = render_sql(statement);
        info!(statement = %sql, "Dry run, not executed");
        self.rendered.push(sql);
        Ok(1)
    }

    async fn execute_atomic(
        &mut self,
        statements: &[InsertStatement],
    ) -> Result<u64, ExecutorError> {
        for statement in statements {
            self.execute(statement).await?;
        }
        Ok(statements.len() as u64)
    }
}
