//! Bind-parameter analysis.
//!
//! Inspects SQL text for bind parameters in the four common styles
//! (`?`, `:name`, `@name`, `$name`), enumerates the tables and columns the
//! parsed statement references, and suggests a type for each named
//! parameter by matching `column = :param` comparisons against the schema.
//!
//! A parse failure is recorded in the analysis rather than returned as an
//! error; parameter extraction works on the raw text and survives SQL the
//! parser cannot handle.

use crate::db::{DatabaseBackend, Schema};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    Expr, Query, Select, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// One bind parameter found in the SQL text, in order of appearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindParameter {
    /// Name for named styles; None for positional `?`.
    pub name: Option<String>,
    /// 1-based position for positional parameters.
    pub position: Option<usize>,
    /// The parameter as written, e.g. `?`, `:CustomerID`, `@min_amount`.
    pub style: String,
}

impl BindParameter {
    /// Returns true for named-style parameters.
    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }
}

/// Type suggestion for a named parameter, derived from the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSuggestion {
    pub suggested_table: String,
    pub suggested_column: String,
    pub data_type: String,
    pub is_primary_key: bool,
    pub not_null: bool,
}

/// Complete analysis of one SQL statement's bind parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BindAnalysis {
    pub original_query: String,
    pub parameters: Vec<BindParameter>,
    pub tables_referenced: Vec<String>,
    pub columns_referenced: Vec<String>,
    pub parameter_suggestions: BTreeMap<String, ParameterSuggestion>,
    /// Set when the statement could not be parsed; parameter extraction
    /// still ran on the raw text.
    pub parse_error: Option<String>,
}

impl BindAnalysis {
    /// Unique named-parameter names, in order of first appearance.
    pub fn named_parameters(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for param in &self.parameters {
            if let Some(name) = param.name.as_deref() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Returns true if the text contains positional `?` parameters.
    pub fn has_positional(&self) -> bool {
        self.parameters.iter().any(|p| !p.is_named())
    }
}

fn param_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\?|:([a-zA-Z0-9_]+)|@([a-zA-Z0-9_]+)|\$([a-zA-Z0-9_]+)")
            .expect("parameter regex is valid")
    })
}

/// Returns true when a `:name` match is really the second colon of a
/// Postgres `expr::type` cast. The regex cannot look behind, so the first
/// colon of `AccountID::text` never matches but `:text` does.
fn is_cast_colon(sql: &str, m: &regex::Match<'_>) -> bool {
    m.as_str().starts_with(':') && m.start() > 0 && sql.as_bytes()[m.start() - 1] == b':'
}

/// Analyzes the bind parameters of a SQL statement.
///
/// When a schema is supplied, `column = :param` comparisons in the WHERE
/// clause are resolved to column types for the suggestion map.
pub fn analyze_bind_parameters(sql: &str, schema: Option<&Schema>) -> BindAnalysis {
    let mut analysis = BindAnalysis {
        original_query: sql.to_string(),
        ..BindAnalysis::default()
    };

    // Parameter extraction is purely textual, in order of appearance.
    let mut position = 0usize;
    for caps in param_regex().captures_iter(sql) {
        let whole = caps.get(0).expect("whole match");
        if is_cast_colon(sql, &whole) {
            continue;
        }
        let style = whole.as_str().to_string();
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string());

        let param = if let Some(name) = name {
            BindParameter {
                name: Some(name),
                position: None,
                style,
            }
        } else {
            position += 1;
            BindParameter {
                name: None,
                position: Some(position),
                style,
            }
        };
        analysis.parameters.push(param);
    }

    // Table/column enumeration needs the AST.
    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => {
            let mut walker = AstWalker::default();
            for statement in &statements {
                walker.walk_statement(statement);
            }
            analysis.tables_referenced = walker.tables;
            analysis.columns_referenced = walker.columns;

            if let Some(schema) = schema {
                analysis.parameter_suggestions =
                    suggest_types(&walker.comparisons, &analysis, schema);
            }
        }
        Err(e) => {
            analysis.parse_error = Some(e.to_string());
        }
    }

    analysis
}

/// Rewrites every bind parameter to the backend's positional placeholder
/// syntax, returning the rewritten SQL and the parameters in bind order.
pub fn rewrite_placeholders(sql: &str, backend: DatabaseBackend) -> (String, Vec<BindParameter>) {
    let mut params = Vec::new();
    let mut index = 0usize;
    let mut positional = 0usize;

    let rewritten = param_regex().replace_all(sql, |caps: &regex::Captures<'_>| {
        let whole = caps.get(0).expect("whole match");
        if is_cast_colon(sql, &whole) {
            return whole.as_str().to_string();
        }
        index += 1;
        let style = whole.as_str().to_string();
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string());
        let position = if name.is_none() {
            positional += 1;
            Some(positional)
        } else {
            None
        };
        params.push(BindParameter {
            name,
            position,
            style,
        });
        backend.placeholder(index)
    });

    (rewritten.into_owned(), params)
}

/// Collects table names, column references and `column <op> :param`
/// comparisons from the AST.
#[derive(Default)]
struct AstWalker {
    tables: Vec<String>,
    columns: Vec<String>,
    comparisons: Vec<(String, String)>,
}

impl AstWalker {
    fn push_table(&mut self, name: String) {
        if !self.tables.contains(&name) {
            self.tables.push(name);
        }
    }

    fn push_column(&mut self, name: String) {
        if !self.columns.contains(&name) {
            self.columns.push(name);
        }
    }

    fn walk_statement(&mut self, statement: &Statement) {
        if let Statement::Query(query) = statement {
            self.walk_query(query);
        }
    }

    fn walk_query(&mut self, query: &Query) {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.walk_query(&cte.query);
            }
        }
        self.walk_set_expr(&query.body);
        if let Some(order_by) = &query.order_by {
            if let sqlparser::ast::OrderByKind::Expressions(exprs) = &order_by.kind {
                for expr in exprs {
                    self.walk_expr(&expr.expr);
                }
            }
        }
    }

    fn walk_set_expr(&mut self, set_expr: &SetExpr) {
        match set_expr {
            SetExpr::Select(select) => self.walk_select(select),
            SetExpr::Query(query) => self.walk_query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.walk_set_expr(left);
                self.walk_set_expr(right);
            }
            _ => {}
        }
    }

    fn walk_select(&mut self, select: &Select) {
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    self.walk_expr(expr)
                }
                _ => {}
            }
        }
        for twj in &select.from {
            self.walk_table_with_joins(twj);
        }
        if let Some(selection) = &select.selection {
            self.walk_expr(selection);
        }
        if let sqlparser::ast::GroupByExpr::Expressions(exprs, _) = &select.group_by {
            for expr in exprs {
                self.walk_expr(expr);
            }
        }
        if let Some(having) = &select.having {
            self.walk_expr(having);
        }
    }

    fn walk_table_with_joins(&mut self, twj: &TableWithJoins) {
        self.walk_table_factor(&twj.relation);
        for join in &twj.joins {
            self.walk_table_factor(&join.relation);
            if let sqlparser::ast::JoinOperator::Inner(constraint)
            | sqlparser::ast::JoinOperator::LeftOuter(constraint)
            | sqlparser::ast::JoinOperator::RightOuter(constraint)
            | sqlparser::ast::JoinOperator::FullOuter(constraint) = &join.join_operator
            {
                if let sqlparser::ast::JoinConstraint::On(expr) = constraint {
                    self.walk_expr(expr);
                }
            }
        }
    }

    fn walk_table_factor(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Table { name, .. } => {
                self.push_table(name.to_string());
            }
            TableFactor::Derived { subquery, .. } => self.walk_query(subquery),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.walk_table_with_joins(table_with_joins),
            _ => {}
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Identifier(ident) => self.push_column(ident.value.clone()),
            Expr::CompoundIdentifier(parts) => {
                let name = parts
                    .iter()
                    .map(|p| p.value.as_str())
                    .collect::<Vec<_>>()
                    .join(".");
                self.push_column(name);
            }
            Expr::BinaryOp { left, right, .. } => {
                self.record_comparison(left, right);
                self.walk_expr(left);
                self.walk_expr(right);
            }
            Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::Cast { expr, .. } => {
                self.walk_expr(expr)
            }
            Expr::IsNull(expr) | Expr::IsNotNull(expr) => self.walk_expr(expr),
            Expr::Between {
                expr, low, high, ..
            } => {
                self.walk_expr(expr);
                self.walk_expr(low);
                self.walk_expr(high);
            }
            Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
                self.record_comparison(expr, pattern);
                self.walk_expr(expr);
                self.walk_expr(pattern);
            }
            Expr::InList { expr, list, .. } => {
                self.walk_expr(expr);
                for item in list {
                    self.walk_expr(item);
                }
            }
            Expr::InSubquery { expr, subquery, .. } => {
                self.walk_expr(expr);
                self.walk_query(subquery);
            }
            Expr::Subquery(query) => self.walk_query(query),
            Expr::Function(function) => {
                if let sqlparser::ast::FunctionArguments::List(args) = &function.args {
                    for arg in &args.args {
                        if let sqlparser::ast::FunctionArg::Unnamed(
                            sqlparser::ast::FunctionArgExpr::Expr(expr),
                        ) = arg
                        {
                            self.walk_expr(expr);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Records `column <op> <placeholder>` comparisons for type suggestions.
    fn record_comparison(&mut self, left: &Expr, right: &Expr) {
        let column = match left {
            Expr::Identifier(ident) => Some(ident.value.clone()),
            Expr::CompoundIdentifier(parts) => parts.last().map(|p| p.value.clone()),
            _ => None,
        };
        let placeholder = match right {
            Expr::Value(sqlparser::ast::ValueWithSpan {
                value: sqlparser::ast::Value::Placeholder(p),
                ..
            }) => Some(p.clone()),
            _ => None,
        };
        if let (Some(column), Some(placeholder)) = (column, placeholder) {
            self.comparisons.push((column, placeholder));
        }
    }
}

/// Resolves `column = :param` comparisons against the schema.
fn suggest_types(
    comparisons: &[(String, String)],
    analysis: &BindAnalysis,
    schema: &Schema,
) -> BTreeMap<String, ParameterSuggestion> {
    let mut suggestions = BTreeMap::new();

    for (column_name, placeholder) in comparisons {
        // Only suggest for parameters we actually extracted.
        if !analysis.parameters.iter().any(|p| &p.style == placeholder) {
            continue;
        }

        for table_ref in &analysis.tables_referenced {
            let table_name = table_ref
                .split_whitespace()
                .next()
                .unwrap_or(table_ref)
                .trim_matches('"');
            let Some(table) = schema.table(table_name) else {
                continue;
            };
            if let Some(column) = table.column(column_name) {
                suggestions.insert(
                    placeholder.clone(),
                    ParameterSuggestion {
                        suggested_table: table.name.clone(),
                        suggested_column: column.name.clone(),
                        data_type: column.data_type.clone(),
                        is_primary_key: table.primary_key.contains(&column.name),
                        not_null: !column.is_nullable,
                    },
                );
                break;
            }
        }
    }

    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Column, Table};
    use pretty_assertions::assert_eq;

    fn banking_schema() -> Schema {
        Schema {
            tables: vec![Table {
                name: "Account".to_string(),
                columns: vec![
                    Column::new("AccountID", "INTEGER").nullable(false),
                    Column::new("CustomerID", "INTEGER").nullable(false),
                    Column::new("AccountType", "VARCHAR(20)"),
                    Column::new("Balance", "DECIMAL(10,2)"),
                ],
                primary_key: vec!["AccountID".to_string()],
            }],
            foreign_keys: vec![],
        }
    }

    #[test]
    fn test_named_colon_parameters_extracted_in_order() {
        let analysis = analyze_bind_parameters(
            "SELECT * FROM Account WHERE CustomerID = :CustomerID AND AccountType = :acct_type",
            None,
        );

        assert_eq!(analysis.parameters.len(), 2);
        assert_eq!(analysis.parameters[0].name.as_deref(), Some("CustomerID"));
        assert_eq!(analysis.parameters[0].style, ":CustomerID");
        assert_eq!(analysis.parameters[1].name.as_deref(), Some("acct_type"));
        assert_eq!(analysis.named_parameters(), vec!["CustomerID", "acct_type"]);
    }

    #[test]
    fn test_all_parameter_styles() {
        let analysis = analyze_bind_parameters(
            "SELECT * FROM BankTransaction \
             WHERE Amount > @min_amount \
             AND TransactionDate BETWEEN $start_date AND $end_date \
             AND AccountID = ? AND TransactionType = :txn_type",
            None,
        );

        let styles: Vec<&str> = analysis.parameters.iter().map(|p| p.style.as_str()).collect();
        assert_eq!(
            styles,
            vec!["@min_amount", "$start_date", "$end_date", "?", ":txn_type"]
        );
        assert!(analysis.has_positional());
        assert_eq!(
            analysis.parameters[3],
            BindParameter {
                name: None,
                position: Some(1),
                style: "?".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_named_parameter_kept_in_text_order() {
        let analysis = analyze_bind_parameters(
            "SELECT * FROM Account WHERE CustomerID = :id OR OwnerID = :id",
            None,
        );

        // Both occurrences are reported; the unique view collapses them.
        assert_eq!(analysis.parameters.len(), 2);
        assert_eq!(analysis.named_parameters(), vec!["id"]);
    }

    #[test]
    fn test_tables_and_columns_from_ast() {
        let analysis = analyze_bind_parameters(
            "SELECT a.Balance, c.CustomerType FROM Account a \
             JOIN Customer c ON a.CustomerID = c.CustomerID \
             WHERE a.AccountType = :acct_type",
            None,
        );

        assert!(analysis
            .tables_referenced
            .iter()
            .any(|t| t.contains("Account")));
        assert!(analysis
            .tables_referenced
            .iter()
            .any(|t| t.contains("Customer")));
        assert!(analysis
            .columns_referenced
            .iter()
            .any(|c| c == "a.Balance"));
        assert!(analysis.parse_error.is_none());
    }

    #[test]
    fn test_parse_error_is_recorded_not_fatal() {
        let analysis =
            analyze_bind_parameters("SELEC * FORM Account WHERE x = :param", None);

        assert!(analysis.parse_error.is_some());
        // Textual extraction still found the parameter.
        assert_eq!(analysis.named_parameters(), vec!["param"]);
        assert!(analysis.tables_referenced.is_empty());
    }

    #[test]
    fn test_type_suggestions_from_schema() {
        let schema = banking_schema();
        let analysis = analyze_bind_parameters(
            "SELECT * FROM Account WHERE CustomerID = :CustomerID AND Balance > :min_balance",
            Some(&schema),
        );

        let suggestion = &analysis.parameter_suggestions[":CustomerID"];
        assert_eq!(suggestion.suggested_table, "Account");
        assert_eq!(suggestion.suggested_column, "CustomerID");
        assert_eq!(suggestion.data_type, "INTEGER");
        assert!(suggestion.not_null);
        assert!(!suggestion.is_primary_key);

        let balance = &analysis.parameter_suggestions[":min_balance"];
        assert_eq!(balance.suggested_column, "Balance");
        assert_eq!(balance.data_type, "DECIMAL(10,2)");
    }

    #[test]
    fn test_cast_colons_are_not_parameters() {
        let analysis = analyze_bind_parameters(
            "SELECT AccountID::text AS id FROM Account WHERE CustomerID = :CustomerID",
            None,
        );

        assert_eq!(analysis.named_parameters(), vec!["CustomerID"]);
        assert_eq!(analysis.parameters.len(), 1);
    }

    #[test]
    fn test_rewrite_preserves_postgres_casts() {
        let (sql, params) = rewrite_placeholders(
            "SELECT AccountID::text AS id FROM Account WHERE CustomerID = :CustomerID",
            DatabaseBackend::Postgres,
        );

        assert_eq!(
            sql,
            "SELECT AccountID::text AS id FROM Account WHERE CustomerID = $1"
        );
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name.as_deref(), Some("CustomerID"));
    }

    #[test]
    fn test_chained_casts_stay_intact() {
        let (sql, params) = rewrite_placeholders(
            "SELECT Balance::numeric::text FROM Account WHERE AccountID = :id",
            DatabaseBackend::Postgres,
        );

        assert_eq!(
            sql,
            "SELECT Balance::numeric::text FROM Account WHERE AccountID = $1"
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_no_parameters() {
        let analysis = analyze_bind_parameters("SELECT COUNT(*) FROM Account", None);
        assert!(analysis.parameters.is_empty());
        assert!(analysis.named_parameters().is_empty());
    }

    #[test]
    fn test_rewrite_placeholders_sqlite() {
        let (sql, params) = rewrite_placeholders(
            "SELECT * FROM Account WHERE CustomerID = :CustomerID AND AccountType = :acct_type",
            DatabaseBackend::Sqlite,
        );

        assert_eq!(
            sql,
            "SELECT * FROM Account WHERE CustomerID = ? AND AccountType = ?"
        );
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name.as_deref(), Some("CustomerID"));
    }

    #[test]
    fn test_rewrite_placeholders_postgres() {
        let (sql, params) = rewrite_placeholders(
            "SELECT * FROM Account WHERE CustomerID = :cid AND Balance > @min",
            DatabaseBackend::Postgres,
        );

        assert_eq!(
            sql,
            "SELECT * FROM Account WHERE CustomerID = $1 AND Balance > $2"
        );
        assert_eq!(params[1].name.as_deref(), Some("min"));
    }
}
