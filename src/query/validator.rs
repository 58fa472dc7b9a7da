//! Static checks on generated SQL.
//!
//! A statement passes when it parses as exactly one DuckDB query, writes
//! nothing, and references only tables and columns of the schema slice it was
//! generated against. CTE names, table aliases, derived-table aliases, their
//! column lists and projection aliases count as known references. A `*` over
//! a table the slice holds only in part is rejected.
use crate::catalog::TableSchema;
use crate::selector::SchemaSlice;
use sqlparser::ast::Expr;
use sqlparser::ast::ObjectName;
use sqlparser::ast::Query;
use sqlparser::ast::SelectItem;
use sqlparser::ast::SelectItemQualifiedWildcardKind;
use sqlparser::ast::SetExpr;
use sqlparser::ast::Statement;
use sqlparser::ast::TableAlias;
use sqlparser::ast::TableFactor;
use sqlparser::ast::Visit;
use sqlparser::ast::Visitor;
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;
use std::collections::HashMap;
use std::collections::HashSet;
use std::ops::ControlFlow;
use thiserror::Error;

/// Bare identifiers DuckDB resolves without a table.
const BUILTIN_IDENTIFIERS: [&str; 6] = ["current_date", "current_timestamp", "current_time", "true", "false", "null"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Empty statement")]
    Empty,

    #[error("SQL parse error: {0}")]
    Parse(String),

    #[error("Expected a single statement, found {0}")]
    StatementCount(usize),

    #[error("Only read-only SELECT queries are allowed, found {0}")]
    NotReadOnly(String),

    #[error("Unknown table '{0}' (available tables: {1})")]
    UnknownTable(String, String),

    #[error("Unknown column '{0}' (available columns: {1})")]
    UnknownColumn(String, String),

    #[error("'{0}.*' reads columns outside the schema; select these columns by name instead: {1}")]
    PartialWildcard(String, String),
}

/// Parses `sql` and checks it is a single read-only query.
pub fn ensure_read_only(sql: &str) -> Result<Statement, ValidationError> {
    collect(sql).map(|(statement, _)| statement)
}

/// Checks `sql` against the tables and columns of `slice`.
pub fn validate(sql: &str, slice: &SchemaSlice) -> Result<Statement, ValidationError> {
    let (statement, references) = collect(sql)?;
    references.check(slice)?;
    Ok(statement)
}

/// Names of the slice tables `sql` reads, in slice order.
pub fn referenced_tables(sql: &str, slice: &SchemaSlice) -> Result<Vec<String>, ValidationError> {
    let (_, references) = collect(sql)?;
    Ok(slice
        .tables()
        .iter()
        .filter(|table| references.relations.iter().any(|relation| relation.eq_ignore_ascii_case(&table.name)))
        .map(|table| table.name.to_owned())
        .collect())
}

fn collect(sql: &str) -> Result<(Statement, ReferenceCollector), ValidationError> {
    if sql.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    let mut statements =
        Parser::parse_sql(&DuckDbDialect {}, sql).map_err(|e| ValidationError::Parse(e.to_string()))?;
    match statements.len() {
        0 => return Err(ValidationError::Empty),
        1 => {}
        count => return Err(ValidationError::StatementCount(count)),
    }
    let statement = statements.remove(0);
    let mut collector = ReferenceCollector::default();
    let _ = statement.visit(&mut collector);
    if let Some(violation) = collector.violation.take() {
        return Err(ValidationError::NotReadOnly(violation));
    }
    Ok((statement, collector))
}

/// Names gathered from one statement, checked once the whole tree is seen.
#[derive(Default)]
struct ReferenceCollector {
    violation: Option<String>,
    relations: Vec<String>,
    ctes: HashSet<String>,
    /// Table alias to the aliased table; `None` for derived tables
    aliases: HashMap<String, Option<String>>,
    column_aliases: HashSet<String>,
    identifiers: Vec<Vec<String>>,
    /// Tables or qualifiers expanded by `*` and `x.*`
    wildcards: Vec<String>,
}

impl Visitor for ReferenceCollector {
    type Break = ();

    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<Self::Break> {
        match statement {
            Statement::Query(_) => ControlFlow::Continue(()),
            other => {
                let text = other.to_string();
                let keyword = text.split_whitespace().next().unwrap_or_default().to_ascii_uppercase();
                self.violation = Some(keyword);
                ControlFlow::Break(())
            }
        }
    }

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(normalize_identifier(&cte.alias.name.value));
                self.collect_alias_columns(&cte.alias);
            }
        }
        self.collect_projection_aliases(&query.body)
    }

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<Self::Break> {
        match table_factor {
            TableFactor::Table { name, alias: Some(alias), .. } => {
                let target = normalize_relation_name(&name.to_string());
                self.aliases.insert(normalize_identifier(&alias.name.value), Some(target));
                self.collect_alias_columns(alias);
            }
            TableFactor::Derived { alias: Some(alias), .. } => {
                self.aliases.insert(normalize_identifier(&alias.name.value), None);
                self.collect_alias_columns(alias);
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        self.relations.push(normalize_relation_name(&relation.to_string()));
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Identifier(ident) => self.identifiers.push(vec![normalize_identifier(&ident.value)]),
            Expr::CompoundIdentifier(parts) => self
                .identifiers
                .push(parts.iter().map(|part| normalize_identifier(&part.value)).collect()),
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

impl ReferenceCollector {
    fn collect_projection_aliases(&mut self, body: &SetExpr) -> ControlFlow<()> {
        match body {
            SetExpr::Select(select) => {
                if select.into.is_some() {
                    self.violation = Some("SELECT INTO".to_owned());
                    return ControlFlow::Break(());
                }
                for item in &select.projection {
                    match item {
                        SelectItem::ExprWithAlias { alias, .. } => {
                            self.column_aliases.insert(normalize_identifier(&alias.value));
                        }
                        SelectItem::Wildcard(_) => {
                            for from in &select.from {
                                let factors = std::iter::once(&from.relation).chain(from.joins.iter().map(|join| &join.relation));
                                self.wildcards.extend(factors.filter_map(table_name));
                            }
                        }
                        SelectItem::QualifiedWildcard(SelectItemQualifiedWildcardKind::ObjectName(name), _) => {
                            self.wildcards.push(normalize_relation_name(&name.to_string()));
                        }
                        _ => {}
                    }
                }
                ControlFlow::Continue(())
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.collect_projection_aliases(left)?;
                self.collect_projection_aliases(right)
            }
            _ => ControlFlow::Continue(()),
        }
    }

    fn collect_alias_columns(&mut self, alias: &TableAlias) {
        for column in &alias.columns {
            self.column_aliases.insert(normalize_identifier(&column.name.value));
        }
    }

    fn check(&self, slice: &SchemaSlice) -> Result<(), ValidationError> {
        let mut referenced: Vec<&TableSchema> = Vec::new();
        for relation in &self.relations {
            if self.ctes.contains(relation) {
                continue;
            }
            match slice.table(relation) {
                Some(table) => {
                    if !referenced.iter().any(|other| other.name == table.name) {
                        referenced.push(table);
                    }
                }
                None => {
                    return Err(ValidationError::UnknownTable(relation.to_owned(), available_tables(slice)));
                }
            }
        }
        let in_scope: Vec<&TableSchema> = if referenced.is_empty() {
            slice.tables().iter().collect()
        } else {
            referenced
        };

        for parts in &self.identifiers {
            match parts.as_slice() {
                [] => {}
                [name] => {
                    let known = in_scope.iter().any(|table| table.column(name).is_some())
                        || self.column_aliases.contains(name)
                        || self.aliases.contains_key(name)
                        || self.ctes.contains(name)
                        || BUILTIN_IDENTIFIERS.contains(&name.as_str());
                    if !known {
                        return Err(ValidationError::UnknownColumn(name.to_owned(), available_columns(&in_scope)));
                    }
                }
                [.., qualifier, column] => self.check_qualified(slice, qualifier, column)?,
            }
        }
        self.check_wildcards(slice)
    }

    /// A wildcard over a trimmed table would return the columns left out.
    fn check_wildcards(&self, slice: &SchemaSlice) -> Result<(), ValidationError> {
        for source in &self.wildcards {
            let target = match self.aliases.get(source) {
                Some(Some(table)) => table.as_str(),
                Some(None) => continue,
                None => source.as_str(),
            };
            if self.ctes.contains(target) {
                continue;
            }
            if let Some(table) = slice.table(target).filter(|table| slice.is_trimmed(&table.name)) {
                return Err(ValidationError::PartialWildcard(table.name.to_owned(), available_columns(&[table])));
            }
        }
        Ok(())
    }

    fn check_qualified(&self, slice: &SchemaSlice, qualifier: &str, column: &str) -> Result<(), ValidationError> {
        let target = match self.aliases.get(qualifier) {
            Some(Some(table)) => table.as_str(),
            Some(None) => return Ok(()),
            None => qualifier,
        };
        if self.ctes.contains(target) {
            return Ok(());
        }
        match slice.table(target) {
            Some(table) if table.column(column).is_some() => Ok(()),
            Some(table) => Err(ValidationError::UnknownColumn(
                format!("{}.{}", table.name, column),
                available_columns(&[table]),
            )),
            None => Err(ValidationError::UnknownTable(qualifier.to_owned(), available_tables(slice))),
        }
    }
}

fn table_name(factor: &TableFactor) -> Option<String> {
    match factor {
        TableFactor::Table { name, .. } => Some(normalize_relation_name(&name.to_string())),
        _ => None,
    }
}

fn available_tables(slice: &SchemaSlice) -> String {
    slice.tables().iter().map(|table| table.name.as_str()).collect::<Vec<_>>().join(", ")
}

fn available_columns(tables: &[&TableSchema]) -> String {
    let qualify = tables.len() > 1;
    tables
        .iter()
        .flat_map(|table| {
            table.columns.iter().map(move |column| match qualify {
                true => format!("{}.{}", table.name, column.name),
                false => column.name.to_owned(),
            })
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Lower-cases an identifier and strips surrounding double quotes.
fn normalize_identifier(ident: &str) -> String {
    let ident = ident.trim();
    ident
        .strip_prefix('"')
        .and_then(|ident| ident.strip_suffix('"'))
        .unwrap_or(ident)
        .to_ascii_lowercase()
}

/// Reduces a possibly schema-qualified name to its last part.
///
/// Dots inside double quotes do not split, so `"my.schema"."sales"` is `sales`.
fn normalize_relation_name(name: &str) -> String {
    let mut in_quotes = false;
    let mut start = 0usize;
    for (index, ch) in name.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '.' if !in_quotes => start = index + 1,
            _ => {}
        }
    }
    normalize_identifier(&name[start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::table;
    use crate::database::column::ColumnType;

    fn slice() -> SchemaSlice {
        SchemaSlice::new(
            1,
            vec![
                table("sales_q1", "sales.xlsx", &[("region", ColumnType::Text), ("units", ColumnType::Integer)]),
                table("costs", "costs.csv", &[("region", ColumnType::Text), ("amount", ColumnType::Real)]),
            ],
        )
    }

    #[test]
    fn accepts_grouped_sum() {
        let sql = "SELECT region, SUM(units) AS total_units FROM sales_q1 GROUP BY region ORDER BY total_units DESC";
        assert!(validate(sql, &slice()).is_ok());
    }

    #[test]
    fn accepts_aliases_ctes_and_joins() {
        let sql = "WITH totals AS (SELECT region, SUM(units) AS units_sum FROM sales_q1 GROUP BY region) \
                   SELECT t.region, t.units_sum, c.amount FROM totals t JOIN costs AS c ON c.region = t.region";
        assert!(validate(sql, &slice()).is_ok());
        let derived = "SELECT d.n FROM (SELECT count(*) AS n FROM \"SALES_Q1\") AS d WHERE d.n > 0";
        assert!(validate(derived, &slice()).is_ok());
        assert!(validate("SELECT current_date", &slice()).is_ok());
    }

    #[test]
    fn rejects_unknown_references() {
        let error = validate("SELECT revenue FROM sales_q1", &slice()).unwrap_err();
        assert_eq!(error, ValidationError::UnknownColumn("revenue".to_owned(), "region, units".to_owned()));

        let error = validate("SELECT * FROM orders", &slice()).unwrap_err();
        assert!(matches!(error, ValidationError::UnknownTable(name, _) if name == "orders"));

        let error = validate("SELECT sales_q1.amount FROM sales_q1", &slice()).unwrap_err();
        assert!(matches!(error, ValidationError::UnknownColumn(name, _) if name == "sales_q1.amount"));

        assert!(validate("SELECT * FROM read_csv('/etc/passwd')", &slice()).is_err());
    }

    #[test]
    fn accepts_alias_column_lists() {
        let cte = "WITH t(r, u) AS (SELECT region, units FROM sales_q1) SELECT r, SUM(u) AS total FROM t GROUP BY r";
        assert!(validate(cte, &slice()).is_ok());
        let derived = "SELECT d.r, d.n FROM (SELECT region, count(*) FROM sales_q1 GROUP BY region) AS d(r, n)";
        assert!(validate(derived, &slice()).is_ok());
        let table = "SELECT r FROM sales_q1 AS s(r, u) WHERE u > 1";
        assert!(validate(table, &slice()).is_ok());
    }

    #[test]
    fn wildcards_stay_inside_trimmed_tables() {
        let trimmed = SchemaSlice::new(
            1,
            vec![table("orders", "orders.xlsx", &[("customer", ColumnType::Text), ("total", ColumnType::Real)])],
        )
        .with_trimmed(vec!["orders".to_owned()]);
        let partial = ValidationError::PartialWildcard("orders".to_owned(), "customer, total".to_owned());
        assert_eq!(validate("SELECT * FROM orders", &trimmed).unwrap_err(), partial);
        assert_eq!(validate("SELECT o.* FROM orders o", &trimmed).unwrap_err(), partial);
        assert_eq!(validate("SELECT orders.* FROM orders", &trimmed).unwrap_err(), partial);
        assert!(matches!(validate("SELECT secret FROM orders", &trimmed), Err(ValidationError::UnknownColumn(_, _))));

        assert!(validate("SELECT customer, total FROM orders", &trimmed).is_ok());
        assert!(validate("SELECT count(*) FROM orders", &trimmed).is_ok());
        assert!(validate("SELECT d.* FROM (SELECT customer FROM orders) AS d", &trimmed).is_ok());
        assert!(validate("WITH c AS (SELECT customer FROM orders) SELECT * FROM c", &trimmed).is_ok());
        assert!(validate("SELECT * FROM sales_q1", &slice()).is_ok());
    }

    #[test]
    fn rejects_writes_and_multiple_statements() {
        for sql in [
            "DELETE FROM sales_q1",
            "DROP TABLE sales_q1",
            "INSERT INTO sales_q1 VALUES ('x', 1)",
            "UPDATE sales_q1 SET units = 0",
            "CREATE TABLE t AS SELECT * FROM sales_q1",
        ] {
            assert!(matches!(ensure_read_only(sql), Err(ValidationError::NotReadOnly(_))), "{sql}");
        }
        assert_eq!(
            ensure_read_only("SELECT 1; SELECT 2").unwrap_err(),
            ValidationError::StatementCount(2)
        );
        assert_eq!(ensure_read_only("  ").unwrap_err(), ValidationError::Empty);
        assert!(matches!(ensure_read_only("SELEC 1"), Err(ValidationError::Parse(_))));
    }

    #[test]
    fn lists_referenced_tables() {
        let sql = "SELECT s.region FROM sales_q1 s JOIN costs c ON c.region = s.region";
        assert_eq!(referenced_tables(sql, &slice()).unwrap(), vec!["sales_q1", "costs"]);
        assert!(referenced_tables("SELECT 1", &slice()).unwrap().is_empty());
    }

    #[test]
    fn relation_names() {
        assert_eq!(normalize_relation_name("main.Sales_Q1"), "sales_q1");
        assert_eq!(normalize_relation_name("\"my.schema\".\"Sales\""), "sales");
    }
}
