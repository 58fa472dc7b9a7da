//! # Schema selection
//!
//! Picks the part of the catalog a question is about, so the model sees a
//! handful of relevant tables instead of everything ingested. Ranking is
//! pluggable through [`RankingStrategy`]; [`LexicalRanker`] is the default.
use crate::catalog::SchemaCatalog;
use crate::catalog::TableSchema;
use crate::config::SelectorConfig;
use std::collections::HashSet;
use std::sync::Arc;

const TABLE_WEIGHT: f64 = 3.0;
const COLUMN_WEIGHT: f64 = 2.0;
const SAMPLE_WEIGHT: f64 = 1.0;

const STOPWORDS: [&str; 48] = [
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "by", "did", "do", "does", "each", "for", "from",
    "give", "has", "have", "how", "in", "is", "it", "list", "many", "me", "much", "of", "on", "or", "per", "show",
    "tell", "than", "that", "the", "their", "there", "this", "to", "was", "were", "what", "when", "which", "who",
    "with",
];

/// Relevance of one table to a question.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableScore {
    pub score: f64,
    /// One score per column, in column order
    pub columns: Vec<f64>,
}

/// Scores tables against a question; higher is more relevant, zero is unrelated.
pub trait RankingStrategy: Send + Sync {
    fn score(&self, question: &str, table: &TableSchema) -> TableScore;
}

/// Token overlap between the question and table names, column names, labels
/// and sample values, weighted in that order.
#[derive(Clone, Copy, Debug, Default)]
pub struct LexicalRanker;

impl RankingStrategy for LexicalRanker {
    fn score(&self, question: &str, table: &TableSchema) -> TableScore {
        let question: HashSet<String> = tokenize(question).into_iter().collect();
        let matches = |text: &str| tokenize(text).iter().filter(|token| question.contains(*token)).count() as f64;

        let columns: Vec<f64> = table
            .columns
            .iter()
            .map(|column| {
                let name = matches(&column.name).max(matches(&column.label));
                let samples: f64 = column.samples.iter().map(|sample| matches(sample)).sum();
                COLUMN_WEIGHT * name + SAMPLE_WEIGHT * samples
            })
            .collect();
        let name = matches(&table.name).max(matches(&table.source.sheet));
        TableScore {
            score: TABLE_WEIGHT * name + columns.iter().sum::<f64>(),
            columns,
        }
    }
}

/// Lower-cased word tokens without stopwords, with a trailing plural `s` removed.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|token| token.chars().count() >= 2 && !STOPWORDS.contains(&token.as_str()))
        .map(|token| {
            let stem = token.len().saturating_sub(1);
            if token.ends_with('s') && stem >= 3 && !token[..stem].ends_with('s') {
                token[..stem].to_owned()
            } else {
                token
            }
        })
        .collect()
}

/// The tables and columns offered to the model for one question.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaSlice {
    catalog_version: u64,
    tables: Vec<TableSchema>,
    /// Tables offered with only some of their columns
    trimmed: Vec<String>,
}

impl SchemaSlice {
    pub fn new(catalog_version: u64, tables: Vec<TableSchema>) -> Self {
        SchemaSlice {
            catalog_version,
            tables,
            trimmed: Vec::new(),
        }
    }

    /// Marks `names` as tables whose column list was cut to fit the budget.
    pub fn with_trimmed(mut self, names: Vec<String>) -> Self {
        self.trimmed = names;
        self
    }

    /// Whether the slice holds only some of the columns of `name`.
    pub fn is_trimmed(&self, name: &str) -> bool {
        self.trimmed.iter().any(|trimmed| trimmed.eq_ignore_ascii_case(name))
    }

    /// Version of the catalog the slice was cut from
    pub fn catalog_version(&self) -> u64 {
        self.catalog_version
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Looks a table up by name, ignoring case.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|table| table.name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|table| table.name.to_owned()).collect()
    }

    pub fn render(&self) -> String {
        self.tables
            .iter()
            .map(|table| match self.is_trimmed(&table.name) {
                true => format!(
                    "{}Only these columns of {} may be used; list them explicitly instead of `*`.\n",
                    table.render(),
                    table.name
                ),
                false => table.render(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct SchemaSelector {
    ranker: Arc<dyn RankingStrategy>,
    top_k: usize,
    column_budget: usize,
}

impl SchemaSelector {
    pub fn new(config: &SelectorConfig, ranker: Arc<dyn RankingStrategy>) -> Self {
        SchemaSelector {
            ranker,
            top_k: config.top_k.max(1),
            column_budget: config.column_budget.max(1),
        }
    }

    /// Cuts the slice of `catalog` relevant to `question`.
    ///
    /// A catalog of at most `top_k` tables is returned whole. Otherwise the
    /// best-scoring tables are taken while their columns fit the budget; when
    /// nothing scores, the most recently ingested tables are used instead.
    /// The slice is empty only for an empty catalog.
    pub fn select(&self, question: &str, catalog: &SchemaCatalog) -> SchemaSlice {
        let version = catalog.version();
        if catalog.len() <= self.top_k {
            return SchemaSlice::new(version, catalog.snapshot().to_vec());
        }

        let mut ranked: Vec<(&TableSchema, TableScore)> = catalog
            .snapshot()
            .iter()
            .map(|table| (table, self.ranker.score(question, table)))
            .filter(|(_, score)| score.score > 0.0)
            .collect();
        if ranked.is_empty() {
            log::debug!("No table matches the question; using the {} most recent tables", self.top_k);
            ranked = catalog
                .most_recent(self.top_k)
                .into_iter()
                .map(|table| (table, TableScore::default()))
                .collect();
        } else {
            // Stable sort: equal scores keep catalog order.
            ranked.sort_by(|(_, left), (_, right)| right.score.total_cmp(&left.score));
        }

        let mut tables: Vec<TableSchema> = Vec::new();
        let mut trimmed: Vec<String> = Vec::new();
        let mut used = 0usize;
        for (table, score) in ranked {
            if tables.len() == self.top_k {
                break;
            }
            if used + table.columns.len() <= self.column_budget {
                used += table.columns.len();
                tables.push(table.clone());
            } else if tables.is_empty() {
                let cut = trim_columns(table, &score, self.column_budget);
                used += cut.columns.len();
                if cut.columns.len() < table.columns.len() {
                    trimmed.push(cut.name.to_owned());
                }
                tables.push(cut);
            }
        }
        SchemaSlice::new(version, tables).with_trimmed(trimmed)
    }
}

/// Keeps the `budget` best-scoring columns of a table, in their original order.
fn trim_columns(table: &TableSchema, score: &TableScore, budget: usize) -> TableSchema {
    let mut order: Vec<usize> = (0..table.columns.len()).collect();
    let column_score = |index: usize| score.columns.get(index).copied().unwrap_or(0.0);
    order.sort_by(|left, right| column_score(*right).total_cmp(&column_score(*left)));
    let mut keep: Vec<usize> = order.into_iter().take(budget.max(1)).collect();
    keep.sort_unstable();

    let mut trimmed = table.clone();
    trimmed.columns = keep.into_iter().map(|index| table.columns[index].clone()).collect();
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::table;
    use crate::database::column::ColumnType;

    fn config(top_k: usize, column_budget: usize) -> SelectorConfig {
        SelectorConfig { top_k, column_budget }
    }

    fn selector(top_k: usize, column_budget: usize) -> SchemaSelector {
        SchemaSelector::new(&config(top_k, column_budget), Arc::new(LexicalRanker))
    }

    fn catalog() -> SchemaCatalog {
        let mut catalog = SchemaCatalog::new(7);
        catalog.register(table("students", "school.xlsx", &[("name", ColumnType::Text), ("grade", ColumnType::Integer)])).unwrap();
        catalog.register(table("teachers", "school.xlsx", &[("name", ColumnType::Text), ("subject", ColumnType::Text)])).unwrap();
        catalog.register(table("sales_q1", "sales.xlsx", &[("region", ColumnType::Text), ("units", ColumnType::Integer)])).unwrap();
        catalog.register(table("costs", "costs.csv", &[("region", ColumnType::Text), ("amount", ColumnType::Real)])).unwrap();
        catalog
    }

    fn names(slice: &SchemaSlice) -> Vec<String> {
        slice.table_names()
    }

    #[test]
    fn small_catalogs_are_returned_whole() {
        let slice = selector(5, 64).select("anything at all", &catalog());
        assert_eq!(slice.catalog_version(), 7);
        assert_eq!(names(&slice), vec!["students", "teachers", "sales_q1", "costs"]);
        assert!(selector(5, 64).select("q", &SchemaCatalog::default()).is_empty());
    }

    #[test]
    fn ranks_by_lexical_overlap() {
        let slice = selector(2, 64).select("How many units were sold per region?", &catalog());
        assert_eq!(names(&slice), vec!["sales_q1", "costs"]);

        let slice = selector(1, 64).select("Which teachers teach each subject?", &catalog());
        assert_eq!(names(&slice), vec!["teachers"]);
    }

    #[test]
    fn unmatched_questions_fall_back_to_recent_tables() {
        let slice = selector(2, 64).select("xyzzy?", &catalog());
        assert_eq!(names(&slice), vec!["costs", "sales_q1"]);
    }

    #[test]
    fn column_budget_limits_tables() {
        let slice = selector(3, 3).select("region name", &catalog());
        let columns: usize = slice.tables().iter().map(|table| table.columns.len()).sum();
        assert!(columns <= 3);
        assert_eq!(slice.tables().len(), 1);
    }

    #[test]
    fn oversized_first_table_is_trimmed() {
        let mut catalog = SchemaCatalog::new(1);
        for name in ["a", "b", "c"] {
            catalog.register(table(name, "x.xlsx", &[("id", ColumnType::Integer)])).unwrap();
        }
        catalog
            .register(table(
                "orders",
                "orders.xlsx",
                &[("id", ColumnType::Integer), ("customer", ColumnType::Text), ("total", ColumnType::Real)],
            ))
            .unwrap();
        let slice = selector(2, 2).select("total per customer", &catalog);
        assert_eq!(names(&slice), vec!["orders"]);
        let columns: Vec<&str> = slice.tables()[0].columns.iter().map(|column| column.name.as_str()).collect();
        assert_eq!(columns, vec!["customer", "total"]);
        assert!(slice.is_trimmed("orders"));
        assert!(slice.render().contains("instead of `*`"));

        let whole = selector(5, 64).select("total per customer", &catalog);
        assert!(!whole.is_trimmed("orders"));
        assert!(!whole.render().contains("instead of `*`"));
    }

    #[test]
    fn ranking_is_pluggable() {
        struct Prefers(&'static str);
        impl RankingStrategy for Prefers {
            fn score(&self, _question: &str, table: &TableSchema) -> TableScore {
                TableScore {
                    score: if table.name == self.0 { 1.0 } else { 0.0 },
                    columns: vec![0.0; table.columns.len()],
                }
            }
        }
        let selector = SchemaSelector::new(&config(1, 64), Arc::new(Prefers("students")));
        assert_eq!(names(&selector.select("units", &catalog())), vec!["students"]);
    }

    #[test]
    fn tokens() {
        assert_eq!(tokenize("How many Units per Region?"), vec!["unit", "region"]);
        assert_eq!(tokenize("sales_q1"), vec!["sale", "q1"]);
        assert_eq!(tokenize("class address"), vec!["class", "address"]);
    }
}
