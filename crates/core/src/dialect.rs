//! The reporting dialect: a narrow, single-source query language.
//!
//! ```text
//! FROM <source> SHOW <field>[, <field> AS <alias>]* [WHERE <predicate>]
//!   [GROUP BY <field>[, <field>]*] [HAVING <predicate>]
//!   [ORDER BY <field> [ASC|DESC]] [LIMIT <n>]
//! ```
//!
//! Keywords are case-insensitive. Predicates and field expressions are kept as
//! opaque text; only the clause structure, the source and the limit are checked.

use thiserror::Error;

use crate::plan::DataSource;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DialectError {
    #[error("query must start with FROM")]
    MissingFrom,

    #[error("unknown data source {0:?}")]
    UnknownSource(String),

    #[error("query has no SHOW clause")]
    MissingShow,

    #[error("{0} clause is empty")]
    EmptyClause(&'static str),

    #[error("{0} clause is out of order or repeated")]
    OutOfOrder(&'static str),

    #[error("LIMIT must be a non-negative integer, got {0:?}")]
    InvalidLimit(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub expr: String,
    pub alias: Option<String>,
}

impl Field {
    pub fn new(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            alias: None,
        }
    }

    pub fn aliased(expr: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            alias: Some(alias.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// Parsed (or to-be-rendered) reporting query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub source: DataSource,
    pub fields: Vec<Field>,
    pub predicate: Option<String>,
    pub group_by: Vec<String>,
    pub having: Option<String>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Clause {
    From,
    Show,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
}

impl Clause {
    fn name(self) -> &'static str {
        match self {
            Clause::From => "FROM",
            Clause::Show => "SHOW",
            Clause::Where => "WHERE",
            Clause::GroupBy => "GROUP BY",
            Clause::Having => "HAVING",
            Clause::OrderBy => "ORDER BY",
            Clause::Limit => "LIMIT",
        }
    }
}

const KEYWORDS: [(Clause, &[&str]); 7] = [
    (Clause::From, &["FROM"]),
    (Clause::Show, &["SHOW"]),
    (Clause::Where, &["WHERE"]),
    (Clause::GroupBy, &["GROUP", "BY"]),
    (Clause::Having, &["HAVING"]),
    (Clause::OrderBy, &["ORDER", "BY"]),
    (Clause::Limit, &["LIMIT"]),
];

impl ReportQuery {
    pub fn new(source: DataSource, fields: Vec<Field>) -> Self {
        Self {
            source,
            fields,
            predicate: None,
            group_by: Vec::new(),
            having: None,
            order_by: None,
            limit: None,
        }
    }

    pub fn parse(text: &str) -> Result<Self, DialectError> {
        let clauses = split_clauses(text.trim())?;

        let mut clauses = clauses.into_iter();
        let source = match clauses.next() {
            Some((Clause::From, body)) => {
                let name = body.split_whitespace().next().unwrap_or_default();
                DataSource::parse(name).ok_or_else(|| DialectError::UnknownSource(name.to_string()))?
            }
            _ => return Err(DialectError::MissingFrom),
        };

        let mut query = ReportQuery::new(source, Vec::new());
        let mut saw_show = false;

        for (clause, body) in clauses {
            match clause {
                Clause::From => return Err(DialectError::OutOfOrder("FROM")),
                Clause::Show => {
                    saw_show = true;
                    query.fields = split_top_level(body, ',')
                        .into_iter()
                        .map(parse_field)
                        .collect::<Option<Vec<_>>>()
                        .ok_or(DialectError::EmptyClause("SHOW"))?;
                }
                Clause::Where => query.predicate = Some(body.to_string()),
                Clause::GroupBy => {
                    query.group_by = split_top_level(body, ',')
                        .into_iter()
                        .map(|g| Some(g.trim()).filter(|g| !g.is_empty()).map(str::to_string))
                        .collect::<Option<Vec<_>>>()
                        .ok_or(DialectError::EmptyClause("GROUP BY"))?;
                }
                Clause::Having => query.having = Some(body.to_string()),
                Clause::OrderBy => query.order_by = Some(parse_order_by(body)?),
                Clause::Limit => {
                    let n = body
                        .parse::<u64>()
                        .map_err(|_| DialectError::InvalidLimit(body.to_string()))?;
                    query.limit = Some(n);
                }
            }
        }

        if !saw_show {
            return Err(DialectError::MissingShow);
        }
        Ok(query)
    }

    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn with_group_by(mut self, field: impl Into<String>) -> Self {
        self.group_by.push(field.into());
        self
    }

    pub fn with_having(mut self, predicate: impl Into<String>) -> Self {
        self.having = Some(predicate.into());
        self
    }

    pub fn with_order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending,
        });
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl core::fmt::Display for ReportQuery {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "FROM {} SHOW ", self.source)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&field.expr)?;
            if let Some(alias) = &field.alias {
                write!(f, " AS {alias}")?;
            }
        }
        if let Some(predicate) = &self.predicate {
            write!(f, " WHERE {predicate}")?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY {}", self.group_by.join(", "))?;
        }
        if let Some(having) = &self.having {
            write!(f, " HAVING {having}")?;
        }
        if let Some(order) = &self.order_by {
            let dir = if order.descending { "DESC" } else { "ASC" };
            write!(f, " ORDER BY {} {dir}", order.field)?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}

/// Cut the text into `(clause, body)` pairs in order of appearance.
fn split_clauses(text: &str) -> Result<Vec<(Clause, &str)>, DialectError> {
    let bytes = text.as_bytes();
    let mut marks: Vec<(Clause, usize, usize)> = Vec::new();
    let mut in_quote = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\'' {
            in_quote = !in_quote;
            i += 1;
            continue;
        }
        let at_boundary = i == 0 || !is_word_byte(bytes[i - 1]);
        if !in_quote && at_boundary {
            if let Some((clause, end)) = KEYWORDS
                .iter()
                .find_map(|(clause, words)| match_keyword(bytes, i, words).map(|end| (*clause, end)))
            {
                marks.push((clause, i, end));
                i = end;
                continue;
            }
        }
        i += 1;
    }

    let mut clauses = Vec::with_capacity(marks.len());
    let mut last: Option<Clause> = None;
    for (n, (clause, _, body_start)) in marks.iter().enumerate() {
        if n == 0 && (*clause != Clause::From || marks[0].1 != 0) {
            return Err(DialectError::MissingFrom);
        }
        if last.is_some_and(|prev| prev >= *clause) {
            return Err(DialectError::OutOfOrder(clause.name()));
        }
        last = Some(*clause);

        let body_end = marks.get(n + 1).map(|m| m.1).unwrap_or(text.len());
        let body = text[*body_start..body_end].trim();
        if body.is_empty() {
            return Err(DialectError::EmptyClause(clause.name()));
        }
        clauses.push((*clause, body));
    }

    if clauses.is_empty() {
        return Err(DialectError::MissingFrom);
    }
    Ok(clauses)
}

fn match_keyword(bytes: &[u8], at: usize, words: &[&str]) -> Option<usize> {
    let mut i = at;
    for (n, word) in words.iter().enumerate() {
        if n > 0 {
            let gap = i;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i == gap {
                return None;
            }
        }
        let w = word.as_bytes();
        if bytes.len() < i + w.len() || !bytes[i..i + w.len()].eq_ignore_ascii_case(w) {
            return None;
        }
        i += w.len();
    }
    // Keyword must be followed by whitespace or end of input.
    if i < bytes.len() && !bytes[i].is_ascii_whitespace() {
        return None;
    }
    Some(i)
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Split on `sep` outside parentheses and single quotes.
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth -= 1,
            c if c == sep && !in_quote && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn parse_field(raw: &str) -> Option<Field> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let upper = raw.to_ascii_uppercase();
    if let Some(pos) = upper.rfind(" AS ") {
        let expr = raw[..pos].trim();
        let alias = raw[pos + 4..].trim();
        if !expr.is_empty() && !alias.is_empty() && !alias.contains(')') {
            return Some(Field::aliased(expr, alias));
        }
    }
    Some(Field::new(raw))
}

fn parse_order_by(body: &str) -> Result<OrderBy, DialectError> {
    let mut tokens: Vec<&str> = body.split_whitespace().collect();
    let descending = match tokens.last().map(|t| t.to_ascii_uppercase()) {
        Some(t) if t == "DESC" => {
            tokens.pop();
            true
        }
        Some(t) if t == "ASC" => {
            tokens.pop();
            false
        }
        _ => false,
    };
    if tokens.is_empty() {
        return Err(DialectError::EmptyClause("ORDER BY"));
    }
    Ok(OrderBy {
        field: tokens.join(" "),
        descending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_ranking_query() {
        let q = ReportQuery::parse(
            "FROM orders SHOW product_name, SUM(quantity) AS total_quantity \
             GROUP BY product_name ORDER BY total_quantity DESC LIMIT 5",
        )
        .unwrap();

        assert_eq!(q.source, DataSource::Orders);
        assert_eq!(
            q.fields,
            vec![
                Field::new("product_name"),
                Field::aliased("SUM(quantity)", "total_quantity"),
            ]
        );
        assert_eq!(q.group_by, vec!["product_name".to_string()]);
        assert_eq!(
            q.order_by,
            Some(OrderBy {
                field: "total_quantity".into(),
                descending: true
            })
        );
        assert_eq!(q.limit, Some(5));
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let q = ReportQuery::parse("from Customers show customer_email where total_spent > 100").unwrap();
        assert_eq!(q.source, DataSource::Customers);
        assert_eq!(q.predicate.as_deref(), Some("total_spent > 100"));
    }

    #[test]
    fn keywords_inside_quotes_are_ignored() {
        let q = ReportQuery::parse("FROM products SHOW product_name WHERE product_name = 'Show Limit'").unwrap();
        assert_eq!(q.predicate.as_deref(), Some("product_name = 'Show Limit'"));
        assert_eq!(q.limit, None);
    }

    #[test]
    fn commas_inside_function_calls_do_not_split_fields() {
        let q = ReportQuery::parse(
            "FROM orders SHOW product_name WHERE created_at >= DATE_SUB(NOW(), INTERVAL 30 DAY)",
        )
        .unwrap();
        assert_eq!(q.fields.len(), 1);
        assert_eq!(q.predicate.as_deref(), Some("created_at >= DATE_SUB(NOW(), INTERVAL 30 DAY)"));
    }

    #[test]
    fn rejects_unknown_sources_and_missing_clauses() {
        assert_eq!(
            ReportQuery::parse("FROM refunds SHOW amount"),
            Err(DialectError::UnknownSource("refunds".into()))
        );
        assert_eq!(ReportQuery::parse("FROM orders"), Err(DialectError::MissingShow));
        assert_eq!(ReportQuery::parse("FROM"), Err(DialectError::EmptyClause("FROM")));
        assert_eq!(ReportQuery::parse("FROM orders WHERE x = 1"), Err(DialectError::MissingShow));
        assert_eq!(ReportQuery::parse("SHOW x FROM orders"), Err(DialectError::MissingFrom));
        assert_eq!(ReportQuery::parse("Here is your query"), Err(DialectError::MissingFrom));
    }

    #[test]
    fn rejects_out_of_order_clauses_and_bad_limits() {
        assert_eq!(
            ReportQuery::parse("FROM orders SHOW x LIMIT 5 WHERE y = 1"),
            Err(DialectError::OutOfOrder("WHERE"))
        );
        assert_eq!(
            ReportQuery::parse("FROM orders SHOW x LIMIT five"),
            Err(DialectError::InvalidLimit("five".into()))
        );
    }

    #[test]
    fn rendered_queries_parse_back_to_the_same_structure() {
        let q = ReportQuery::new(
            DataSource::Customers,
            vec![
                Field::new("customer_email"),
                Field::aliased("COUNT(order_id)", "order_count"),
            ],
        )
        .with_group_by("customer_email")
        .with_having("order_count > 1");

        let text = q.to_string();
        assert_eq!(
            text,
            "FROM customers SHOW customer_email, COUNT(order_id) AS order_count \
             GROUP BY customer_email HAVING order_count > 1"
        );
        assert_eq!(ReportQuery::parse(&text), Ok(q));
    }
}
