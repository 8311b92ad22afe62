//! Statement validation applied to every compiled query, whichever path
//! produced it. A statement that fails here never reaches the store.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::error::{QaError, QaResult};
use crate::types::{CompiledQuery, ExtractedEntities};

static FORBIDDEN_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(insert|update|delete|merge|upsert|drop|alter|create|truncate|grant|revoke|into|set|reset|copy|do|call|execute|prepare|deallocate|vacuum|analyze|reindex|cluster|comment|lock|listen|notify|unlisten|refresh|discard|begin|commit|rollback|savepoint)\b",
    )
    .expect("forbidden keyword regex is valid")
});

static FORBIDDEN_OBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bpg_\w*|\binformation_schema\b|\bdblink\w*|\blo_import\b|\blo_export\b|\bset_config\b|\bcurrent_setting\b|\bgenerate_series\b|\bquery_to_xml\w*",
    )
    .expect("forbidden object regex is valid")
});

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d+)").expect("placeholder regex is valid"));

/// `$` not followed by a digit: dollar quoting.
static DOLLAR_QUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(?:[^0-9]|$)").expect("dollar quote regex is valid"));

static STRING_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([^']*)'").expect("string literal regex is valid"));

/// `EXTRACT(YEAR FROM col)` is not a table reference.
static EXTRACT_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bextract\s*\(\s*\w+\s+from\b").expect("extract regex is valid")
});

static TABLE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:from|join)\s+([A-Za-z_"][\w."]*|\()"#).expect("table reference regex is valid")
});

static CTE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\w+)\s+as\s*\(").expect("cte regex is valid"));

static GOVERNMENT_FILTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bgovernment_number\s*(?:=|<>|!=|<|>|\bin\b|\bbetween\b|\bis\b)")
        .expect("government filter regex is valid")
});

/// Set of `$n` indices appearing in a statement.
pub(crate) fn placeholder_indices(sql: &str) -> BTreeSet<usize> {
    PLACEHOLDER_RE
        .captures_iter(sql)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect()
}

pub struct SqlValidator {
    table: String,
}

impl SqlValidator {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_lowercase(),
        }
    }

    /// Reject anything that is not a single parameterised read over the
    /// decisions table, or that filters on a government the user never named.
    pub fn validate(&self, query: &CompiledQuery, entities: &ExtractedEntities) -> QaResult<()> {
        let sql = query.sql.trim();
        let lower = sql.to_lowercase();

        if !(lower.starts_with("select") || lower.starts_with("with")) {
            return Err(reject("statement must be a SELECT"));
        }
        if sql.contains("--") || sql.contains("/*") || sql.contains(';') {
            return Err(reject("comments and statement separators are not allowed"));
        }
        if let Some(m) = FORBIDDEN_KEYWORD_RE.find(sql) {
            return Err(reject(&format!("forbidden keyword '{}'", m.as_str())));
        }
        if let Some(m) = FORBIDDEN_OBJECT_RE.find(sql) {
            return Err(reject(&format!("forbidden object '{}'", m.as_str())));
        }
        if DOLLAR_QUOTE_RE.is_match(sql) {
            return Err(reject("dollar quoting is not allowed"));
        }
        for literal in STRING_LITERAL_RE.captures_iter(sql) {
            let content = literal.get(1).map(|m| m.as_str()).unwrap_or_default();
            if !content.chars().all(|c| c == '%' || c == '_') {
                return Err(reject("values must be passed as parameters"));
            }
        }

        self.check_tables(sql)?;

        let indices = placeholder_indices(sql);
        let expected: BTreeSet<usize> = (1..=query.params.len()).collect();
        if indices != expected {
            return Err(QaError::Validation(format!(
                "placeholder/parameter mismatch: {} parameters, placeholders {:?}",
                query.params.len(),
                indices
            )));
        }

        if entities.government_number.is_none() && GOVERNMENT_FILTER_RE.is_match(sql) {
            return Err(reject("government filter without a government in the question"));
        }
        Ok(())
    }

    fn check_tables(&self, sql: &str) -> QaResult<()> {
        let cleaned = EXTRACT_FROM_RE.replace_all(sql, "extract(");
        let ctes: BTreeSet<String> = CTE_NAME_RE
            .captures_iter(&cleaned)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_lowercase()))
            .collect();

        for capture in TABLE_REF_RE.captures_iter(&cleaned) {
            let target = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            if target == "(" {
                continue;
            }
            let name = target.trim_matches('"').to_lowercase();
            let name = name.strip_prefix("public.").unwrap_or(&name);
            if name != self.table && !ctes.contains(name) {
                return Err(reject(&format!("table '{}' is not queryable", name)));
            }
        }
        Ok(())
    }
}

fn reject(reason: &str) -> QaError {
    QaError::Validation(format!("unsafe statement: {}", reason))
}
