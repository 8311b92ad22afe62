//! Narrow schema description handed to the model for query synthesis.

use crate::extract::CATEGORIES;

/// Columns returned by list-shaped templates.
pub const LIST_COLUMNS: &str = "id, decision_number, government_number, decision_date, decision_title, \
     summary, operativity, tags_policy_area, prime_minister, decision_url";

/// List columns plus the full decision text.
pub const DETAIL_COLUMNS: &str = "id, decision_number, government_number, decision_date, decision_title, \
     summary, decision_content, operativity, tags_policy_area, prime_minister, decision_url";

pub const OPERATIVE: &str = "אופרטיבית";
pub const DECLARATIVE: &str = "דקלרטיבית";

pub fn schema_description(table: &str) -> String {
    let tags: Vec<&str> = CATEGORIES.iter().map(|c| c.tag).collect();
    format!(
        "Table {table} (one row per government decision):\n\
         - id BIGINT primary key\n\
         - decision_number TEXT (e.g. '1234'; unique only within a government)\n\
         - government_number INTEGER (the government that made the decision, e.g. 37)\n\
         - decision_date DATE\n\
         - decision_title TEXT (Hebrew)\n\
         - summary TEXT (Hebrew)\n\
         - decision_content TEXT (full Hebrew text)\n\
         - operativity TEXT, one of '{operative}', '{declarative}'\n\
         - tags_policy_area TEXT, comma-separated policy areas from: {tags}\n\
         - tags_government_body TEXT\n\
         - prime_minister TEXT (Hebrew full name)\n\
         - decision_url TEXT",
        table = table,
        operative = OPERATIVE,
        declarative = DECLARATIVE,
        tags = tags.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_names_table_and_tags() {
        let description = schema_description("israeli_government_decisions");
        assert!(description.starts_with("Table israeli_government_decisions"));
        assert!(description.contains("חינוך"));
        assert!(description.contains("government_number INTEGER"));
    }
}
