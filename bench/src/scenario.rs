//! Query scenarios: one audience predicate written once per schema.
//!
//! | Scenario        | Predicate                                         |
//! |-----------------|---------------------------------------------------|
//! | single equality | `country = 'US'`                                  |
//! | disjunction     | `country = 'US' OR tier IN ('gold', 'platinum')`  |
//! | conjunction     | `has_purchased AND total_spend > 100`             |
//!
//! The EAV side counts `DISTINCT user_id` because a user can carry duplicate
//! attribute rows; the denormalized side keys on `user_id`, so `COUNT(*)` is
//! enough.

use crate::error::StoreError;
use audience_core::config::SchemaNames;

/// A named predicate realized as two equivalent count queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryScenario {
    pub name: &'static str,
    pub predicate: &'static str,
    /// Count against the EAV pair.
    pub baseline_sql: String,
    /// Count against the denormalized table.
    pub optimized_sql: String,
}

/// Accept `name` or `schema.name` made of ASCII letters, digits and
/// underscores, not starting with a digit. Table names are spliced into SQL
/// text, so anything else is refused.
pub fn validate_identifier(name: &str) -> Result<&str, StoreError> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|part| valid_part(part)) {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Count of all users, used as the dataset cardinality.
pub fn dataset_size_sql(names: &SchemaNames) -> Result<String, StoreError> {
    let users = validate_identifier(&names.users)?;
    Ok(format!("SELECT COUNT(*) FROM {users}"))
}

/// The three standard scenarios, in reporting order. The first one is the
/// source of the extrapolation and of the plan shown in the report.
pub fn standard_scenarios(names: &SchemaNames) -> Result<Vec<QueryScenario>, StoreError> {
    let users = validate_identifier(&names.users)?;
    let attrs = validate_identifier(&names.attributes)?;
    let profiles = validate_identifier(&names.profiles)?;

    let attribute_exists = |alias: &str, condition: &str| {
        format!(
            "EXISTS (
                SELECT 1 FROM {attrs} {alias}
                WHERE {alias}.user_id = u.user_id
                AND {condition}
            )"
        )
    };

    let single_equality = QueryScenario {
        name: "single equality",
        predicate: "country = 'US'",
        baseline_sql: format!(
            "SELECT COUNT(DISTINCT u.user_id)
             FROM {users} u
             WHERE {}",
            attribute_exists("ua", "ua.key = 'country' AND ua.value = 'US'")
        ),
        optimized_sql: format!(
            "SELECT COUNT(*)
             FROM {profiles}
             WHERE country = 'US'"
        ),
    };

    let disjunction = QueryScenario {
        name: "disjunction",
        predicate: "country = 'US' OR tier IN ('gold', 'platinum')",
        baseline_sql: format!(
            "SELECT COUNT(DISTINCT u.user_id)
             FROM {users} u
             WHERE {}
             OR {}",
            attribute_exists("ua1", "ua1.key = 'country' AND ua1.value = 'US'"),
            attribute_exists("ua2", "ua2.key = 'tier' AND ua2.value IN ('gold', 'platinum')")
        ),
        optimized_sql: format!(
            "SELECT COUNT(*)
             FROM {profiles}
             WHERE country = 'US'
                OR tier IN ('gold', 'platinum')"
        ),
    };

    // The CASE keeps the numeric cast away from values of other keys.
    let conjunction = QueryScenario {
        name: "conjunction",
        predicate: "has_purchased AND total_spend > 100",
        baseline_sql: format!(
            "SELECT COUNT(DISTINCT u.user_id)
             FROM {users} u
             WHERE {}
             AND {}",
            attribute_exists("ua1", "ua1.key = 'has_purchased' AND ua1.value = 'true'"),
            attribute_exists(
                "ua2",
                "ua2.key = 'total_spend'
                AND CASE WHEN ua2.key = 'total_spend'
                         THEN CAST(ua2.value AS NUMERIC) END > 100"
            )
        ),
        optimized_sql: format!(
            "SELECT COUNT(*)
             FROM {profiles}
             WHERE has_purchased = true
               AND total_spend > 100"
        ),
    };

    Ok(vec![single_equality, disjunction, conjunction])
}
