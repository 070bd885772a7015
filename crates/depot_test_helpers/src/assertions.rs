//! Domain-specific assertions for Depot tests

use predicates::prelude::*;

/// Assert that stderr does NOT contain any of the given strings
pub fn stderr_not_contains(values: &[&str]) -> impl Predicate<str> {
    let owned_values: Vec<String> = values.iter().map(|&s| s.to_string()).collect();
    predicate::function(move |s: &str| !owned_values.iter().any(|v| s.contains(v.as_str())))
}

/// Matches output that carries a mutation id such as
/// `clients_create_1718000000000_00ab12cd34ef5678`
pub fn contains_mutation_id() -> impl Predicate<str> {
    predicate::function(|s: &str| s.split_whitespace().any(is_mutation_id))
}

fn is_mutation_id(token: &str) -> bool {
    let parts: Vec<&str> = token.rsplitn(3, '_').collect();
    match parts.as_slice() {
        [random, millis, prefix] => {
            random.len() == 16
                && random.chars().all(|c| c.is_ascii_hexdigit())
                && !millis.is_empty()
                && millis.chars().all(|c| c.is_ascii_digit())
                && ["_create", "_update", "_delete"]
                    .iter()
                    .any(|op| prefix.ends_with(op))
        }
        _ => false,
    }
}

/// Matches a string that parses as a JSON object containing `key`
pub fn json_with_key(key: &'static str) -> impl Predicate<str> {
    predicate::str::starts_with("{").and(predicate::str::contains(format!("\"{}\"", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_not_contains() {
        assert!(stderr_not_contains(&["ERROR", "WARN"]).eval("all quiet"));
        assert!(!stderr_not_contains(&["ERROR"]).eval("ERROR: boom"));
    }

    #[test]
    fn test_contains_mutation_id() {
        assert!(contains_mutation_id().eval("queued clients_create_1718000000000_00ab12cd34ef5678"));
        assert!(contains_mutation_id().eval("stock_movements_update_1_ffffffffffffffff"));
        assert!(!contains_mutation_id().eval("clients_create_abc_00ab12cd34ef5678"));
        assert!(!contains_mutation_id().eval("nothing here"));
    }

    #[test]
    fn test_json_with_key() {
        assert!(json_with_key("pending").eval("{\"pending\": 0}"));
        assert!(!json_with_key("pending").eval("pending: 0"));
    }
}
