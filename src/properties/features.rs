//! Feature canonicalization.
//!
//! Portals and agents spell the same amenity a dozen ways ("swimming pool",
//! "piscina", "pool "). The alias catalog maps spellings onto canonical
//! slugs; merging canonicalizes, dedupes, and preserves first-seen order.

use std::collections::HashMap;
use std::collections::HashSet;

pub fn canonical_feature(raw: &str, aliases: &HashMap<String, String>) -> String {
    let key = raw.trim().to_lowercase();
    aliases.get(&key).cloned().unwrap_or(key)
}

pub fn merge_features(
    existing: &[String],
    incoming: &[String],
    aliases: &HashMap<String, String>,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for raw in existing.iter().chain(incoming.iter()) {
        let canonical = canonical_feature(raw, aliases);
        if canonical.is_empty() {
            continue;
        }
        if seen.insert(canonical.clone()) {
            merged.push(canonical);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("swimming pool".to_string(), "pool".to_string());
        map.insert("piscina".to_string(), "pool".to_string());
        map.insert("garagem".to_string(), "garage".to_string());
        map
    }

    #[test]
    fn aliases_collapse_to_canonical_slug() {
        assert_eq!(canonical_feature("Swimming Pool", &aliases()), "pool");
        assert_eq!(canonical_feature(" piscina ", &aliases()), "pool");
        assert_eq!(canonical_feature("balcony", &aliases()), "balcony");
    }

    #[test]
    fn merge_dedupes_and_preserves_order() {
        let existing = vec!["pool".to_string(), "balcony".to_string()];
        let incoming = vec![
            "Swimming Pool".to_string(),
            "garagem".to_string(),
            "".to_string(),
            "balcony".to_string(),
        ];
        assert_eq!(
            merge_features(&existing, &incoming, &aliases()),
            vec!["pool", "balcony", "garage"]
        );
    }

    #[test]
    fn merge_without_aliases_lowercases() {
        let merged = merge_features(&[], &["Garden".to_string(), "garden".to_string()], &HashMap::new());
        assert_eq!(merged, vec!["garden"]);
    }
}
