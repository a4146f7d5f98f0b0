//! Internal implementation details.

pub(crate) mod circular;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub(crate) use circular::ResolutionPath;

#[cfg(feature = "ahash")]
pub(crate) type IdSet<T> = std::collections::HashSet<T, ahash::RandomState>;
#[cfg(not(feature = "ahash"))]
pub(crate) type IdSet<T> = std::collections::HashSet<T>;

/// Edit distance between two strings, counted in bytes.
pub(crate) fn levenshtein(a: &str, b: &str) -> usize {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.is_empty() {
        return b.len();
    }
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, &ca) in a.iter().enumerate() {
        let mut prev = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            let next = (row[j + 1] + 1).min(row[j] + 1).min(prev + cost);
            prev = row[j + 1];
            row[j + 1] = next;
        }
    }
    row[b.len()]
}

/// Candidates close enough to `needle` to be suggested in a message.
pub(crate) fn alternatives<'a>(needle: &str, candidates: impl Iterator<Item = &'a str>) -> Vec<String> {
    let lower = needle.to_lowercase();
    candidates
        .filter(|candidate| {
            let candidate = candidate.to_lowercase();
            levenshtein(&lower, &candidate) <= lower.len() / 3 || candidate.contains(&lower)
        })
        .map(str::to_string)
        .collect()
}

/// Short, stable hex digest of `value`.
pub(crate) fn hash_id(value: &impl Hash) -> String {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    format!("{:07x}", hasher.finish() & 0x0fff_ffff)
}

/// `snake_case`, `kebab-case` and spaced names to `camelCase`.
pub(crate) fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if !c.is_alphanumeric() {
            upper = !out.is_empty();
            continue;
        }
        if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else if out.is_empty() {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_counts_edits() {
        assert_eq!(levenshtein("mailer", "mailer"), 0);
        assert_eq!(levenshtein("mailer", "mialer"), 2);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn alternatives_match_close_or_containing_ids() {
        let ids = ["mailer.smtp", "logger", "mailer"];
        assert_eq!(alternatives("mailr", ids.iter().copied()), vec!["mailer".to_string()]);
        assert_eq!(
            alternatives("mailer", ids.iter().copied()),
            vec!["mailer.smtp".to_string(), "mailer".to_string()]
        );
    }

    #[test]
    fn camel_cases_argument_names() {
        assert_eq!(camel_case("default_mailer"), "defaultMailer");
        assert_eq!(camel_case("Default-Mailer"), "defaultMailer");
        assert_eq!(camel_case("logger"), "logger");
    }

    #[test]
    fn hash_ids_are_stable() {
        assert_eq!(hash_id(&"abc"), hash_id(&"abc"));
        assert_ne!(hash_id(&"abc"), hash_id(&"abd"));
    }
}
