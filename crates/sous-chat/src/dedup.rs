//! Recommendation deduplication.
//!
//! Candidate dish names are compared after normalization, so "김치 찌개",
//! "김치찌개" and "김치찌개 (Kimchi-jjigae)" collapse to related keys.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s·ㆍ・/|()\-]+").expect("Invalid separator regex"));

static NON_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z가-힣]").expect("Invalid name-char regex"));

/// Filters candidate names against previously suggested ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecommendationDeduper;

impl RecommendationDeduper {
    /// Comparison key: lower-cased, separators removed, then only Latin
    /// letters and Hangul syllables kept.
    pub fn normalize(name: &str) -> String {
        let lower = name.trim().to_lowercase();
        let joined = SEPARATORS.replace_all(&lower, "");
        NON_NAME_CHARS.replace_all(&joined, "").into_owned()
    }

    /// Keep candidates whose key is non-empty, unseen in this batch and not in
    /// `avoid`. Order and original spelling are preserved.
    pub fn dedupe<S: AsRef<str>>(&self, candidates: &[S], avoid: &[String]) -> Vec<String> {
        let owned: Vec<String> = candidates.iter().map(|c| c.as_ref().to_string()).collect();
        self.dedupe_by(owned, avoid, |s| s.as_str())
    }

    /// Same as [`dedupe`](Self::dedupe) for arbitrary items with a name.
    pub fn dedupe_by<T, F>(&self, candidates: Vec<T>, avoid: &[String], name_of: F) -> Vec<T>
    where
        F: Fn(&T) -> &str,
    {
        let avoid: HashSet<String> = avoid.iter().map(|a| Self::normalize(a)).collect();
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|c| {
                let key = Self::normalize(name_of(c));
                !key.is_empty() && !avoid.contains(&key) && seen.insert(key)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_strips_spacing_and_punctuation() {
        assert_eq!(RecommendationDeduper::normalize(" 김치 찌개 "), "김치찌개");
        assert_eq!(RecommendationDeduper::normalize("Pasta·Aglio/Olio"), "pastaaglioolio");
        assert_eq!(
            RecommendationDeduper::normalize("라따뚜이 (Ratatouille)"),
            "라따뚜이ratatouille"
        );
        assert_eq!(RecommendationDeduper::normalize("1. 불고기!"), "불고기");
    }

    #[test]
    fn test_dedupe_within_batch() {
        let deduper = RecommendationDeduper;
        let out = deduper.dedupe(&["김치찌개", "김치 찌개", "불고기"], &[]);
        assert_eq!(out, names(&["김치찌개", "불고기"]));
    }

    #[test]
    fn test_dedupe_against_avoid() {
        let deduper = RecommendationDeduper;
        let avoid = names(&["된장 찌개"]);
        let out = deduper.dedupe(&["된장찌개", "순두부찌개"], &avoid);
        assert_eq!(out, names(&["순두부찌개"]));
    }

    #[test]
    fn test_dedupe_drops_empty_keys() {
        let deduper = RecommendationDeduper;
        let out = deduper.dedupe(&["", "123", "  ", "잡채"], &[]);
        assert_eq!(out, names(&["잡채"]));
    }

    #[test]
    fn test_growing_avoid_never_reintroduces() {
        let deduper = RecommendationDeduper;
        let rounds = [
            vec!["김치찌개", "된장찌개", "불고기"],
            vec!["김치 찌개", "비빔밥", "불고기"],
            vec!["비빔밥", "잡채", "된장찌개"],
        ];
        let mut avoid: Vec<String> = Vec::new();
        for round in rounds {
            let kept = deduper.dedupe(&round, &avoid);
            for name in &kept {
                let key = RecommendationDeduper::normalize(name);
                assert!(!avoid
                    .iter()
                    .any(|a| RecommendationDeduper::normalize(a) == key));
            }
            avoid.extend(kept);
        }
        assert_eq!(avoid, names(&["김치찌개", "된장찌개", "불고기", "비빔밥", "잡채"]));
    }

    #[test]
    fn test_dedupe_by_keeps_items() {
        let deduper = RecommendationDeduper;
        let items = vec![("김밥", 1), ("김 밥", 2), ("라면", 3)];
        let out = deduper.dedupe_by(items, &[], |item| item.0);
        assert_eq!(out, vec![("김밥", 1), ("라면", 3)]);
    }
}
