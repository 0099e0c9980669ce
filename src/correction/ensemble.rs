// src/correction/ensemble.rs

use std::collections::HashMap;

use crate::correction::Candidate;

/// Pick the highest-scoring candidate.
///
/// Ties go to the candidate that appears first, so the choice is
/// reproducible. A candidate without a score (or with a NaN score) ranks
/// below every scored one. Returns `None` for an empty slice.
pub fn select_best<'a>(candidates: &'a [Candidate], scores: &HashMap<String, f64>) -> Option<&'a Candidate> {
    let mut best: Option<(&Candidate, f64)> = None;

    for candidate in candidates {
        let score = scores
            .get(&candidate.id)
            .copied()
            .filter(|s| !s.is_nan())
            .unwrap_or(f64::NEG_INFINITY);

        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((candidate, score)),
        }
    }

    best.map(|(candidate, _)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidates() -> Vec<Candidate> {
        ["a", "b", "c"]
            .into_iter()
            .map(|id| Candidate {
                id: id.to_string(),
                output: json!(id),
            })
            .collect()
    }

    fn scores(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn highest_score_wins() {
        let c = candidates();
        let best = select_best(&c, &scores(&[("a", 0.1), ("b", 0.9), ("c", 0.5)]));
        assert_eq!(best.map(|c| c.id.as_str()), Some("b"));
    }

    #[test]
    fn ties_go_to_first_seen() {
        let c = candidates();
        let best = select_best(&c, &scores(&[("a", 0.2), ("b", 0.7), ("c", 0.7)]));
        assert_eq!(best.map(|c| c.id.as_str()), Some("b"));
    }

    #[test]
    fn unscored_candidates_rank_last() {
        let c = candidates();
        let best = select_best(&c, &scores(&[("c", -3.0), ("a", f64::NAN)]));
        assert_eq!(best.map(|c| c.id.as_str()), Some("c"));

        // Nobody scored: first candidate.
        let best = select_best(&c, &HashMap::new());
        assert_eq!(best.map(|c| c.id.as_str()), Some("a"));
    }

    #[test]
    fn empty_input_selects_nothing() {
        assert!(select_best(&[], &HashMap::new()).is_none());
    }
}
