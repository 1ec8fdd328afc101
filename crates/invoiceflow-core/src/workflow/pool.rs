//! Deterministic tool-pool selection.

use invoiceflow_types::workflow::ToolCandidate;

/// Pick a candidate from a pool.
///
/// An explicit preference wins when the pool contains a candidate of that
/// name; otherwise the first candidate is used. Returns `None` only for an
/// empty pool.
pub fn select_from_pool<'a>(
    candidates: &'a [ToolCandidate],
    preferred: Option<&str>,
) -> Option<&'a ToolCandidate> {
    preferred
        .and_then(|name| candidates.iter().find(|c| c.name == name))
        .or_else(|| candidates.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Vec<ToolCandidate> {
        ["google_vision", "tesseract", "aws_textract"]
            .into_iter()
            .map(ToolCandidate::named)
            .collect()
    }

    #[test]
    fn test_first_candidate_by_default() {
        let pool = pool();
        assert_eq!(select_from_pool(&pool, None).unwrap().name, "google_vision");
    }

    #[test]
    fn test_preference_honored_when_present() {
        let pool = pool();
        assert_eq!(
            select_from_pool(&pool, Some("tesseract")).unwrap().name,
            "tesseract"
        );
    }

    #[test]
    fn test_unknown_preference_falls_back_to_first() {
        let pool = pool();
        assert_eq!(
            select_from_pool(&pool, Some("abbyy")).unwrap().name,
            "google_vision"
        );
    }

    #[test]
    fn test_empty_pool_yields_none() {
        assert!(select_from_pool(&[], Some("tesseract")).is_none());
    }
}
