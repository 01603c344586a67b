//! Minimal symbol list normalization

use std::collections::HashSet;

/// Upper-case, trim and de-duplicate symbols, keeping first-seen order
///
/// Comma separated arguments are split, so `AAPL,msft` and `AAPL msft`
/// give the same list.
pub fn normalize_symbols<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .flat_map(|arg| arg.as_ref().split(','))
        .map(|symbol| symbol.trim().to_uppercase())
        .filter(|symbol| !symbol.is_empty())
        .filter(|symbol| seen.insert(symbol.clone()))
        .collect()
}
