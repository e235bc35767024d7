//! CAS Token Generation
//!
//! Every stored version of an entry carries a 64-bit compare-and-swap token.
//! A client reads it with `gets` and hands it back with `cas`; the write only
//! goes through if the token still matches.
//!
//! Tokens are drawn from the thread-local RNG. They are versioning tokens, not
//! a security boundary, so a fast non-cryptographic source is enough. The only
//! hard requirements are:
//!
//! 1. A new version never reuses the token of the version it replaces.
//! 2. Zero is never issued, so a lenient parse of a garbage token (which yields
//!    zero) can never match a live entry.

/// Returns a fresh CAS token that differs from `previous`.
pub fn next_token(previous: Option<u64>) -> u64 {
    loop {
        let token: u64 = rand::random();
        if token != 0 && Some(token) != previous {
            return token;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_is_never_zero() {
        for _ in 0..10_000 {
            assert_ne!(next_token(None), 0);
        }
    }

    #[test]
    fn test_token_differs_from_previous() {
        let mut token = next_token(None);
        for _ in 0..10_000 {
            let next = next_token(Some(token));
            assert_ne!(next, token);
            token = next;
        }
    }

    #[test]
    fn test_tokens_are_spread_out() {
        let tokens: HashSet<u64> = (0..1000).map(|_| next_token(None)).collect();
        assert_eq!(tokens.len(), 1000);
    }
}
