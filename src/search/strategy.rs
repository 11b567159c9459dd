use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::RetrievalConfig;

/// Queries shorter than this many tokens use plain vector search.
const SIMPLE_MAX_TOKENS: usize = 5;
/// Queries with at least this many tokens are eligible for the advanced path.
const ADVANCED_MIN_TOKENS: usize = 15;

/// Which set of retrievers a query runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Let the selector decide from the query length
    Auto,
    /// Direct vector search only
    Simple,
    /// Vector + keyword combination
    Hybrid,
    /// Every enabled retriever, fused with RRF
    Advanced,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Auto => "auto",
            Strategy::Simple => "simple",
            Strategy::Hybrid => "hybrid",
            Strategy::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Strategy::Auto),
            "simple" => Ok(Strategy::Simple),
            "hybrid" => Ok(Strategy::Hybrid),
            "advanced" => Ok(Strategy::Advanced),
            other => Err(format!(
                "unknown retrieval strategy {other:?} (expected auto, simple, hybrid or advanced)"
            )),
        }
    }
}

/// Pick a strategy from the whitespace token count of `query`.
///
/// - fewer than 5 tokens: `Simple`
/// - 5 to 14 tokens: `Hybrid` when enabled, else `Simple`
/// - 15 or more: `Advanced` when HyDE is enabled, else `Hybrid` when
///   enabled, else `Simple`
pub fn select_strategy(query: &str, config: &RetrievalConfig) -> Strategy {
    let tokens = query.split_whitespace().count();

    if tokens < SIMPLE_MAX_TOKENS {
        Strategy::Simple
    } else if tokens < ADVANCED_MIN_TOKENS {
        if config.enable_hybrid {
            Strategy::Hybrid
        } else {
            Strategy::Simple
        }
    } else if config.enable_hyde {
        Strategy::Advanced
    } else if config.enable_hybrid {
        Strategy::Hybrid
    } else {
        Strategy::Simple
    }
}

/// Resolve a requested strategy: explicit choices bypass the selector.
pub fn resolve_strategy(
    requested: Option<Strategy>,
    query: &str,
    config: &RetrievalConfig,
) -> Strategy {
    match requested {
        None | Some(Strategy::Auto) => select_strategy(query, config),
        Some(explicit) => explicit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    fn config(hybrid: bool, hyde: bool) -> RetrievalConfig {
        RetrievalConfig {
            enable_hybrid: hybrid,
            enable_hyde: hyde,
            ..RetrievalConfig::default()
        }
    }

    #[test]
    fn test_short_queries_are_simple() {
        let cfg = config(true, true);
        assert_eq!(select_strategy("", &cfg), Strategy::Simple);
        assert_eq!(select_strategy(&words(4), &cfg), Strategy::Simple);
    }

    #[test]
    fn test_medium_queries_use_hybrid_when_enabled() {
        let cfg = config(true, true);
        assert_eq!(select_strategy(&words(5), &cfg), Strategy::Hybrid);
        assert_eq!(select_strategy(&words(10), &cfg), Strategy::Hybrid);
        assert_eq!(select_strategy(&words(14), &cfg), Strategy::Hybrid);
        assert_eq!(select_strategy(&words(10), &config(false, true)), Strategy::Simple);
    }

    #[test]
    fn test_long_queries() {
        assert_eq!(select_strategy(&words(15), &config(true, true)), Strategy::Advanced);
        assert_eq!(select_strategy(&words(20), &config(false, true)), Strategy::Advanced);
        assert_eq!(select_strategy(&words(20), &config(true, false)), Strategy::Hybrid);
        assert_eq!(select_strategy(&words(20), &config(false, false)), Strategy::Simple);
    }

    #[test]
    fn test_token_count_ignores_extra_whitespace() {
        let cfg = config(true, true);
        assert_eq!(
            select_strategy("  what   is\tthe \n refund  ", &cfg),
            Strategy::Simple
        );
    }

    #[test]
    fn test_explicit_strategy_bypasses_selection() {
        let cfg = config(false, false);
        assert_eq!(
            resolve_strategy(Some(Strategy::Advanced), "hi", &cfg),
            Strategy::Advanced
        );
        assert_eq!(resolve_strategy(Some(Strategy::Auto), "hi", &cfg), Strategy::Simple);
        assert_eq!(resolve_strategy(None, &words(20), &cfg), Strategy::Simple);
    }

    #[test]
    fn test_parse_strategy_names() {
        assert_eq!("advanced".parse::<Strategy>().unwrap(), Strategy::Advanced);
        assert_eq!(" Hybrid ".parse::<Strategy>().unwrap(), Strategy::Hybrid);
        assert!("fancy".parse::<Strategy>().is_err());
        assert_eq!(Strategy::Simple.to_string(), "simple");
    }
}
