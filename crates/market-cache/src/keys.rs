//! Cache key builders. The identifying part of every key is normalized:
//! uppercased, with spaces, dashes and dots collapsed to underscores.

/// Normalize the identifying part of a cache key.
pub fn normalize(raw: &str) -> String {
    raw.trim()
        .to_uppercase()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '.' => '_',
            other => other,
        })
        .collect()
}

pub fn company(ticker: &str) -> String {
    format!("company:{}", normalize(ticker))
}

pub fn brokerage(name: &str) -> String {
    format!("brokerage:{}", normalize(name))
}

pub fn rating(ticker: &str, brokerage_name: &str, event_time: &str) -> String {
    format!(
        "rating:{}:{}:{}",
        normalize(ticker),
        normalize(brokerage_name),
        normalize(event_time)
    )
}

pub fn market_data(symbol: &str) -> String {
    format!("market_data:{}", normalize(symbol))
}

pub fn company_profile(symbol: &str) -> String {
    format!("profile:{}", normalize(symbol))
}

pub fn basic_financials(symbol: &str) -> String {
    format!("financials:{}", normalize(symbol))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_rules() {
        assert_eq!(normalize(" brk.b "), "BRK_B");
        assert_eq!(normalize("The Goldman Sachs Group"), "THE_GOLDMAN_SACHS_GROUP");
        assert_eq!(normalize("pre-market"), "PRE_MARKET");
    }

    #[test]
    fn keys_carry_prefixes() {
        assert_eq!(company("aapl"), "company:AAPL");
        assert_eq!(brokerage("JP Morgan"), "brokerage:JP_MORGAN");
        assert!(rating("aapl", "JP Morgan", "2024-03-01").starts_with("rating:AAPL:JP_MORGAN:"));
    }
}
