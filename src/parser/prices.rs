//! Price, currency and discount extraction.
//!
//! Patterns are tried in table order and the first plausible value wins.
//! Currencies whose marker contains `$` (C$, A$) come before the bare dollar
//! sign so that `C$99` is not read as USD.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Amount as written in posts: digits with optional thousands separators and
/// up to two decimals.
const AMOUNT: &str = r"(\d[\d,]*(?:\.\d{1,2})?)";

/// Upper bound (exclusive) for a believable price.
const MAX_PRICE: i64 = 10_000_000;

/// Prices found in one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPrices {
    pub deal_price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    /// ISO code of the matched currency; `None` when nothing matched.
    pub currency: Option<&'static str>,
}

fn pattern(template: &str) -> Regex {
    Regex::new(&template.replace("{amount}", AMOUNT)).unwrap()
}

/// Single-price patterns per currency.
static SINGLE_PRICE: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("CAD", pattern(r"\bC\$\s*{amount}")),
        ("CAD", pattern(r"(?i)\bCAD\s*{amount}")),
        ("AUD", pattern(r"\bA\$\s*{amount}")),
        ("AUD", pattern(r"(?i)\bAUD\s*{amount}")),
        ("USD", pattern(r"\$\s*{amount}")),
        ("EUR", pattern(r"€\s*{amount}")),
        ("GBP", pattern(r"£\s*{amount}")),
        ("INR", pattern(r"₹\s*{amount}")),
        ("INR", pattern(r"(?i)\bRs\.?\s*{amount}")),
        ("INR", pattern(r"(?i)\bINR\s*{amount}")),
    ]
});

/// "X ... (was|mrp|...) ... Y" patterns. The two amounts may appear in either
/// order, and both must carry a currency marker. The comparison price of a
/// C$/A$ deal may be written with a bare `$`.
static PRICE_PAIR: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "CAD",
            pattern(
                r"(?i)(?:\bC\$|\bCAD)\s*{amount}.*?(?:was|from|original|reg).*?(?:\$|\bCAD)\s*{amount}",
            ),
        ),
        (
            "AUD",
            pattern(
                r"(?i)(?:\bA\$|\bAUD)\s*{amount}.*?(?:was|from|original|reg).*?(?:\$|\bAUD)\s*{amount}",
            ),
        ),
        ("USD", pattern(r"(?i)\$\s*{amount}.*?(?:was|from|original|reg).*?\$\s*{amount}")),
        ("EUR", pattern(r"(?i)€\s*{amount}.*?(?:was|from|original|reg).*?€\s*{amount}")),
        ("GBP", pattern(r"(?i)£\s*{amount}.*?(?:was|from|original|reg).*?£\s*{amount}")),
        (
            "INR",
            pattern(
                r"(?i)(?:₹|\bRs\.?|\bINR)\s*{amount}.*?(?:mrp|was|from|original|reg).*?(?:₹|\bRs\.?|\bINR)\s*{amount}",
            ),
        ),
    ]
});

static DISCOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,3})\s*%\s*(?:off|discount)").unwrap());

/// Parse an amount, dropping thousands separators. Values outside
/// `(0, 10,000,000)` are treated as noise.
#[must_use]
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let value = Decimal::from_str(&raw.replace(',', "")).ok()?;
    (value > Decimal::ZERO && value < Decimal::from(MAX_PRICE)).then_some(value)
}

/// Find the first single price in `text`.
#[must_use]
pub fn extract_price(text: &str) -> Option<(Decimal, &'static str)> {
    SINGLE_PRICE.iter().find_map(|(currency, re)| {
        re.captures_iter(text)
            .find_map(|caps| parse_amount(&caps[1]))
            .map(|price| (price, *currency))
    })
}

/// Extract the deal price and, when a comparison price is quoted, the
/// original price.
///
/// With two amounts the smaller one is the deal price regardless of which
/// came first.
#[must_use]
pub fn extract_prices(text: &str) -> ExtractedPrices {
    for (currency, re) in PRICE_PAIR.iter() {
        let Some(caps) = re.captures(text) else {
            continue;
        };
        if let (Some(a), Some(b)) = (parse_amount(&caps[1]), parse_amount(&caps[2])) {
            return ExtractedPrices {
                deal_price: Some(a.min(b)),
                original_price: Some(a.max(b)),
                currency: Some(currency),
            };
        }
    }

    match extract_price(text) {
        Some((price, currency)) => ExtractedPrices {
            deal_price: Some(price),
            original_price: None,
            currency: Some(currency),
        },
        None => ExtractedPrices {
            deal_price: None,
            original_price: None,
            currency: None,
        },
    }
}

/// Discount percentage: an explicit "NN% off" wins, otherwise it is derived
/// from the two prices. Only values in `1..=100` are returned.
#[must_use]
pub fn extract_discount(
    text: &str,
    deal_price: Option<Decimal>,
    original_price: Option<Decimal>,
) -> Option<u8> {
    let explicit = DISCOUNT_RE
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse::<u8>().ok())
        .find(|pct| (1..=100).contains(pct));
    if explicit.is_some() {
        return explicit;
    }

    let (deal, original) = (deal_price?, original_price?);
    if original <= deal || original <= Decimal::ZERO {
        return None;
    }

    let pct = ((original - deal) / original * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u8()?;
    (1..=100).contains(&pct).then_some(pct)
}
