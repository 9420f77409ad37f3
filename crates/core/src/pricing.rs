use serde::{Deserialize, Serialize};

/// Asking price used when the caller's price string yields no usable amount.
pub const FALLBACK_ASKING_PRICE: u64 = 1_200_000;

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₹'];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedPricing {
    asking_price: u64,
    target_offer: u64,
    used_fallback: bool,
}

impl ParsedPricing {
    /// Lenient parse: currency symbols, commas and whitespace are dropped, then the leading
    /// digit run is read. Anything that does not produce a positive amount falls back to
    /// [`FALLBACK_ASKING_PRICE`].
    pub fn parse(raw: &str) -> Self {
        match parse_amount(raw) {
            Some(asking_price) => Self::from_asking_price(asking_price),
            None => Self { used_fallback: true, ..Self::from_asking_price(FALLBACK_ASKING_PRICE) },
        }
    }

    pub fn from_asking_price(asking_price: u64) -> Self {
        Self { asking_price, target_offer: target_offer_for(asking_price), used_fallback: false }
    }

    pub fn asking_price(&self) -> u64 {
        self.asking_price
    }

    pub fn target_offer(&self) -> u64 {
        self.target_offer
    }

    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }
}

/// `floor(0.9 * asking)` in integer arithmetic.
pub fn target_offer_for(asking_price: u64) -> u64 {
    (u128::from(asking_price) * 9 / 10) as u64
}

fn parse_amount(raw: &str) -> Option<u64> {
    let stripped: String = raw
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != ',' && !CURRENCY_SYMBOLS.contains(ch))
        .collect();
    let unsigned = stripped.strip_prefix('+').unwrap_or(&stripped);
    let digits: String = unsigned.chars().take_while(char::is_ascii_digit).collect();

    digits.parse::<u64>().ok().filter(|amount| *amount > 0)
}

/// Renders an amount with comma thousands separators, e.g. `1,080,000`.
pub fn format_thousands(amount: u64) -> String {
    let digits = amount.to_string();
    let mut output = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            output.push(',');
        }
        output.push(ch);
    }
    output
}
