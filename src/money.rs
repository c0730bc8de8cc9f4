// 💰 Money - exact centavo arithmetic and currency formatting
//
// Values arrive as comma-decimal text ("1234,5678") and are rounded
// half-to-even to two places. Everything downstream sums integers, so
// aggregated totals are exact to the cent.

use serde::{Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

// ============================================================================
// MONEY
// ============================================================================

/// Signed amount in centavos
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Lossy conversion for chart axes and color scales
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Parse a comma-decimal amount, rounding half-to-even to centavos
    ///
    /// Accepts an optional sign, integer digits and an optional fraction
    /// after a single ','. Returns None for anything else (empty, grouping
    /// separators, exponents).
    ///
    /// # Examples:
    /// ```
    /// use cfem_choropleth::Money;
    /// assert_eq!(Money::parse_comma_decimal("1234,565"), Some(Money::from_cents(123456)));
    /// assert_eq!(Money::parse_comma_decimal("0,015"), Some(Money::from_cents(2)));
    /// ```
    pub fn parse_comma_decimal(raw: &str) -> Option<Money> {
        let text = raw.trim();
        let (negative, unsigned) = match text.as_bytes().first()? {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };

        let (int_part, frac_part) = match unsigned.split_once(',') {
            Some((i, f)) => (i, f),
            None => (unsigned, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return None;
        }

        let units: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };

        let frac = frac_part.as_bytes();
        let digit = |idx: usize| frac.get(idx).map(|b| (b - b'0') as i64).unwrap_or(0);
        let mut cents = units.checked_mul(100)?.checked_add(digit(0) * 10 + digit(1))?;

        // Half-to-even on the discarded tail
        if frac.len() > 2 {
            let first = frac[2];
            let rest_nonzero = frac[3..].iter().any(|b| *b != b'0');
            let round_up = first > b'5' || (first == b'5' && (rest_nonzero || cents % 2 == 1));
            if round_up {
                cents = cents.checked_add(1)?;
            }
        }

        Some(Money(if negative { -cents } else { cents }))
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

/// Plain decimal rendering ("1234.56"), no grouping or symbol
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

// ============================================================================
// CURRENCY FORMAT
// ============================================================================

/// Explicit currency formatting, independent of process locale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyFormat {
    pub symbol: String,
    pub grouping_separator: char,
    pub decimal_separator: char,
}

impl CurrencyFormat {
    /// Brazilian real: "R$ 1.234,56"
    pub fn pt_br() -> Self {
        CurrencyFormat {
            symbol: "R$".to_string(),
            grouping_separator: '.',
            decimal_separator: ',',
        }
    }

    /// Real amounts with US separators: "R$ 1,234.56"
    pub fn en_us_brl() -> Self {
        CurrencyFormat {
            symbol: "R$".to_string(),
            grouping_separator: ',',
            decimal_separator: '.',
        }
    }

    /// Resolve a locale code such as "pt-BR" or "en_US"
    pub fn from_locale(code: &str) -> Option<Self> {
        match code.replace('_', "-").to_lowercase().as_str() {
            "pt-br" | "pt" => Some(Self::pt_br()),
            "en-us" | "en" => Some(Self::en_us_brl()),
            _ => None,
        }
    }

    pub fn format(&self, amount: Money) -> String {
        let abs = amount.cents().unsigned_abs();
        let units = (abs / 100).to_string();

        let mut grouped = String::with_capacity(units.len() + units.len() / 3);
        for (i, ch) in units.chars().enumerate() {
            if i > 0 && (units.len() - i) % 3 == 0 {
                grouped.push(self.grouping_separator);
            }
            grouped.push(ch);
        }

        let sign = if amount.cents() < 0 { "-" } else { "" };
        format!(
            "{}{} {}{}{:02}",
            sign,
            self.symbol,
            grouped,
            self.decimal_separator,
            abs % 100
        )
    }
}

impl Default for CurrencyFormat {
    fn default() -> Self {
        Self::pt_br()
    }
}

// ============================================================================
// TESTS
// ============================================================================
