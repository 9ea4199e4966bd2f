//! Fixed-point assets and conversion prices.
//!
//! Amounts are integer satoshis of their symbol. Conversions use a 128-bit
//! intermediate and truncate toward zero.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Symbol {
    /// Liquid token.
    Liquid,
    /// Vesting shares ("power").
    Vests,
}

impl Symbol {
    pub fn precision(&self) -> u8 {
        match self {
            Symbol::Liquid => 3,
            Symbol::Vests => 6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Symbol::Liquid => "CORE",
            Symbol::Vests => "VESTS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    #[error("Symbol mismatch: {left} vs {right}")]
    SymbolMismatch { left: &'static str, right: &'static str },

    #[error("Price {0} has a zero side")]
    ZeroPrice(String),

    #[error("Conversion overflow: {0}")]
    Overflow(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub amount: i64,
    pub symbol: Symbol,
}

impl Asset {
    pub const fn new(amount: i64, symbol: Symbol) -> Self {
        Self { amount, symbol }
    }

    pub const fn liquid(amount: i64) -> Self {
        Self::new(amount, Symbol::Liquid)
    }

    pub const fn vests(amount: i64) -> Self {
        Self::new(amount, Symbol::Vests)
    }

    pub fn is_liquid(&self) -> bool {
        self.symbol == Symbol::Liquid
    }

    pub fn is_vests(&self) -> bool {
        self.symbol == Symbol::Vests
    }

    /// Converts through `price`. The asset must match one side of the price.
    pub fn convert(&self, price: &Price) -> Result<Asset, AssetError> {
        if price.base.amount == 0 || price.quote.amount == 0 {
            return Err(AssetError::ZeroPrice(price.to_string()));
        }
        let (num, den, out) = if self.symbol == price.base.symbol {
            (price.quote.amount, price.base.amount, price.quote.symbol)
        } else if self.symbol == price.quote.symbol {
            (price.base.amount, price.quote.amount, price.base.symbol)
        } else {
            return Err(AssetError::SymbolMismatch {
                left: self.symbol.name(),
                right: price.base.symbol.name(),
            });
        };
        let result = self.amount as i128 * num as i128 / den as i128;
        let amount = i64::try_from(result)
            .map_err(|_| AssetError::Overflow(format!("{} * {}", self, price)))?;
        Ok(Asset::new(amount, out))
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = self.symbol.precision() as u32;
        let scale = 10i64.pow(precision);
        let sign = if self.amount < 0 { "-" } else { "" };
        let abs = self.amount.unsigned_abs();
        write!(
            f,
            "{}{}.{:0width$} {}",
            sign,
            abs / scale as u64,
            abs % scale as u64,
            self.symbol.name(),
            width = precision as usize
        )
    }
}

impl Add for Asset {
    type Output = Asset;

    fn add(self, rhs: Asset) -> Asset {
        debug_assert_eq!(self.symbol, rhs.symbol);
        Asset::new(self.amount + rhs.amount, self.symbol)
    }
}

impl Sub for Asset {
    type Output = Asset;

    fn sub(self, rhs: Asset) -> Asset {
        debug_assert_eq!(self.symbol, rhs.symbol);
        Asset::new(self.amount - rhs.amount, self.symbol)
    }
}

impl AddAssign for Asset {
    fn add_assign(&mut self, rhs: Asset) {
        *self = *self + rhs;
    }
}

impl SubAssign for Asset {
    fn sub_assign(&mut self, rhs: Asset) {
        *self = *self - rhs;
    }
}

impl Neg for Asset {
    type Output = Asset;

    fn neg(self) -> Asset {
        Asset::new(-self.amount, self.symbol)
    }
}

/// Exchange ratio `base : quote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub base: Asset,
    pub quote: Asset,
}

impl Price {
    pub const fn new(base: Asset, quote: Asset) -> Self {
        Self { base, quote }
    }

    pub fn is_null(&self) -> bool {
        self.base.amount == 0 || self.quote.amount == 0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_symbol_precision() {
        assert_eq!(Asset::liquid(1_234).to_string(), "1.234 CORE");
        assert_eq!(Asset::vests(-5).to_string(), "-0.000005 VESTS");
    }

    #[test]
    fn test_convert_both_directions_truncates() {
        let price = Price::new(Asset::vests(3_000), Asset::liquid(7));
        assert_eq!(Asset::liquid(10).convert(&price).unwrap(), Asset::vests(4_285));
        assert_eq!(Asset::vests(1_000).convert(&price).unwrap(), Asset::liquid(2));
    }

    #[test]
    fn test_convert_rejects_zero_price() {
        let price = Price::new(Asset::vests(0), Asset::liquid(7));
        assert!(matches!(Asset::liquid(1).convert(&price), Err(AssetError::ZeroPrice(_))));
    }
}
