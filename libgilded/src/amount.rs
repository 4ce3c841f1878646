use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

pub const COPPER_PER_GOLD: i64 = 10_000;
pub const FEE_SCALE: u32 = 4;

/// Money in copper, the smallest coin. All accumulation happens here;
/// conversion to gold happens only when values leave the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Copper(pub i64);

impl Copper {
    /// Whole gold, sub-gold remainder dropped (1234g 56s is 1234).
    pub fn whole_gold(self) -> i64 {
        self.0 / COPPER_PER_GOLD
    }

    /// Exact gold value with four fractional digits.
    pub fn gold(self) -> Gold {
        Gold(Decimal::new(self.0, FEE_SCALE))
    }

    pub fn abs(self) -> Copper {
        Copper(self.0.saturating_abs())
    }
}

impl std::ops::Add for Copper {
    type Output = Copper;

    fn add(self, rhs: Copper) -> Self::Output {
        Copper(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for Copper {
    type Output = Copper;

    fn sub(self, rhs: Copper) -> Self::Output {
        Copper(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::Neg for Copper {
    type Output = Copper;

    fn neg(self) -> Self::Output {
        Copper(self.0.saturating_neg())
    }
}

impl std::iter::Sum for Copper {
    fn sum<I: Iterator<Item = Copper>>(iter: I) -> Self {
        iter.fold(Copper::default(), |acc, c| acc + c)
    }
}

/// Gold amount carried with exactly four fractional digits. Serialized as a
/// JSON number that keeps its trailing zeros (`12.3450`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "GoldRepr", into = "GoldRepr")]
pub struct Gold(Decimal);

impl Default for Gold {
    fn default() -> Self {
        Gold(Decimal::new(0, FEE_SCALE))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(transparent)]
struct GoldRepr(#[serde(with = "rust_decimal::serde::arbitrary_precision")] Decimal);

impl From<GoldRepr> for Gold {
    fn from(repr: GoldRepr) -> Self {
        Gold::from_decimal(repr.0)
    }
}

impl From<Gold> for GoldRepr {
    fn from(gold: Gold) -> Self {
        GoldRepr(gold.0)
    }
}

impl Gold {
    /// Round half away from zero to four places, then pin the scale so the
    /// rendering always shows four digits.
    pub fn from_decimal(value: Decimal) -> Gold {
        let mut rounded =
            value.round_dp_with_strategy(FEE_SCALE, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(FEE_SCALE);
        Gold(rounded)
    }

    pub fn from_f64(value: f64) -> Option<Gold> {
        Decimal::from_f64(value).map(Gold::from_decimal)
    }

    pub fn decimal(&self) -> Decimal {
        self.0
    }

    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }

    pub fn abs(self) -> Gold {
        Gold(self.0.abs())
    }
}

impl std::fmt::Display for Gold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for Gold {
    type Output = Gold;

    fn add(self, rhs: Gold) -> Self::Output {
        Gold::from_decimal(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Gold {
    type Output = Gold;

    fn sub(self, rhs: Gold) -> Self::Output {
        Gold::from_decimal(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Gold {
    fn sum<I: Iterator<Item = Gold>>(iter: I) -> Self {
        iter.fold(Gold::default(), |acc, g| acc + g)
    }
}

#[cfg(test)]
mod tests {
    use crate::amount::{Copper, Gold};
    use rust_decimal::Decimal;

    use anyhow::{anyhow, Result};

    #[test]
    fn whole_gold_truncates() {
        // 1234g 56s 78c
        assert_eq!(Copper(12_345_678).whole_gold(), 1234);
        assert_eq!(Copper(9_999).whole_gold(), 0);
    }

    #[test]
    fn fee_keeps_four_digits() -> Result<()> {
        assert_eq!(Copper(123_456).gold().to_string(), "12.3456");
        assert_eq!(Copper(123_450).gold().to_string(), "12.3450");
        assert_eq!(
            serde_json::to_string(&Copper(123_450).gold())?,
            "12.3450"
        );
        Ok(())
    }

    #[test]
    fn fee_rounds_instead_of_truncating() -> Result<()> {
        let gold = Gold::from_f64(1.23456).ok_or(anyhow!("not representable"))?;
        assert_eq!(gold.to_string(), "1.2346");
        let half = Gold::from_decimal(Decimal::new(125, 5));
        assert_eq!(half.to_string(), "0.0013");
        Ok(())
    }

    #[test]
    fn gold_reads_back_with_scale() -> Result<()> {
        let gold: Gold = serde_json::from_str("7.5")?;
        assert_eq!(gold.to_string(), "7.5000");
        assert_eq!(serde_json::to_string(&gold)?, "7.5000");
        Ok(())
    }

    #[test]
    fn extreme_copper_saturates() {
        assert_eq!(Copper(i64::MIN).abs(), Copper(i64::MAX));
        assert_eq!(Copper(i64::MAX) + Copper(1), Copper(i64::MAX));
        assert_eq!(Copper(i64::MIN) - Copper(1), Copper(i64::MIN));
        assert_eq!(-Copper(i64::MIN), Copper(i64::MAX));
    }

    #[test]
    fn sums() {
        let copper: Copper = vec![Copper(5), Copper(-2), Copper(10)].into_iter().sum();
        assert_eq!(copper, Copper(13));
        assert_eq!(Copper(3) - Copper(5), Copper(-2));
        let gold: Gold = vec![Copper(10_000).gold(), Copper(5).gold()].into_iter().sum();
        assert_eq!(gold.to_string(), "1.0005");
    }
}
