//! Price composition.
//!
//! A connection's monthly price is its base pack's price plus the price of
//! every add-on channel it subscribes to.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::{BasePack, Channel};

/// An operator price and a subscriber price, summed together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prices {
    /// Price the operator pays upstream.
    pub lco: i64,
    /// Price charged to the subscriber.
    pub customer: i64,
}

impl Prices {
    /// Create a price pair.
    #[must_use]
    pub const fn new(lco: i64, customer: i64) -> Self {
        Self { lco, customer }
    }

    /// Sum a base pack with the given add-on channels.
    ///
    /// Channels are counted once per occurrence in the iterator; callers pass
    /// one channel per add-on row.
    #[must_use]
    pub fn compose<'a>(
        pack: &BasePack,
        channels: impl IntoIterator<Item = &'a Channel>,
    ) -> Self {
        pack.prices() + channels.into_iter().map(Channel::prices).sum::<Self>()
    }

    /// Operator margin (subscriber price minus operator price).
    #[must_use]
    pub const fn margin(&self) -> i64 {
        self.customer.saturating_sub(self.lco)
    }
}

impl Add for Prices {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            lco: self.lco.saturating_add(rhs.lco),
            customer: self.customer.saturating_add(rhs.customer),
        }
    }
}

impl AddAssign for Prices {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for Prices {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, prices| acc + prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_without_addons_is_its_own_price() {
        let pack = BasePack::new("Basic", 90, 200);
        assert_eq!(Prices::compose(&pack, []), Prices::new(90, 200));
    }

    #[test]
    fn addons_are_added_to_the_pack() {
        let pack = BasePack::new("Basic", 90, 200);
        let sports = Channel::new("Sports", 20, 50);
        let movies = Channel::new("Movies", 15, 40);

        let total = Prices::compose(&pack, [&sports, &movies]);
        assert_eq!(total, Prices::new(125, 290));
        assert_eq!(total.margin(), 165);
    }

    #[test]
    fn summation_order_does_not_matter() {
        let pack = BasePack::new("Basic", 90, 200);
        let a = Channel::new("A", 7, 11);
        let b = Channel::new("B", 13, 17);
        assert_eq!(
            Prices::compose(&pack, [&a, &b]),
            Prices::compose(&pack, [&b, &a])
        );
    }
    #[test]
    fn totals_saturate_instead_of_wrapping() {
        let huge = Prices::new(i64::MAX, 1);
        assert_eq!(huge + Prices::new(1, 1), Prices::new(i64::MAX, 2));

        let mut running = Prices::new(1, i64::MAX - 1);
        running += Prices::new(1, 5);
        assert_eq!(running, Prices::new(2, i64::MAX));

        let summed: Prices = [huge, huge, Prices::new(3, 4)].into_iter().sum();
        assert_eq!(summed, Prices::new(i64::MAX, 6));
        assert_eq!(Prices::new(i64::MAX, i64::MIN).margin(), i64::MIN);
    }
}
