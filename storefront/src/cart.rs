//! Cart model.
//!
//! A cart is a value. Every transition consumes the cart and returns the next
//! one, so the quantity invariants can be checked without any runtime around it:
//!
//! - a line's quantity is always in `1..=cap`, where cap is `max_qty_per_order`
//!   for tiers and `stock` for products
//! - a line that would reach zero is removed

use crate::catalog::Catalog;
use crate::types::{LineItem, Money, ProductId, TierId};

/// One cart line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CartLine {
    /// What is being bought
    pub item: LineItem,
    /// How many (never zero)
    pub quantity: u32,
}

/// Selected tiers and products, in the order they were first added
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// An empty cart
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Change a line by `delta`, clamped to `0..=cap`
    ///
    /// A result of zero removes the line.
    #[must_use]
    pub fn add_line(mut self, item: LineItem, delta: i32, cap: u32) -> Self {
        let current = self.quantity(item);
        let wanted = i64::from(current) + i64::from(delta);
        let next = u32::try_from(wanted.clamp(0, i64::from(cap))).unwrap_or(0);

        match (self.lines.iter().position(|l| l.item == item), next) {
            (Some(index), 0) => {
                self.lines.remove(index);
            },
            (Some(index), quantity) => self.lines[index].quantity = quantity,
            (None, 0) => {},
            (None, quantity) => self.lines.push(CartLine { item, quantity }),
        }
        self
    }

    /// Take one unit off a line
    #[must_use]
    pub fn remove_line(self, item: LineItem) -> Self {
        let current = self.quantity(item);
        self.add_line(item, -1, current)
    }

    /// Drop every line the catalog no longer allows and re-apply caps
    #[must_use]
    pub fn reconcile(self, catalog: &Catalog) -> Self {
        self.lines
            .into_iter()
            .fold(Self::new(), |cart, line| {
                let cap = catalog.cap_of(line.item);
                cart.add_line(line.item, i32::try_from(line.quantity).unwrap_or(i32::MAX), cap)
            })
    }

    /// Quantity of `item` (zero when absent)
    #[must_use]
    pub fn quantity(&self, item: LineItem) -> u32 {
        self.lines
            .iter()
            .find(|l| l.item == item)
            .map_or(0, |l| l.quantity)
    }

    /// All lines
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Ticket lines
    pub fn tickets(&self) -> impl Iterator<Item = (TierId, u32)> + '_ {
        self.lines.iter().filter_map(|l| match l.item {
            LineItem::Tier(id) => Some((id, l.quantity)),
            LineItem::Product(_) => None,
        })
    }

    /// Product lines
    pub fn products(&self) -> impl Iterator<Item = (ProductId, u32)> + '_ {
        self.lines.iter().filter_map(|l| match l.item {
            LineItem::Product(id) => Some((id, l.quantity)),
            LineItem::Tier(_) => None,
        })
    }

    /// Whether nothing is selected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// `Σ price × quantity` at current catalog prices
    #[must_use]
    pub fn subtotal(&self, catalog: &Catalog) -> Money {
        self.lines
            .iter()
            .filter_map(|l| catalog.price_of(l.item).map(|price| price.times(l.quantity)))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{event, product, tier};
    use crate::catalog::Visibility;
    use crate::types::TierId;
    use proptest::prelude::*;

    fn catalog() -> Catalog {
        let event = event(Visibility::Public);
        Catalog::new(
            event,
            vec![tier("Regular", "Standing", 1000, 4), tier("VIP", "Seated", 3500, 2)],
            vec![product("Poster", 500, 3, None)],
        )
    }

    #[test]
    fn add_clamps_to_cap() {
        let item = LineItem::Tier(TierId::new());
        let cart = Cart::new().add_line(item, 10, 4);
        assert_eq!(cart.quantity(item), 4);

        let cart = cart.add_line(item, 1, 4);
        assert_eq!(cart.quantity(item), 4);
    }

    #[test]
    fn negative_delta_to_zero_removes_line() {
        let item = LineItem::Tier(TierId::new());
        let cart = Cart::new().add_line(item, 2, 4).add_line(item, -5, 4);
        assert!(cart.is_empty());
    }

    #[test]
    fn zero_cap_never_adds() {
        let item = LineItem::Tier(TierId::new());
        assert!(Cart::new().add_line(item, 1, 0).is_empty());
    }

    #[test]
    fn subtotal_uses_catalog_prices() {
        let catalog = catalog();
        let regular = LineItem::Tier(catalog.tiers[0].id);
        let poster = LineItem::Product(catalog.products[0].id);

        let cart = Cart::new()
            .add_line(regular, 2, catalog.cap_of(regular))
            .add_line(poster, 1, catalog.cap_of(poster));

        assert_eq!(cart.subtotal(&catalog), Money::from_major(2500));
        assert_eq!(cart.tickets().count(), 1);
        assert_eq!(cart.products().collect::<Vec<_>>(), vec![(catalog.products[0].id, 1)]);
    }

    #[test]
    fn reconcile_applies_new_caps() {
        let mut catalog = catalog();
        let poster = LineItem::Product(catalog.products[0].id);
        let cart = Cart::new().add_line(poster, 3, 3);

        catalog.products[0].stock = 1;
        assert_eq!(cart.reconcile(&catalog).quantity(poster), 1);
    }

    fn op() -> impl Strategy<Value = (usize, i32, bool)> {
        (0usize..3, -3i32..6, any::<bool>())
    }

    proptest! {
        #[test]
        fn quantities_stay_within_caps_and_subtotal_is_exact(ops in prop::collection::vec(op(), 0..40)) {
            let catalog = catalog();
            let items = [
                LineItem::Tier(catalog.tiers[0].id),
                LineItem::Tier(catalog.tiers[1].id),
                LineItem::Product(catalog.products[0].id),
            ];

            let mut cart = Cart::new();
            for (index, delta, remove) in ops {
                let item = items[index];
                cart = if remove {
                    cart.remove_line(item)
                } else {
                    cart.add_line(item, delta, catalog.cap_of(item))
                };
            }

            let mut expected = Money::ZERO;
            for line in cart.lines() {
                prop_assert!(line.quantity >= 1);
                prop_assert!(line.quantity <= catalog.cap_of(line.item));
                expected = expected + catalog.price_of(line.item).unwrap_or_default().times(line.quantity);
            }
            prop_assert_eq!(cart.subtotal(&catalog), expected);
        }

        #[test]
        fn removing_every_unit_leaves_no_trace(adds in 1i32..10) {
            let item = LineItem::Tier(TierId::new());
            let mut cart = Cart::new().add_line(item, adds, 6);
            while cart.quantity(item) > 0 {
                cart = cart.remove_line(item);
            }
            prop_assert_eq!(cart, Cart::new());
        }
    }
}
