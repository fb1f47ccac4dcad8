//! Tandem keys: the client-side naming convention grouping related values
//! under one logical entity.
//!
//! Order 0 is the base key itself; order `i` is `base.i`. Nothing here
//! touches core invariants — each order is an ordinary single-slot
//! operation, so partial failures leave earlier orders in place exactly as
//! a sequence of plain `set` calls would.

use splinter_error::Result;

use crate::store::Splinter;

/// Separator between a base key and its order index.
pub const ORDER_SEPARATOR: &str = ".";

/// Build the key for order `order` of `base`.
fn order_key(base: &str, order: usize) -> String {
    format!("{base}{ORDER_SEPARATOR}{order}")
}

impl Splinter {
    /// Write all orders of a tandem: `vals[0]` to `base`, `vals[i]` to
    /// `base.i`. Stops at the first failing order.
    pub fn set_tandem(&self, base: &str, vals: &[&[u8]]) -> Result<()> {
        let Some((first, rest)) = vals.split_first() else {
            return Ok(());
        };
        self.set(base, first)?;
        for (i, val) in rest.iter().enumerate() {
            self.set(&order_key(base, i + 1), val)?;
        }
        Ok(())
    }

    /// Remove `base` and its orders `1..orders`, returning how many keys
    /// were actually removed. Absent orders are skipped.
    pub fn unset_tandem(&self, base: &str, orders: usize) -> usize {
        let mut removed = 0;
        if self.unset(base).is_ok() {
            removed += 1;
        }
        for i in 1..orders {
            if self.unset(&order_key(base, i)).is_ok() {
                removed += 1;
            }
        }
        removed
    }
}
