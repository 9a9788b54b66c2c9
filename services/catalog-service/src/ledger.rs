//! Stock/reservation arithmetic for a single variant row.
//!
//! Stores load the row under a lock, call [`StockLevel::apply`] and write the result back in the
//! same transaction, so every mutation path shares these checks.

use serde::Serialize;

use crate::error::{CatalogError, CatalogResult};
use crate::model::VariantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub stock: u32,
    pub reserved: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockOp {
    Reserve(u32),
    Release(u32),
    SetStock(u32),
}

impl StockOp {
    pub fn name(&self) -> &'static str {
        match self {
            StockOp::Reserve(_) => "reserve",
            StockOp::Release(_) => "release",
            StockOp::SetStock(_) => "set_stock",
        }
    }
}

impl StockLevel {
    /// Build from storage columns. Values outside `u32` are clamped; the table CHECK keeps them in range.
    pub fn from_columns(stock: i64, reserved: i64) -> Self {
        Self { stock: clamp_u32(stock), reserved: clamp_u32(reserved) }
    }

    pub fn available(&self) -> u32 {
        self.stock.saturating_sub(self.reserved)
    }

    pub fn apply(self, variant_id: VariantId, op: StockOp) -> CatalogResult<StockLevel> {
        match op {
            StockOp::Reserve(quantity) => {
                if quantity == 0 {
                    return Err(CatalogError::InvalidQuantity);
                }
                if u64::from(self.reserved) + u64::from(quantity) > u64::from(self.stock) {
                    return Err(CatalogError::InsufficientStock {
                        variant_id,
                        requested: quantity,
                        available: self.available(),
                    });
                }
                Ok(StockLevel { stock: self.stock, reserved: self.reserved + quantity })
            }
            StockOp::Release(quantity) => {
                if quantity == 0 {
                    return Err(CatalogError::InvalidQuantity);
                }
                if quantity > self.reserved {
                    return Err(CatalogError::ExcessRelease {
                        variant_id,
                        requested: quantity,
                        reserved: self.reserved,
                    });
                }
                Ok(StockLevel { stock: self.stock, reserved: self.reserved - quantity })
            }
            StockOp::SetStock(stock) => {
                if stock < self.reserved {
                    return Err(CatalogError::StockBelowReserved {
                        variant_id,
                        requested: stock,
                        reserved: self.reserved,
                    });
                }
                Ok(StockLevel { stock, reserved: self.reserved })
            }
        }
    }
}

pub(crate) fn clamp_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(stock: u32, reserved: u32) -> StockLevel {
        StockLevel { stock, reserved }
    }

    #[test]
    fn reserve_up_to_available() {
        let next = level(10, 4).apply(1, StockOp::Reserve(6)).unwrap();
        assert_eq!(next, level(10, 10));
        assert_eq!(next.available(), 0);
    }

    #[test]
    fn reserve_past_available_is_rejected() {
        let err = level(10, 5).apply(1, StockOp::Reserve(6)).unwrap_err();
        assert!(matches!(err, CatalogError::InsufficientStock { requested: 6, available: 5, .. }));
    }

    #[test]
    fn reserve_does_not_overflow() {
        let err = level(u32::MAX, u32::MAX - 1).apply(1, StockOp::Reserve(u32::MAX)).unwrap_err();
        assert!(matches!(err, CatalogError::InsufficientStock { .. }));
    }

    #[test]
    fn zero_quantities_are_invalid() {
        assert!(matches!(level(1, 0).apply(1, StockOp::Reserve(0)), Err(CatalogError::InvalidQuantity)));
        assert!(matches!(level(1, 1).apply(1, StockOp::Release(0)), Err(CatalogError::InvalidQuantity)));
    }

    #[test]
    fn release_more_than_reserved_is_rejected() {
        let err = level(10, 2).apply(9, StockOp::Release(3)).unwrap_err();
        assert!(matches!(err, CatalogError::ExcessRelease { variant_id: 9, requested: 3, reserved: 2 }));
    }

    #[test]
    fn set_stock_below_reserved_is_rejected() {
        let err = level(10, 6).apply(2, StockOp::SetStock(5)).unwrap_err();
        assert!(matches!(err, CatalogError::StockBelowReserved { requested: 5, reserved: 6, .. }));
        assert_eq!(level(10, 6).apply(2, StockOp::SetStock(6)).unwrap(), level(6, 6));
    }

    #[test]
    fn columns_are_clamped() {
        assert_eq!(StockLevel::from_columns(-3, 0), level(0, 0));
        assert_eq!(StockLevel::from_columns(i64::MAX, 1), level(u32::MAX, 1));
    }
}
