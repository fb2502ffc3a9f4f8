//! Value objects shared by carts and orders.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use super::OrderError;

/// Authenticated customer identity, as issued by the auth service.
///
/// Opaque to this crate; the caller guarantees it has been verified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Catalog product identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Garment size label (`"S"`, `"M"`, `"XL"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Size(String);

impl Size {
    /// Creates a size, trimming surrounding whitespace and upper-casing it.
    pub fn new(label: impl AsRef<str>) -> Self {
        Self(label.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Size {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The unit of stock accounting: one product in one size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub size: Size,
}

impl StockKey {
    pub fn new(product_id: impl Into<ProductId>, size: impl Into<Size>) -> Self {
        Self {
            product_id: product_id.into(),
            size: size.into(),
        }
    }
}

impl std::fmt::Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.product_id, self.size)
    }
}

/// An amount of rupees held as integer paise.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    paise: i64,
}

impl Money {
    pub fn from_paise(paise: i64) -> Self {
        Self { paise }
    }

    pub fn from_rupees(rupees: i64) -> Self {
        Self {
            paise: rupees * 100,
        }
    }

    pub fn zero() -> Self {
        Self { paise: 0 }
    }

    pub fn paise(&self) -> i64 {
        self.paise
    }

    /// Whole-rupee part.
    pub fn rupees(&self) -> i64 {
        self.paise / 100
    }

    pub fn is_positive(&self) -> bool {
        self.paise > 0
    }

    pub fn is_zero(&self) -> bool {
        self.paise == 0
    }

    /// `None` when the product does not fit in an `i64` of paise.
    pub fn checked_mul(&self, quantity: u32) -> Option<Money> {
        self.paise
            .checked_mul(i64::from(quantity))
            .map(Money::from_paise)
    }

    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.paise.checked_add(other.paise).map(Money::from_paise)
    }

    /// Absolute difference between two amounts.
    pub fn abs_diff(&self, other: Money) -> Money {
        Money {
            paise: self.paise.saturating_sub(other.paise).saturating_abs(),
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.paise < 0 { "-" } else { "" };
        let abs = self.paise.abs();
        write!(f, "{sign}₹{}.{:02}", abs / 100, abs % 100)
    }
}

/// One line of a cart or order: a quantity of one product size at a fixed price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub size: Size,
    pub quantity: u32,
    /// Unit price the customer saw when checkout started.
    pub unit_price: Money,
}

impl LineItem {
    pub fn new(
        product_id: impl Into<ProductId>,
        size: impl Into<Size>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            size: size.into(),
            quantity,
            unit_price,
        }
    }

    pub fn stock_key(&self) -> StockKey {
        StockKey {
            product_id: self.product_id.clone(),
            size: self.size.clone(),
        }
    }

    /// Unit price times quantity, or `None` on overflow.
    pub fn total(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// Delivery address frozen onto the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
}

impl ShippingAddress {
    /// Checks the fields a courier cannot deliver without.
    pub fn validate(&self) -> Result<(), OrderError> {
        let required = [
            ("full_name", &self.full_name),
            ("line1", &self.line1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("phone", &self.phone),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(OrderError::InvalidAddress { field });
            }
        }
        Ok(())
    }
}

/// Externally visible order reference, assigned when payment is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Builds `ORD-YYYYMMDD-<attempt id as 32 hex digits>`.
    pub fn generate(attempt_id: AggregateId, confirmed_at: DateTime<Utc>) -> Self {
        Self(format!(
            "ORD-{}-{}",
            confirmed_at.format("%Y%m%d"),
            attempt_id.reference_code()
        ))
    }

    pub fn parse(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The attempt id encoded in the number, if it is well formed.
    pub fn attempt_id(&self) -> Option<AggregateId> {
        let code = self.0.strip_prefix("ORD-")?.split_once('-')?.1;
        if code.len() != 32 {
            return None;
        }
        uuid::Uuid::parse_str(code).ok().map(AggregateId::from_uuid)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Asha Rao".to_string(),
            line1: "12 MG Road".to_string(),
            line2: None,
            city: "Bengaluru".to_string(),
            state: "KA".to_string(),
            postal_code: "560001".to_string(),
            country: "IN".to_string(),
            phone: "+91 98450 00000".to_string(),
        }
    }

    #[test]
    fn money_display_in_rupees() {
        assert_eq!(Money::from_paise(99_900).to_string(), "₹999.00");
        assert_eq!(Money::from_paise(1234).to_string(), "₹12.34");
        assert_eq!(Money::from_paise(5).to_string(), "₹0.05");
        assert_eq!(Money::from_paise(-250).to_string(), "-₹2.50");
    }

    #[test]
    fn money_arithmetic() {
        let unit = Money::from_rupees(499);
        assert_eq!(unit.checked_mul(2), Some(Money::from_paise(99_800)));
        assert_eq!(
            unit.checked_add(Money::from_paise(1)),
            Some(Money::from_paise(49_901))
        );
        assert_eq!(
            Money::from_paise(100).abs_diff(Money::from_paise(130)),
            Money::from_paise(30)
        );
    }

    #[test]
    fn money_arithmetic_reports_overflow() {
        assert_eq!(Money::from_paise(i64::MAX / 2).checked_mul(3), None);
        assert_eq!(Money::from_paise(i64::MAX).checked_add(Money::from_paise(1)), None);
    }

    #[test]
    fn size_is_normalised() {
        assert_eq!(Size::new(" m "), Size::new("M"));
        assert_eq!(StockKey::new("TEE-01", "xl").to_string(), "TEE-01/XL");
    }

    #[test]
    fn line_item_total() {
        let line = LineItem::new("TEE-01", "M", 3, Money::from_rupees(100));
        assert_eq!(line.total(), Some(Money::from_rupees(300)));
        assert_eq!(line.stock_key(), StockKey::new("TEE-01", "M"));
    }

    #[test]
    fn address_requires_deliverable_fields() {
        assert!(address().validate().is_ok());

        let mut missing_city = address();
        missing_city.city = "   ".to_string();
        assert!(matches!(
            missing_city.validate(),
            Err(OrderError::InvalidAddress { field: "city" })
        ));
    }

    #[test]
    fn order_number_format() {
        let attempt = AggregateId::from_uuid(
            uuid::Uuid::parse_str("deadbeef-0000-4000-8000-000000000000").unwrap(),
        );
        let at = Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap();
        assert_eq!(
            OrderNumber::generate(attempt, at).as_str(),
            "ORD-20261017-DEADBEEF000040008000000000000000"
        );
    }

    #[test]
    fn order_number_decodes_attempt_id() {
        let attempt = AggregateId::new();
        let number = OrderNumber::generate(attempt, Utc::now());
        assert_eq!(number.attempt_id(), Some(attempt));

        assert_eq!(OrderNumber::parse("ORD-20261017-DEADBEEF").attempt_id(), None);
        assert_eq!(OrderNumber::parse("not-an-order").attempt_id(), None);
    }

    #[test]
    fn attempts_sharing_a_prefix_get_distinct_order_numbers() {
        let at = Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap();
        let first = AggregateId::from_uuid(
            uuid::Uuid::parse_str("deadbeef-0000-4000-8000-000000000000").unwrap(),
        );
        let second = AggregateId::from_uuid(
            uuid::Uuid::parse_str("deadbeef-1111-4111-8111-111111111111").unwrap(),
        );
        assert_ne!(
            OrderNumber::generate(first, at),
            OrderNumber::generate(second, at)
        );
    }
}
