//! Status enums for orders and payment methods.

use serde::{Deserialize, Serialize};

use super::money::CurrencyCode;

/// Order lifecycle status as written by the payment functions.
///
/// Older writers used slightly different sets of values, so anything
/// unrecognised deserializes to [`OrderStatus::Unknown`] instead of failing
/// the whole order list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
    Delivered,
    Expired,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// Customer-facing label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "待付款",
            Self::Paid => "待发货",
            Self::Shipped => "已发货",
            Self::Delivered => "已寄到",
            Self::Expired => "已结束（未付款）",
            Self::Cancelled => "已取消",
            Self::Unknown => "",
        }
    }

    /// CSS classes for the status badge.
    #[must_use]
    pub const fn badge_class(self) -> &'static str {
        match self {
            Self::Delivered => "bg-green-100 text-green-800",
            Self::Shipped => "bg-blue-100 text-blue-800",
            Self::Pending => "bg-yellow-100 text-yellow-800",
            Self::Paid => "bg-indigo-100 text-indigo-800",
            Self::Expired | Self::Cancelled | Self::Unknown => "bg-gray-100 text-gray-800",
        }
    }

    /// Only unpaid orders can be sent back to the payment provider.
    #[must_use]
    pub const fn can_resume_payment(self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// How the customer settles an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Alipay QR / redirect checkout.
    #[serde(rename = "alipay")]
    Alipay,
    /// WeChat Pay native QR code.
    #[serde(rename = "wechat")]
    Wechat,
    /// Interac e-Transfer, settled out of band in CAD.
    #[serde(rename = "etransfer")]
    ETransfer,
    /// Contact customer service; settled out of band in CNY.
    #[serde(rename = "manually")]
    Manual,
}

impl PaymentMethod {
    /// All methods in the order they are offered at checkout.
    pub const ALL: [Self; 4] = [Self::Wechat, Self::Alipay, Self::ETransfer, Self::Manual];

    /// Wire value, matching the serde representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alipay => "alipay",
            Self::Wechat => "wechat",
            Self::ETransfer => "etransfer",
            Self::Manual => "manually",
        }
    }

    /// Customer-facing label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Alipay => "支付宝",
            Self::Wechat => "微信支付",
            Self::ETransfer => "E-Transfer",
            Self::Manual => "联系客服付款",
        }
    }

    /// Currency the order total is converted into for this method.
    #[must_use]
    pub const fn settlement_currency(self) -> CurrencyCode {
        match self {
            Self::ETransfer => CurrencyCode::CAD,
            Self::Alipay | Self::Wechat | Self::Manual => CurrencyCode::CNY,
        }
    }

    /// Whether settlement happens outside the storefront (no redirect, no QR).
    #[must_use]
    pub const fn is_out_of_band(self) -> bool {
        matches!(self, Self::ETransfer | Self::Manual)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alipay" => Ok(Self::Alipay),
            "wechat" => Ok(Self::Wechat),
            "etransfer" => Ok(Self::ETransfer),
            "manually" => Ok(Self::Manual),
            _ => Err(format!("invalid payment method: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_status_does_not_fail() {
        let status: OrderStatus = serde_json::from_str("\"refunded\"").unwrap();
        assert_eq!(status, OrderStatus::Unknown);
        assert_eq!(status.label(), "");
    }

    #[test]
    fn test_status_roundtrip_names() {
        let status: OrderStatus = serde_json::from_str("\"expired\"").unwrap();
        assert_eq!(status, OrderStatus::Expired);
        assert_eq!(status.to_string(), "expired");
        assert_eq!(status.label(), "已结束（未付款）");
    }

    #[test]
    fn test_only_pending_resumes() {
        assert!(OrderStatus::Pending.can_resume_payment());
        assert!(!OrderStatus::Paid.can_resume_payment());
        assert!(!OrderStatus::Expired.can_resume_payment());
    }

    #[test]
    fn test_payment_method_wire_names() {
        for method in PaymentMethod::ALL {
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.as_str()));
            assert_eq!(method.as_str().parse::<PaymentMethod>().unwrap(), method);
        }
        assert!("paypal".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_settlement_currency() {
        assert_eq!(
            PaymentMethod::ETransfer.settlement_currency(),
            CurrencyCode::CAD
        );
        assert_eq!(PaymentMethod::Manual.settlement_currency(), CurrencyCode::CNY);
        assert!(PaymentMethod::Manual.is_out_of_band());
        assert!(!PaymentMethod::Alipay.is_out_of_band());
    }
}
