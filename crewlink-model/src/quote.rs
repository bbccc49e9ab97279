use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::ModelError;
use crate::ids::{JobId, QuoteId, UserId};

/// Share of a quote's total that may be requested up front.
pub const ADVANCE_CAP_PERCENT: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum QuoteStatus {
    Pending,
    Accepted,
    /// A sibling quote was accepted; kept for history, out of consideration.
    Invalidated,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Pending => "PENDING",
            QuoteStatus::Accepted => "ACCEPTED",
            QuoteStatus::Invalidated => "INVALIDATED",
        }
    }
}

impl Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(QuoteStatus::Pending),
            "ACCEPTED" => Ok(QuoteStatus::Accepted),
            "INVALIDATED" => Ok(QuoteStatus::Invalidated),
            other => Err(ModelError::UnknownVariant {
                kind: "quote status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Quote {
    pub id: QuoteId,
    pub job_id: JobId,
    pub contractor_id: UserId,
    pub amount: Decimal,
    pub total_amount: Option<Decimal>,
    pub notes: Option<String>,
    pub add_ons: Vec<String>,
    pub documents: Vec<String>,
    pub status: QuoteStatus,
    pub advance_requested: bool,
    pub advance_amount: Decimal,
    pub meeting_scheduled_on: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    /// The billable total: `total_amount` when set, otherwise `amount`.
    pub fn effective_total(&self) -> Decimal {
        self.total_amount.unwrap_or(self.amount)
    }

    /// Largest advance this quote allows (inclusive).
    pub fn max_advance(&self) -> Decimal {
        self.effective_total() * Decimal::new(ADVANCE_CAP_PERCENT as i64, 2)
    }

    pub fn is_live(&self) -> bool {
        self.status != QuoteStatus::Invalidated
    }
}

/// A contractor's priced offer as submitted, before it is stored.
#[derive(Debug, Clone)]
pub struct QuoteSubmission {
    pub job_id: JobId,
    pub contractor_id: UserId,
    pub amount: Decimal,
    pub total_amount: Option<Decimal>,
    pub notes: Option<String>,
    pub add_ons: Vec<String>,
    pub documents: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(amount: i64, total: Option<i64>) -> Quote {
        let now = Utc::now();
        Quote {
            id: QuoteId::new(),
            job_id: JobId::new(),
            contractor_id: UserId::new(),
            amount: Decimal::from(amount),
            total_amount: total.map(Decimal::from),
            notes: None,
            add_ons: Vec::new(),
            documents: Vec::new(),
            status: QuoteStatus::Pending,
            advance_requested: false,
            advance_amount: Decimal::ZERO,
            meeting_scheduled_on: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn advance_cap_uses_total_when_present() {
        assert_eq!(quote(1000, None).max_advance(), Decimal::from(200));
        assert_eq!(quote(1000, Some(1500)).max_advance(), Decimal::from(300));
    }

    #[test]
    fn advance_cap_is_exact_for_fractional_totals() {
        let q = Quote {
            amount: Decimal::new(99999, 2),
            ..quote(0, None)
        };
        assert_eq!(q.max_advance(), Decimal::new(1999980, 4));
    }
}
