//! Attendance, payroll and notice-board models.
//!
//! Money is held in integer cents.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One clock-in event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attendance {
    pub id: Uuid,
    pub user_id: Uuid,
    pub check_in_time: DateTime<Utc>,
}

/// Pay for one account in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalaryRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub year: i32,
    /// 1-12.
    pub month: u32,
    pub amount_cents: i64,
}

/// Calendar month used to filter salary records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayPeriod {
    pub year: i32,
    pub month: u32,
}

impl PayPeriod {
    /// `None` unless `month` is 1-12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }
}

/// How a public item pays out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKind {
    Hourly,
    Fixed,
    Commission,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Hourly => "HOURLY",
            ItemKind::Fixed => "FIXED",
            ItemKind::Commission => "COMMISSION",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown item kind '{0}'")]
pub struct UnknownItemKind(pub String);

impl FromStr for ItemKind {
    type Err = UnknownItemKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HOURLY" => Ok(ItemKind::Hourly),
            "FIXED" => Ok(ItemKind::Fixed),
            "COMMISSION" => Ok(ItemKind::Commission),
            _ => Err(UnknownItemKind(s.to_string())),
        }
    }
}

/// A job or bonus posted by a boss for every employee to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicItem {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub kind: Option<ItemKind>,
    pub hourly_rate_cents: Option<i64>,
    pub fixed_amount_cents: Option<i64>,
    /// Account that posted the item.
    pub created_by: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PublicItem {
    /// Active and not past its end date.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.active && self.end_date.is_none_or(|end| end > now)
    }
}
