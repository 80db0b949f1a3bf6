//! Aggregation engine
//!
//! Turns an already filtered sequence of records into a statistics snapshot:
//! totals, savings rate, per-category and per-period buckets. One pass over
//! the input, no I/O, never fails.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::models::{EntryKind, Record};

/// Bucket key for entries whose category is empty
pub const UNCATEGORIZED: &str = "未分类";

/// Number of periods kept for dashboards
pub const DASHBOARD_PERIODS: usize = 12;

/// Period bucketing granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Sortable period key for a date
    ///
    /// Weeks are Monday-based (`%W`), matching SQLite's `strftime('%W')`.
    pub fn period_key(&self, date: NaiveDate) -> String {
        let format = match self {
            Self::Day => "%Y-%m-%d",
            Self::Week => "%Y-W%W",
            Self::Month => "%Y-%m",
            Self::Year => "%Y",
        };
        date.format(format).to_string()
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            _ => Err(format!("Unknown granularity: {}", s)),
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Options for a summary
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsOptions {
    pub granularity: Granularity,
    /// Keep only the N most recent periods
    pub period_limit: Option<usize>,
}

impl StatsOptions {
    /// Dashboard options: given granularity, last 12 periods
    pub fn dashboard(granularity: Granularity) -> Self {
        Self {
            granularity,
            period_limit: Some(DASHBOARD_PERIODS),
        }
    }
}

/// Per-category totals
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub income: Decimal,
    pub expense: Decimal,
    pub count: usize,
    #[serde(skip)]
    income_count: usize,
    #[serde(skip)]
    expense_count: usize,
}

impl CategoryTotal {
    fn add(&mut self, kind: EntryKind, amount: Decimal) {
        self.count += 1;
        match kind {
            EntryKind::Income => {
                self.income += amount;
                self.income_count += 1;
            }
            EntryKind::Expense => {
                self.expense += amount;
                self.expense_count += 1;
            }
        }
    }

    fn total_for(&self, kind: EntryKind) -> (Decimal, usize) {
        match kind {
            EntryKind::Income => (self.income, self.income_count),
            EntryKind::Expense => (self.expense, self.expense_count),
        }
    }
}

/// Category buckets in first-seen order
///
/// Serializes as a JSON object whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryTotals {
    entries: Vec<(String, CategoryTotal)>,
    index: HashMap<String, usize>,
}

impl CategoryTotals {
    fn entry(&mut self, category: &str) -> &mut CategoryTotal {
        let position = match self.index.get(category) {
            Some(&position) => position,
            None => {
                self.entries
                    .push((category.to_string(), CategoryTotal::default()));
                self.index
                    .insert(category.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[position].1
    }

    pub fn get(&self, category: &str) -> Option<&CategoryTotal> {
        self.index.get(category).map(|&i| &self.entries[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CategoryTotal)> {
        self.entries.iter().map(|(name, total)| (name.as_str(), total))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for CategoryTotals {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, total) in &self.entries {
            map.serialize_entry(name, total)?;
        }
        map.end()
    }
}

/// Totals for one period bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodTotals {
    pub period: String,
    pub income: Decimal,
    pub expense: Decimal,
    pub count: usize,
}

/// Statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub net_balance: Decimal,
    /// `(income - expense) / income * 100`, one decimal place
    pub savings_rate: Decimal,
    pub record_count: usize,
    pub by_category: CategoryTotals,
    /// Ascending by period key
    pub by_period: Vec<PeriodTotals>,
}

/// One category's share of its kind's total
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub category: String,
    pub total: Decimal,
    pub count: usize,
    pub percentage: Decimal,
}

/// Per-kind category shares, largest first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryBreakdown {
    pub expense: Vec<CategoryShare>,
    pub income: Vec<CategoryShare>,
}

/// `part / whole * 100` to one decimal place; zero when `whole` is zero
pub fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    match part
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.checked_div(whole))
    {
        Some(ratio) => ratio.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero),
        None => Decimal::ZERO,
    }
}

/// Summarize records
pub fn summarize<'a, I>(records: I, options: &StatsOptions) -> Summary
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut summary = Summary::default();
    let mut periods: BTreeMap<String, PeriodTotals> = BTreeMap::new();

    for record in records {
        summary.record_count += 1;
        match record.kind {
            EntryKind::Income => summary.total_income += record.amount,
            EntryKind::Expense => summary.total_expense += record.amount,
        }

        let category = record.category.trim();
        let category = if category.is_empty() {
            UNCATEGORIZED
        } else {
            category
        };
        summary
            .by_category
            .entry(category)
            .add(record.kind, record.amount);

        let key = options.granularity.period_key(record.date);
        let bucket = periods.entry(key).or_insert_with_key(|key| PeriodTotals {
            period: key.clone(),
            ..Default::default()
        });
        bucket.count += 1;
        match record.kind {
            EntryKind::Income => bucket.income += record.amount,
            EntryKind::Expense => bucket.expense += record.amount,
        }
    }

    summary.net_balance = summary.total_income - summary.total_expense;
    summary.savings_rate = percent_of(summary.net_balance, summary.total_income);

    let mut by_period: Vec<PeriodTotals> = periods.into_values().collect();
    if let Some(limit) = options.period_limit {
        if by_period.len() > limit {
            let excess = by_period.len() - limit;
            by_period.drain(..excess);
        }
    }
    summary.by_period = by_period;

    summary
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Expense and income category shares, sorted by total descending
    pub fn category_breakdown(&self) -> CategoryBreakdown {
        CategoryBreakdown {
            expense: self.shares(EntryKind::Expense, self.total_expense),
            income: self.shares(EntryKind::Income, self.total_income),
        }
    }

    fn shares(&self, kind: EntryKind, kind_total: Decimal) -> Vec<CategoryShare> {
        let mut shares: Vec<CategoryShare> = self
            .by_category
            .iter()
            .filter_map(|(name, totals)| {
                let (total, count) = totals.total_for(kind);
                (count > 0).then(|| CategoryShare {
                    category: name.to_string(),
                    total,
                    count,
                    percentage: percent_of(total, kind_total),
                })
            })
            .collect();
        // stable: ties keep first-seen order
        shares.sort_by(|a, b| b.total.cmp(&a.total));
        shares
    }
}
