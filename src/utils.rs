use crate::types::Bill;

use chrono::NaiveDate;

#[derive(Debug, Default)]
pub struct BillFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<usize>,
}

impl BillFilter {
    pub fn apply(self, mut bills: Vec<Bill>) -> Vec<Bill> {
        if let Some(start) = self.start_date {
            bills.retain(|b| b.date >= start);
        }
        if let Some(end) = self.end_date {
            bills.retain(|b| b.date <= end);
        }
        if let Some(lim) = self.limit {
            bills.truncate(lim);
        }
        bills
    }

    pub fn validate(self) -> Result<Self, String> {
        if let Some(start) = self.start_date
            && let Some(end) = self.end_date
            && start > end
        {
            return Err(format!(
                "Start date ({start}) cannot be after end date ({end})"
            ));
        }
        if self.limit.is_some_and(|l| l == 0) {
            return Err("Limit must be greater than 0".to_string());
        }
        Ok(self)
    }
}

#[derive(Debug)]
pub struct BillStats {
    pub count: usize,
    pub total_amount: f64,
    pub oldest: Option<NaiveDate>,
    pub newest: Option<NaiveDate>,
}

impl BillStats {
    pub fn from_bills(bills: &[Bill]) -> BillStats {
        BillStats {
            count: bills.len(),
            total_amount: bills.iter().map(|b| b.amount).sum(),
            oldest: bills.iter().map(|b| b.date).min(),
            newest: bills.iter().map(|b| b.date).max(),
        }
    }
}

impl std::fmt::Display for BillStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nStatistics:")?;
        writeln!(f, "  Bills:        {}", self.count)?;
        writeln!(f, "  Total amount: {:.2}\u{20ac}", self.total_amount)?;
        if let (Some(oldest), Some(newest)) = (self.oldest, self.newest) {
            writeln!(f, "  From:         {}", oldest)?;
            writeln!(f, "  To:           {}", newest)?;
        }
        Ok(())
    }
}
