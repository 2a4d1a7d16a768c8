use bitcoin::OutPoint;
use chrono::{DateTime, Utc};

/// State of one (output, asset) balance row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BalanceState {
    /// Not queried yet
    NeverChecked,
    /// The tracker does not know this output or does not track the asset
    Unknown,
    /// Unconfirmed, but the value comes from this wallet
    Own,
    /// Re-query requested
    Refresh,
    Spent,
    /// Confirmed non-zero quantity
    Valid,
    Zero,
    /// Row of a deleted asset
    Deleted,
    /// Computed locally from a transaction created by this wallet
    Calculated,
}

impl BalanceState {
    /// States whose quantity is settled by a tracker answer
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Valid | Self::Zero | Self::Spent)
    }
}

/// Quantity and bookkeeping of one balance row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceEntry {
    pub quantity: Option<u64>,
    pub checked: Option<DateTime<Utc>>,
    pub failures: u32,
    pub state: BalanceState,
}

impl Default for BalanceEntry {
    fn default() -> Self {
        Self {
            quantity: None,
            checked: None,
            failures: 0,
            state: BalanceState::NeverChecked,
        }
    }
}

impl BalanceEntry {
    pub fn new(state: BalanceState, quantity: Option<u64>, now: DateTime<Utc>) -> Self {
        let mut entry = Self::default();
        entry.set_quantity(state, quantity, now);
        entry
    }

    /// Move to `state`, updating the check timestamp and failure counter
    pub fn set_quantity(&mut self, state: BalanceState, quantity: Option<u64>, now: DateTime<Utc>) {
        self.state = state;
        match state {
            BalanceState::Unknown
            | BalanceState::Own
            | BalanceState::Calculated
            | BalanceState::Spent => {
                self.checked = Some(now);
                self.failures += 1;
                self.quantity = quantity;
            }
            BalanceState::Zero | BalanceState::Valid => {
                self.checked = Some(now);
                self.failures = 0;
                if quantity.unwrap_or(0) == 0 {
                    self.state = BalanceState::Zero;
                }
                self.quantity = quantity;
            }
            BalanceState::Refresh | BalanceState::Deleted => {
                self.checked = None;
                self.failures = 0;
            }
            BalanceState::NeverChecked => {
                self.checked = None;
                self.failures = 0;
                self.quantity = quantity;
            }
        }
    }

    /// Whether a periodic reconciliation should re-query this row
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            BalanceState::NeverChecked | BalanceState::Refresh => true,
            BalanceState::Unknown | BalanceState::Own | BalanceState::Calculated => {
                let elapsed = self
                    .checked
                    .map_or(i64::MAX, |checked| (now - checked).num_seconds());
                match self.failures {
                    0..=39 => true,
                    40..=79 => elapsed > 15,
                    80..=119 => elapsed > 3600,
                    _ => elapsed > 86400,
                }
            }
            _ => false,
        }
    }
}

/// Balance of one asset at one transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    pub txout: OutPoint,
    pub asset_id: u32,
    pub quantity: Option<u64>,
    pub checked: Option<DateTime<Utc>>,
    pub failures: u32,
    pub state: BalanceState,
}

impl Balance {
    pub(crate) fn new(txout: OutPoint, asset_id: u32, entry: &BalanceEntry) -> Self {
        Self {
            txout,
            asset_id,
            quantity: entry.quantity,
            checked: entry.checked,
            failures: entry.failures,
            state: entry.state,
        }
    }
}

/// A row taken out of the ledger for reconciliation
#[derive(Debug, Clone)]
pub(crate) struct BalanceUpdate {
    pub txout: OutPoint,
    pub asset_id: u32,
    pub entry: BalanceEntry,
    /// Value before reconciliation touched the row; set means "write back"
    pub old: Option<BalanceEntry>,
    /// File offset of the 20-byte row, if the row is stored
    pub row_offset: Option<u64>,
    /// Native currency value of the output, in satoshis
    pub native_qty: Option<u64>,
    /// Tracker server the row was sent to
    pub server: Option<usize>,
}

impl BalanceUpdate {
    pub fn new(
        txout: OutPoint,
        asset_id: u32,
        entry: BalanceEntry,
        row_offset: Option<u64>,
        native_qty: Option<u64>,
    ) -> Self {
        Self {
            txout,
            asset_id,
            entry,
            old: None,
            row_offset,
            native_qty,
            server: None,
        }
    }

    /// Mark the row modified, keeping its first prior value
    pub fn snapshot(&mut self) {
        if self.old.is_none() {
            self.old = Some(self.entry.clone());
        }
    }

    pub fn needs_write(&self) -> bool {
        self.row_offset.is_some()
            && (self.old.is_some() || self.entry.state == BalanceState::Refresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_set_quantity_failure_states() {
        let now = Utc::now();
        let mut entry = BalanceEntry::default();
        entry.set_quantity(BalanceState::Unknown, Some(5), now);
        entry.set_quantity(BalanceState::Unknown, Some(5), now);
        assert_eq!(entry.failures, 2);
        assert_eq!(entry.checked, Some(now));
        assert_eq!(entry.quantity, Some(5));
    }

    #[test]
    fn test_set_quantity_valid_resets_failures() {
        let now = Utc::now();
        let mut entry = BalanceEntry::new(BalanceState::Unknown, None, now);
        entry.set_quantity(BalanceState::Valid, Some(100), now);
        assert_eq!(entry.state, BalanceState::Valid);
        assert_eq!(entry.failures, 0);

        entry.set_quantity(BalanceState::Valid, Some(0), now);
        assert_eq!(entry.state, BalanceState::Zero);
    }

    #[test]
    fn test_refresh_keeps_quantity() {
        let now = Utc::now();
        let mut entry = BalanceEntry::new(BalanceState::Own, Some(40), now);
        entry.set_quantity(BalanceState::Refresh, None, now);
        assert_eq!(entry.state, BalanceState::Refresh);
        assert_eq!(entry.quantity, Some(40));
        assert_eq!(entry.checked, None);
        assert_eq!(entry.failures, 0);

        let once = entry.clone();
        entry.set_quantity(BalanceState::Refresh, None, now);
        assert_eq!(entry, once);
    }

    #[test]
    fn test_due_cadence() {
        let now = Utc::now();
        let entry = |failures: u32, ago: i64| BalanceEntry {
            quantity: None,
            checked: Some(now - Duration::seconds(ago)),
            failures,
            state: BalanceState::Unknown,
        };
        assert!(entry(39, 0).is_due(now));
        assert!(!entry(70, 10).is_due(now));
        assert!(entry(70, 16).is_due(now));
        assert!(!entry(100, 1800).is_due(now));
        assert!(entry(100, 3601).is_due(now));
        assert!(!entry(200, 3601).is_due(now));
        assert!(entry(200, 86401).is_due(now));

        assert!(BalanceEntry::default().is_due(now));
        assert!(!BalanceEntry::new(BalanceState::Valid, Some(1), now).is_due(now));
    }
}
