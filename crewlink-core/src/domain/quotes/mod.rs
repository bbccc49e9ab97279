mod ledger;

pub use ledger::{QuoteDraft, QuoteLedger};
