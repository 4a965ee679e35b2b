mod ledger;

pub(crate) use ledger::Ledger;
