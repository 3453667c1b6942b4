//! Response payload builders: Bundles and OperationOutcomes.

pub mod bundle;
pub mod outcome;
