pub mod directory;
pub mod engine;
pub mod ledger;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod sweep;
pub mod wire;
