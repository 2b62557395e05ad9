mod environment;
pub(crate) use environment::{EnvPtr, TxnLease};
pub use environment::{
    DATA_FILE_NAME, Environment, EnvironmentBuilder, EnvironmentConfig, Info, Stat,
};

pub(crate) mod txn_manager;
