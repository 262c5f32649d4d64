//! Conversion of transaction options into driver option types

use mongodb::options::{
    Acknowledgment as MongoAcknowledgment, ReadConcern, TransactionOptions as MongoTransactionOptions,
    WriteConcern as MongoWriteConcern,
};
use txrun_core::{Acknowledgment, ReadConcernLevel, TransactionOptions, WriteConcern};

pub(crate) fn read_concern(level: ReadConcernLevel) -> ReadConcern {
    match level {
        ReadConcernLevel::Local => ReadConcern::local(),
        ReadConcernLevel::Available => ReadConcern::available(),
        ReadConcernLevel::Majority => ReadConcern::majority(),
        ReadConcernLevel::Linearizable => ReadConcern::linearizable(),
        ReadConcernLevel::Snapshot => ReadConcern::snapshot(),
    }
}

pub(crate) fn write_concern(concern: &WriteConcern) -> MongoWriteConcern {
    let mut converted = MongoWriteConcern::default();
    converted.w = concern.w.as_ref().map(|w| match w {
        Acknowledgment::Majority => MongoAcknowledgment::Majority,
        Acknowledgment::Nodes(n) => MongoAcknowledgment::Nodes(*n),
        Acknowledgment::Tag(tag) => MongoAcknowledgment::Custom(tag.clone()),
    });
    converted.journal = concern.journal;
    converted.w_timeout = concern.timeout();
    converted
}

/// Build the driver's per-transaction options
pub(crate) fn transaction_options(options: &TransactionOptions) -> MongoTransactionOptions {
    let mut converted = MongoTransactionOptions::default();
    converted.read_concern = options.read_concern().map(read_concern);
    converted.write_concern = options.write_concern().map(write_concern);
    converted.max_commit_time = options.max_commit_time();
    converted
}
