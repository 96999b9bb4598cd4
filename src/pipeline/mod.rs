//! Event ingestion: the bounded queue, the batching dispatcher and the decay
//! scheduler.

pub mod decay;
pub mod dispatcher;
pub mod event;
pub mod queue;
