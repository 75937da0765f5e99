#![forbid(unsafe_code)]

mod frame;
mod pool;
mod strategy;

pub use pool::{
    BufferPool, PageReadGuard, PageWriteGuard, PoolOptions, PoolStats, MAX_PAGE_SIZE,
    MIN_PAGE_SIZE,
};
pub use strategy::{AccessStrategy, StrategyKind, DEFAULT_BULK_READ_RING};
