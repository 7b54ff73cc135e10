// Library exports for the runner, tools and tests
pub mod adapters;           // per-variant quote adapters
pub mod broadcaster;        // sign, submit, confirm
pub mod config;
pub mod deserializers;      // on-chain account layouts
pub mod dex_interface;      // quote contract and exact cpmm math
pub mod error;
pub mod flashloan;          // borrow -> 3 swaps -> repay
pub mod hydration;          // batched reserve hydration + validation
pub mod leg_simulator;
pub mod logging;
pub mod metrics;            // run-scoped simulation counters
pub mod mint_decimals_cache;
pub mod pool;
pub mod pool_factory;       // raw record -> typed pool
pub mod pool_stats;         // per-pool quote statistics
pub mod rate_limiter;
pub mod route_simulator;    // triangular routes
pub mod rpc;                // chain boundary traits
pub mod triangle;           // orientation solver
pub mod vault_reader;
