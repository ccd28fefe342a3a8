//! # CLI Module
//!
//! Command-line entry points for the `keiro` binary.
//!
//! ## Commands
//!
//! ### `simulate`
//!
//! Start a pool over a set of demo routes and push generated traffic
//! through it:
//!
//! ```bash
//! keiro simulate --strategy dynamic --workers 4 --requests 10000 --concurrency 32
//! ```
//!
//! Prints outcome counts (2xx/3xx, 4xx, 5xx, forwarder failures), bytes
//! received, elapsed time and the pool gauges as JSON.
//!
//! ### `config`
//!
//! Print the configuration after layering defaults, the optional TOML file
//! and `KEIRO_*` variables:
//!
//! ```bash
//! keiro --config keiro.toml config
//! ```

mod commands;
mod simulate;

#[cfg(test)]
mod tests;

pub use commands::{run_cli, Cli, Commands};
pub use simulate::{demo_routes, run_simulation, SimulationPlan, SimulationReport, Tally};
