//! Two-sample Mendelian randomization from summary statistics.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub mod parallel;
pub mod qc;
pub mod ratio;
pub mod regression;
pub mod stats;
pub mod utils;

pub mod bayes;
pub mod egger;
pub mod harmonize;
pub mod ivw;
pub mod median;
pub mod mixture;
pub mod mode;
pub mod presso;
pub mod runner;
pub mod sensitivity;
pub mod tables;

pub use config::{MrConfig, Prior};
pub use error::{MrError, Result};
pub use harmonize::{HarmonizationReport, harmonize};
pub use runner::{MethodOutcome, MrReport, analyze, run_method, run_methods};
pub use types::{EstimateResult, HarmonizedTable, HarmonizedVariant, Method, SummaryRecord};
