//! Command implementations
//!
//! Tracked commands work on an open [`Session`](crate::session::Session) and
//! return what they did; printing happens here so the use cases stay testable.

pub mod init;
pub mod make;
pub mod migrate;
pub mod rollback;
pub mod seed;
pub mod status;

use ezmig_engine::RunReport;

pub(crate) fn print_report(verb: &str, report: &RunReport) {
    for path in &report.paths {
        println!("  {} {}", verb, path);
    }
    match &report.batch_id {
        Some(batch_id) => println!(
            "{} {} migration(s) in {}ms (batch {})",
            verb,
            report.count(),
            report.execution_time_ms,
            batch_id
        ),
        None => println!("{} {} file(s) in {}ms", verb, report.count(), report.execution_time_ms),
    }
}
