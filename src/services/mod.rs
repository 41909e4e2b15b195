//! Domain services used by the CLI and the gateway.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the console's workflows (uploads, scans, reports)
//! and its client-side state (templates, mappings) so that CLI commands and
//! route handlers stay focused on argument parsing and output.

pub mod mappings;
pub mod report;
pub mod scan;
pub mod suggest;
pub mod templates;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;
