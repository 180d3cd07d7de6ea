pub mod columns;
pub mod consolidate;
pub mod dataset;
pub mod layout;
pub mod logs;
pub mod output;
pub mod reader;
pub mod report;
