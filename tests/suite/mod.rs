//! Integration test modules

mod end_to_end;
mod history;
mod pipeline;
