pub mod answers;
pub mod changelog;
pub mod compose;
pub mod errors;
pub mod logging;
pub mod manifest;
pub mod predicate;
pub mod render;
pub mod report;
pub mod schema;
pub mod state;
pub mod ui;
