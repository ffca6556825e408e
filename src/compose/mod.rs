//! The template composer.
//!
//! Maps `(manifest, flags, variables, existing project or none)` to the set of
//! files a project should contain and the findings an update produced.
//!
//! | Module     | Operation                                             |
//! |------------|-------------------------------------------------------|
//! | `bindings` | Layered flag/variable resolution and prompting        |
//! | `plan`     | Validation and the in-memory render of every file     |
//! | `generate` | First materialization into a target directory         |
//! | `update`   | Three-way update of an existing project               |
//! | `status`   | Read-only drift check                                 |
//! | `resolve`  | Accepting a hand-resolved conflict                    |
//! | `writer`   | The only code that writes project files               |

use std::collections::BTreeMap;

pub mod bindings;
pub mod generate;
pub mod plan;
pub mod resolve;
pub mod status;
pub mod update;
pub mod writer;

/// Flag name to value.
pub type Flags = BTreeMap<String, bool>;

/// Variable name to value.
pub type Variables = BTreeMap<String, String>;

pub use bindings::{Bindings, Overrides, Prompter, TerminalPrompter, parse_flag_value, resolve_bindings};
pub use generate::{GenerateOutcome, generate};
pub use plan::{Plan, PlanFailure, PlannedFile, build_plan, validate_configuration};
pub use resolve::resolve;
pub use status::{FileState, FileStatus, StatusReport, status};
pub use update::{
    ConflictReason, FlagChange, MergePreview, OrphanReason, UpdateFinding, UpdateOptions,
    UpdateResult, update,
};
pub use writer::ProjectWriter;
