//! Prelude module for common imports.
//!
//! ```ignore
//! use tola_sections::prelude::*;
//! ```

// Element traits
pub use crate::element::{ContentEq, Identifiable, Section, Sectionable};

// Reconciliation
pub use crate::config::{ReconcileConfig, Strategy};
pub use crate::reconcile::{reconcile, reconcile_with_config, Reconciliation};

// Plan
pub use crate::plan::{IndexPath, PatchOp, PatchPlan};

// Lifecycle
pub use crate::state::{ListState, SharedListState, Transaction};
pub use crate::target::{MirrorTarget, PatchTarget};

// Error
pub use crate::error::{ReconcileError, ReconcileResult};
