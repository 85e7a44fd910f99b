//! Runtime configuration.

use obi_types::BeltLadder;
use obi_workflow::GradePolicy;
use serde::{Deserialize, Serialize};

/// Configuration for [`DojoRuntime`](crate::DojoRuntime).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Policy for explicit belt selection at enrollment time.
    pub grade_policy: GradePolicy,
    /// How many times to retry certificate issuance after a render or
    /// upload failure before surfacing the unfinished certificate.
    pub issuance_retries: u32,
    /// Backoff between issuance retries, in milliseconds.
    pub issuance_backoff_ms: u64,
    /// The belt ladder. Fixed at startup; defines legal progression.
    pub ladder: BeltLadder,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            grade_policy: GradePolicy::default(),
            issuance_retries: 2,
            issuance_backoff_ms: 200,
            ladder: BeltLadder::standard(),
        }
    }
}
