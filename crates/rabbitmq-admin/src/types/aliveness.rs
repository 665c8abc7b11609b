use serde::{Deserialize, Serialize};

/// Result of the aliveness check: declares a queue, publishes to it, and
/// consumes the message again.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Aliveness {
    pub status: String,
}

impl Aliveness {
    /// Whether the broker answered the check successfully.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
