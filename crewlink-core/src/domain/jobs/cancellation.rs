use std::fmt::{self, Display};
use std::str::FromStr;

use crewlink_model::ActorRole;
use serde::{Deserialize, Serialize};

/// Who may cancel a job once work is IN_PROGRESS. Earlier states are always
/// cancellable by either party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    #[default]
    Deny,
    Customer,
    Either,
}

impl CancellationPolicy {
    pub fn permits_in_progress(&self, role: ActorRole) -> bool {
        match self {
            CancellationPolicy::Deny => false,
            CancellationPolicy::Customer => role == ActorRole::Customer,
            CancellationPolicy::Either => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationPolicy::Deny => "deny",
            CancellationPolicy::Customer => "customer",
            CancellationPolicy::Either => "either",
        }
    }
}

impl Display for CancellationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CancellationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deny" => Ok(CancellationPolicy::Deny),
            "customer" => Ok(CancellationPolicy::Customer),
            "either" => Ok(CancellationPolicy::Either),
            other => Err(format!(
                "unknown cancellation policy '{other}' (expected deny, customer or either)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_denies_everyone() {
        let policy = CancellationPolicy::default();
        assert!(!policy.permits_in_progress(ActorRole::Customer));
        assert!(!policy.permits_in_progress(ActorRole::Contractor));
    }

    #[test]
    fn customer_policy_excludes_contractor() {
        let policy: CancellationPolicy = "Customer".parse().unwrap();
        assert!(policy.permits_in_progress(ActorRole::Customer));
        assert!(!policy.permits_in_progress(ActorRole::Contractor));
    }
}
