use serde::{Deserialize, Serialize};

use crate::ir::{Capability, CapabilityRecord};

/// A capability the package requires but the policy does not grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Violation {
    pub capability: Capability,
    pub required: bool,
    pub given: bool,
}

/// Compare required against granted, in canonical capability order.
///
/// Empty iff `required` is a subset of `given`. Over-granting is never
/// reported.
pub fn check(required: &CapabilityRecord, given: &CapabilityRecord) -> Vec<Violation> {
    Capability::ALL
        .into_iter()
        .filter(|&cap| required.get(cap) && !given.get(cap))
        .map(|capability| Violation {
            capability,
            required: true,
            given: false,
        })
        .collect()
}

/// Outcome of an audit.
///
/// `ReportOnly` is distinct from `Pass`: without a policy there is nothing
/// to pass or fail, only a required-capability report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail { violations: Vec<Violation> },
    ReportOnly,
}

impl Verdict {
    /// Verdict for a required record against an optional grant.
    pub fn evaluate(required: &CapabilityRecord, given: Option<&CapabilityRecord>) -> Self {
        match given {
            None => Self::ReportOnly,
            Some(given) => {
                let violations = check(required, given);
                if violations.is_empty() {
                    Self::Pass
                } else {
                    Self::Fail { violations }
                }
            }
        }
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Fail { violations } => violations,
            _ => &[],
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }

    /// Process exit status: 0 = pass or report only, 1 = violations.
    pub fn exit_code(&self) -> i32 {
        if self.is_fail() {
            1
        } else {
            0
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail { .. } => write!(f, "FAIL"),
            Self::ReportOnly => write!(f, "REPORT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(caps: &[Capability]) -> CapabilityRecord {
        caps.iter().copied().collect()
    }

    #[test]
    fn matching_grant_passes() {
        let required = record(&[Capability::Network]);
        let given = record(&[Capability::Network]);
        assert!(check(&required, &given).is_empty());
        assert_eq!(Verdict::evaluate(&required, Some(&given)), Verdict::Pass);
    }

    #[test]
    fn missing_grant_is_single_violation() {
        let required = record(&[Capability::Network, Capability::Subprocess]);
        let given = record(&[Capability::Network]);
        let verdict = Verdict::evaluate(&required, Some(&given));
        assert_eq!(
            verdict.violations(),
            &[Violation {
                capability: Capability::Subprocess,
                required: true,
                given: false,
            }]
        );
        assert_eq!(verdict.exit_code(), 1);
    }

    #[test]
    fn violations_follow_enum_order() {
        let required = CapabilityRecord::all();
        let violations = check(&required, &CapabilityRecord::empty());
        let order: Vec<Capability> = violations.iter().map(|v| v.capability).collect();
        assert_eq!(order, Capability::ALL.to_vec());
    }

    #[test]
    fn over_granting_is_fine() {
        let required = CapabilityRecord::empty();
        assert!(check(&required, &CapabilityRecord::all()).is_empty());
    }

    #[test]
    fn no_policy_is_report_only() {
        let verdict = Verdict::evaluate(&CapabilityRecord::all(), None);
        assert_eq!(verdict, Verdict::ReportOnly);
        assert!(!verdict.is_pass());
        assert!(!verdict.is_fail());
        assert_eq!(verdict.exit_code(), 0);
    }

    mod proptests {
        use proptest::prelude::*;

        use crate::ir::{Capability, CapabilityRecord};
        use crate::policy::violation::check;

        fn arb_record() -> impl Strategy<Value = CapabilityRecord> {
            proptest::collection::vec(0usize..Capability::COUNT, 0..=Capability::COUNT)
                .prop_map(|idx| idx.into_iter().map(|i| Capability::ALL[i]).collect())
        }

        proptest! {
            #[test]
            fn empty_iff_subset(required in arb_record(), given in arb_record()) {
                let violations = check(&required, &given);
                prop_assert_eq!(violations.is_empty(), required.is_subset_of(&given));
            }

            #[test]
            fn every_violation_is_required_not_given(required in arb_record(), given in arb_record()) {
                for v in check(&required, &given) {
                    prop_assert!(required.get(v.capability));
                    prop_assert!(!given.get(v.capability));
                }
            }
        }
    }
}
