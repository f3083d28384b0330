#![allow(clippy::unwrap_used)]

//! Property-based tests for rotation policy validation.

use keyward_kms::store::{EXPIRATION_DAYS, ROTATION_SCHEDULE_DAYS};
use keyward_kms::{RotationPolicy, StoreError};
use proptest::prelude::*;

fn code_of(policy: &RotationPolicy) -> Option<u16> {
    policy.validate().err().map(|e| e.code())
}

proptest! {
    #[test]
    fn in_range_auto_policy_is_accepted(
        expiration in EXPIRATION_DAYS,
        schedule in ROTATION_SCHEDULE_DAYS,
    ) {
        prop_assert!(RotationPolicy::auto(expiration, schedule).validate().is_ok());
    }

    #[test]
    fn bad_expiration_reports_2002(
        expiration in prop_oneof![Just(0u32), 3651u32..],
        schedule in any::<u32>(),
    ) {
        prop_assert_eq!(code_of(&RotationPolicy::auto(expiration, schedule)), Some(2002));
    }

    #[test]
    fn bad_schedule_reports_2003(
        expiration in EXPIRATION_DAYS,
        schedule in prop_oneof![Just(0u32), 366u32..],
    ) {
        prop_assert_eq!(code_of(&RotationPolicy::auto(expiration, schedule)), Some(2003));
    }
}

#[test]
fn manual_policy_needs_no_day_counts() {
    assert!(RotationPolicy::manual().validate().is_ok());
}

#[test]
fn auto_policy_without_day_counts_is_refused() {
    let missing_expiration = RotationPolicy {
        is_auto_rotation: true,
        expiration_days: None,
        rotation_schedule_days: Some(30),
    };
    assert!(matches!(
        missing_expiration.validate(),
        Err(StoreError::ValidationFailed { code: 2002, .. })
    ));

    let missing_schedule = RotationPolicy {
        is_auto_rotation: true,
        expiration_days: Some(365),
        rotation_schedule_days: None,
    };
    assert_eq!(code_of(&missing_schedule), Some(2003));
}
