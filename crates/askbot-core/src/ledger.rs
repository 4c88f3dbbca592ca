//! Quota ledger: decides whether a request is admitted under the daily cap.
//!
//! The ledger operates on a scratch copy of the record owned by the activity
//! service, which holds the per-user lock and commits only admitted outcomes.
//! That makes the lazy day reset and the check/increment one atomic unit, and
//! makes a denial observably mutate nothing.

use std::time::Duration;

use crate::{clock::ClockPolicy, domain::UserRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaDecision {
    Admitted { remaining: u32 },
    Denied { retry_after: Duration },
}

/// Reset the daily count if the day rolled over, then admit or deny.
///
/// A `daily_limit` of zero denies unconditionally.
pub fn try_consume(
    record: &mut UserRecord,
    daily_limit: u32,
    policy: &ClockPolicy,
) -> QuotaDecision {
    let today = policy.today();
    if record.count_date != today {
        record.count_date = today;
        record.request_count = 0;
    }

    if daily_limit == 0 || record.request_count >= daily_limit {
        return QuotaDecision::Denied {
            retry_after: policy.until_day_end(),
        };
    }

    record.request_count += 1;
    record.total_requests_lifetime += 1;
    QuotaDecision::Admitted {
        remaining: daily_limit - record.request_count,
    }
}
