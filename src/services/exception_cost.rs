//! Cost apportionment for exception orders.

use serde::Serialize;
use utoipa::ToSchema;

use crate::models::ExceptionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CostSplit {
    /// Paid by the crew member.
    pub user_pay_amount: i64,
    /// Billed to the organization.
    pub exception_amount: i64,
}

/// Splits `total_amount` between the crew member and the organization.
///
/// For every non-negative total the two parts sum to the total and neither is negative.
/// A negative budget is treated as zero.
pub fn apportion(total_amount: i64, exception_type: ExceptionType, regular_budget: i64) -> CostSplit {
    let budget = regular_budget.max(0);
    match exception_type {
        ExceptionType::Full => CostSplit {
            user_pay_amount: 0,
            exception_amount: total_amount,
        },
        ExceptionType::Limited => CostSplit {
            user_pay_amount: total_amount.saturating_sub(budget).max(0),
            exception_amount: total_amount.min(budget),
        },
        ExceptionType::SelfPaid => CostSplit {
            user_pay_amount: total_amount,
            exception_amount: 0,
        },
    }
}
