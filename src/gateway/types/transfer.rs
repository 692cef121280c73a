//! Transfer request/response DTOs

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::money::AmountInput;
use crate::transfer::{FailPoint, TransferError, TransferRequest};

/// POST /api/v1/transactions/transfer
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TransferBody {
    #[schema(example = "alice")]
    pub sender_id: String,
    #[schema(example = "bob")]
    pub receiver_id: String,
    /// Defaults to `sender_id`
    #[serde(default)]
    pub sender_account_id: Option<String>,
    /// Defaults to `receiver_id`
    #[serde(default)]
    pub receiver_account_id: Option<String>,
    /// Decimal string or JSON number
    #[serde(default)]
    #[schema(value_type = String, example = "40.00")]
    pub amount: Option<AmountInput>,
    /// Checkpoint name; unknown names are ignored
    #[serde(default)]
    #[schema(example = "AFTER_CORE_COMMIT")]
    pub fail_point: Option<String>,
}

impl TransferBody {
    /// Build the coordinator request.
    ///
    /// `default_fail_point` applies only when the body names no known checkpoint.
    pub fn into_request(
        self,
        default_fail_point: Option<FailPoint>,
    ) -> Result<TransferRequest, TransferError> {
        let amount = self
            .amount
            .as_ref()
            .and_then(AmountInput::to_decimal)
            .ok_or_else(|| {
                TransferError::validation("Transfer amount must be a positive number.")
            })?;

        let fail_point = self
            .fail_point
            .as_deref()
            .and_then(|name| name.parse::<FailPoint>().ok())
            .or(default_fail_point);

        let from_account_id =
            non_blank(self.sender_account_id).unwrap_or_else(|| self.sender_id.clone());
        let to_account_id =
            non_blank(self.receiver_account_id).unwrap_or_else(|| self.receiver_id.clone());

        Ok(TransferRequest {
            from_user_id: self.sender_id,
            to_user_id: self.receiver_id,
            from_account_id,
            to_account_id,
            amount,
            fail_point,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// POST /api/v1/transactions/failpoint
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FailpointBody {
    pub enabled: bool,
    /// Defaults to true
    #[serde(default)]
    pub one_shot: Option<bool>,
    /// Defaults to BEFORE_COMMIT
    #[serde(default)]
    pub fail_point: Option<String>,
}

/// Process-wide checkpoint configuration
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FailpointStatus {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_point: Option<FailPoint>,
    pub one_shot: bool,
    pub available: Vec<FailPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn body(json: serde_json::Value) -> TransferBody {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_account_ids_default_to_user_ids() {
        let req = body(serde_json::json!({
            "sender_id": "alice",
            "receiver_id": "bob",
            "amount": "40.00"
        }))
        .into_request(None)
        .unwrap();

        assert_eq!(req.from_account_id, "alice");
        assert_eq!(req.to_account_id, "bob");
        assert_eq!(req.amount, dec!(40.00));
        assert_eq!(req.fail_point, None);
    }

    #[test]
    fn test_explicit_checkpoint_beats_default() {
        let req = body(serde_json::json!({
            "sender_id": "alice",
            "receiver_id": "bob",
            "sender_account_id": "acc-a",
            "receiver_account_id": "acc-b",
            "amount": 5,
            "fail_point": "AFTER_CORE_COMMIT"
        }))
        .into_request(Some(FailPoint::BeforeCommit))
        .unwrap();

        assert_eq!(req.from_account_id, "acc-a");
        assert_eq!(req.fail_point, Some(FailPoint::AfterCoreCommit));
    }

    #[test]
    fn test_unknown_checkpoint_ignored() {
        let req = body(serde_json::json!({
            "sender_id": "alice",
            "receiver_id": "bob",
            "amount": "1",
            "fail_point": "SOMEWHERE_ELSE"
        }));
        assert_eq!(req.clone().into_request(None).unwrap().fail_point, None);
        assert_eq!(
            req.into_request(Some(FailPoint::BeforeCommit))
                .unwrap()
                .fail_point,
            Some(FailPoint::BeforeCommit)
        );
    }

    #[test]
    fn test_missing_or_bad_amount_is_validation_error() {
        let missing = body(serde_json::json!({"sender_id": "a", "receiver_id": "b"}));
        assert!(matches!(
            missing.into_request(None),
            Err(TransferError::Validation(_))
        ));

        let bad = body(serde_json::json!({"sender_id": "a", "receiver_id": "b", "amount": "ten"}));
        assert!(matches!(bad.into_request(None), Err(TransferError::Validation(_))));
    }
}
