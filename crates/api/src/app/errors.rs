use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use ledgerd_core::LedgerError;

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        LedgerError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        LedgerError::EmptyTransactionLines { .. } => {
            json_error(StatusCode::BAD_REQUEST, "empty_transaction_lines", message)
        }
        LedgerError::InvalidCurrency(_) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_currency", message)
        }
        LedgerError::UnbalancedTransaction => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "unbalanced_transaction", message)
        }
        LedgerError::InvalidAccount(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_account", message)
        }
        LedgerError::TransactionNotFound
        | LedgerError::AccountNotFound
        | LedgerError::TenantNotFound => json_error(StatusCode::NOT_FOUND, "not_found", message),
        LedgerError::VersionConflict => json_error(StatusCode::CONFLICT, "conflict", message),
        LedgerError::WebhookNotConfigured => {
            json_error(StatusCode::BAD_REQUEST, "webhook_not_configured", message)
        }
        LedgerError::WebhookAlreadyDelivered => {
            json_error(StatusCode::CONFLICT, "webhook_already_delivered", message)
        }
        LedgerError::WebhookRetriesExhausted => {
            json_error(StatusCode::CONFLICT, "webhook_retries_exhausted", message)
        }
        LedgerError::Storage(_) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
