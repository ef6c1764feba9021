use domain::{DomainError, NewNote};
use serde::Deserialize;

/// 客户端提交的便签请求，字段均可缺失，由 [`SubmitNoteRequest::into_new_note`] 统一校验。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitNoteRequest {
    pub message: Option<String>,
    pub signature: Option<String>,
    pub wallet_address: Option<String>,
    pub color: Option<String>,
}

impl SubmitNoteRequest {
    pub fn into_new_note(self) -> Result<NewNote, DomainError> {
        let message = required("message", self.message)?;
        let signature = required("signature", self.signature)?;
        let wallet_address = required("walletAddress", self.wallet_address)?;
        NewNote::parse(message, signature, wallet_address, self.color.as_deref())
    }
}

fn required(field: &str, value: Option<String>) -> Result<String, DomainError> {
    value.ok_or_else(|| DomainError::invalid_argument(field, "is required"))
}
