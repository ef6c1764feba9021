use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{NoteColor, NoteMessage, Signature, Timestamp, WalletAddress};

/// 待持久化的便签，时间戳尚未分配。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    pub message: NoteMessage,
    pub signature: Signature,
    pub wallet_address: WalletAddress,
    pub color: NoteColor,
}

impl NewNote {
    /// 从原始字段构建便签，任一字段非法即返回第一个校验错误。
    pub fn parse(
        message: impl Into<String>,
        signature: impl Into<String>,
        wallet_address: impl Into<String>,
        color: Option<&str>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            message: NoteMessage::parse(message)?,
            signature: Signature::parse(signature)?,
            wallet_address: WalletAddress::parse(wallet_address)?,
            color: NoteColor::parse_optional(color)?,
        })
    }

    /// 由存储在插入时盖上时间戳。
    pub fn stamp(self, timestamp: Timestamp) -> Note {
        Note {
            message: self.message,
            signature: self.signature,
            wallet_address: self.wallet_address,
            color: self.color,
            timestamp,
        }
    }
}

/// 已持久化的便签，创建后不可变。
///
/// JSON 表示同时用于 REST 响应与实时推送。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub message: NoteMessage,
    pub signature: Signature,
    pub wallet_address: WalletAddress,
    pub color: NoteColor,
    pub timestamp: Timestamp,
}
