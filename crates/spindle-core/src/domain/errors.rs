//! Errors - 失敗の分類
//!
//! # 分類
//! - `Fault::Failure`: ワークからの通常のアプリケーションエラー（ハンドラへ渡す）
//! - `Fault::Panic`: 回復不能な実行時フォールト（捕捉せず owner スレッドで再送出）
//!
//! Fault はスナップショット転送のため serialize 可能です。deserialize した
//! Failure は元の型情報を持たないので、メッセージをそのまま持つ
//! `ReplayedFailure` として復元されます。

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// ワークが返す失敗のボックス型
pub type BoxError = Box<dyn Error + Send + Sync>;

/// ハンドラへ渡す失敗原因（スナップショット間で共有するため Arc）
pub type FailureCause = Arc<dyn Error + Send + Sync>;

/// Fault はユニットオブワークの失敗を分類
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "FaultRepr", into = "FaultRepr")]
pub enum Fault {
    /// Ordinary application failure, routed through the failure handler.
    Failure(FailureCause),

    /// Unrecoverable runtime fault (the work panicked). Never handled;
    /// re-raised on the owner thread during dispatch.
    Panic(String),
}

impl Fault {
    pub fn failure(cause: impl Into<BoxError>) -> Self {
        Fault::Failure(Arc::from(cause.into()))
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Fault::Panic(_))
    }

    /// 失敗メッセージ（原因の Display）
    pub fn message(&self) -> String {
        match self {
            Fault::Failure(cause) => cause.to_string(),
            Fault::Panic(message) => message.clone(),
        }
    }

    /// Failure の場合のみ原因を返す
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            Fault::Failure(cause) => Some(cause),
            Fault::Panic(_) => None,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Failure(cause) => write!(f, "{cause}"),
            Fault::Panic(message) => write!(f, "panic: {message}"),
        }
    }
}

/// Fault の転送表現（kind + message のみ）
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FaultRepr {
    kind: FaultKind,
    message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FaultKind {
    Failure,
    Panic,
}

impl From<Fault> for FaultRepr {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Failure(cause) => FaultRepr {
                kind: FaultKind::Failure,
                message: cause.to_string(),
            },
            Fault::Panic(message) => FaultRepr {
                kind: FaultKind::Panic,
                message,
            },
        }
    }
}

impl From<FaultRepr> for Fault {
    fn from(repr: FaultRepr) -> Self {
        match repr.kind {
            FaultKind::Failure => Fault::Failure(Arc::new(ReplayedFailure(repr.message))),
            FaultKind::Panic => Fault::Panic(repr.message),
        }
    }
}

/// 転送境界を越えて復元された失敗。元のメッセージだけを保持します。
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ReplayedFailure(pub String);

/// 終端状態に達する前にタスクを見失ったことを表す合成失敗
/// （プロセスキルなどで発生します）
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("worker was lost before reaching a terminal state")]
pub struct WorkerLost;
