use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::backtrace::Backtrace;
use std::fmt;

/// 持久化的死信记录：原始批次 + 每次失败尝试的结构化错误
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub id: String,
    /// 来源服务名
    pub service: String,
    /// 计算单元标识（如函数名）
    pub function: String,
    /// 服务版本
    pub version: String,
    /// 捕获时间（unix 秒）
    pub time: i64,
    /// 序列化后的原始批次
    pub batch: Value,
    pub errors: Vec<ErrorRecord>,
}

/// 结构化错误
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<String>,
    /// 失败处理器附带的输入（见 `HandlerInput`）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

impl ErrorRecord {
    /// 从错误构建结构化记录。
    ///
    /// panic 使用恢复时捕获的栈；其他错误在此处捕获（受 `RUST_BACKTRACE` 控制）。
    pub fn capture(err: &DomainError) -> Self {
        let (cause, stack, input) = match err {
            DomainError::Panic { cause, stack } => (Some(cause.clone()), stack.clone(), None),
            DomainError::Handler { error, .. } => {
                let chain: Vec<String> = error.chain().skip(1).map(|e| e.to_string()).collect();
                let cause = (!chain.is_empty()).then(|| chain.join(": "));
                let input = error.downcast_ref::<HandlerInput>().map(|i| i.0.clone());
                (cause, capture_stack(Backtrace::capture(), 1), input)
            }
            DomainError::Apply { reason, .. } => (
                Some(reason.clone()),
                capture_stack(Backtrace::capture(), 1),
                None,
            ),
            other => (
                std::error::Error::source(other).map(|e| e.to_string()),
                capture_stack(Backtrace::capture(), 1),
                None,
            ),
        };

        Self {
            message: err.to_string(),
            cause,
            stack,
            input,
        }
    }
}

/// 处理器失败时附带的结构化输入，作为 anyhow 上下文使用：
///
/// ```rust
/// use anyhow::Context;
/// use eventflow::deadletter::HandlerInput;
///
/// let res: anyhow::Result<()> = Err(anyhow::anyhow!("quota exceeded"))
///     .context(HandlerInput::new(serde_json::json!({"order_id": "o-1"})));
/// assert!(res.unwrap_err().downcast_ref::<HandlerInput>().is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerInput(pub Value);

impl HandlerInput {
    pub fn new(input: Value) -> Self {
        Self(input)
    }
}

impl fmt::Display for HandlerInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input={}", self.0)
    }
}

impl std::error::Error for HandlerInput {}

/// 将回溯拆分为帧，并跳过最顶部 `skip` 帧（捕获点自身）
pub(crate) fn capture_stack(backtrace: Backtrace, skip: usize) -> Vec<String> {
    let rendered = backtrace.to_string();
    let mut frames: Vec<String> = Vec::new();

    for line in rendered.lines() {
        let line = line.trim();
        if let Some((index, name)) = line.split_once(": ") {
            if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                frames.push(name.to_string());
                continue;
            }
        }
        if let (Some(location), Some(last)) = (line.strip_prefix("at "), frames.last_mut()) {
            last.push_str(" @ ");
            last.push_str(location);
        }
    }

    frames.into_iter().skip(skip).collect()
}
