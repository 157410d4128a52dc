//! panic 恢复
//!
//! 处理单元在边界处 `catch_unwind`，将 panic 转换为 `DomainError::Panic`。
//! 安装 `install_panic_hook` 后可拿到 panic 发生点的调用栈；
//! 未安装时退化为恢复点的调用栈。
//!
use crate::deadletter::capture_stack;
use crate::error::DomainError;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::OnceLock;

static PANIC_HOOK: OnceLock<()> = OnceLock::new();

thread_local! {
    static LAST_PANIC_STACK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// 安装记录 panic 栈的钩子（进程内只安装一次，保留原有钩子行为）
pub fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let stack = capture_stack(Backtrace::capture(), 0);
            LAST_PANIC_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
            default_hook(info);
        }));
    });
}

/// 将 `catch_unwind` 得到的负载转换为领域错误
pub(crate) fn panic_error(payload: Box<dyn Any + Send>) -> DomainError {
    let cause = panic_message(payload.as_ref());
    let stack = LAST_PANIC_STACK
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| capture_stack(Backtrace::capture(), 1));

    DomainError::Panic { cause, stack }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_from_str_and_string_payloads() {
        let err = panic_error(Box::new("boom"));
        assert!(matches!(err, DomainError::Panic { ref cause, .. } if cause == "boom"));

        let err = panic_error(Box::new(format!("message id {}", 4)));
        assert_eq!(err.to_string(), "panic recovered: message id 4");

        let err = panic_error(Box::new(42_u8));
        assert_eq!(err.to_string(), "panic recovered: unknown panic payload");
    }

    #[test]
    fn hook_records_stack_for_current_thread() {
        install_panic_hook();
        let payload = std::panic::catch_unwind(|| panic!("hooked")).unwrap_err();
        let err = panic_error(payload);
        match err {
            DomainError::Panic { cause, .. } => assert_eq!(cause, "hooked"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(LAST_PANIC_STACK.with(|slot| slot.borrow().is_none()));
    }
}
