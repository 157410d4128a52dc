//! eventflow 的过程宏：
//! - `#[aggregate_root(event = E)]`：内嵌 `AggregateBase<E>` 并实现 `AggregateRoot`；
//! - `#[domain_event]`：合并默认派生并实现 `DomainEvent::event_type`。
//!
use proc_macro::TokenStream;

mod aggregate_root;
mod derive_utils;
mod domain_event;
mod field_utils;

/// 聚合根宏
///
/// ```ignore
/// #[aggregate_root(event = AccountEvent)]
/// struct Account {
///     balance: i64,
/// }
/// ```
#[proc_macro_attribute]
pub fn aggregate_root(attr: TokenStream, item: TokenStream) -> TokenStream {
    aggregate_root::expand(attr, item)
}

/// 领域事件宏
///
/// ```ignore
/// #[domain_event]
/// enum AccountEvent {
///     Deposited { amount: i64 },
///     #[event(event_type = "account.closed")]
///     Closed,
/// }
/// ```
#[proc_macro_attribute]
pub fn domain_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    domain_event::expand(attr, item)
}
