//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の in-memory 実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryOrderStore**: version guard 付きの注文ストア
//! - **InMemoryNotificationLedger**: 通知済み記録（冪等性ゲート）
//! - **InMemoryEventRelay**: パーティション + consumer group offset の pub/sub
//! - **LoggingInventory / LoggingNotifier**: tracing に出すだけの外部連携
//!
//! どれも `FaultInjector` で「次の N 回は失敗」を仕込めます（リトライ検証用）。

pub mod fault;
pub mod inmem_ledger;
pub mod inmem_order_store;
pub mod inmem_relay;
pub mod logging;

pub use self::fault::FaultInjector;
pub use self::inmem_ledger::InMemoryNotificationLedger;
pub use self::inmem_order_store::{InMemoryOrderStore, StatusTransition};
pub use self::inmem_relay::{Delivery, IdempotencyFilter, InMemoryEventRelay};
pub use self::logging::{LoggingInventory, LoggingNotifier, SentNotification};
