//! Ports - 抽象化レイヤー
//!
//! 外部の協調者（注文ストア、在庫、通知、pub/sub、時刻、ID 生成）への
//! インターフェースです。すべてコンストラクタで注入し、グローバルな
//! クライアントは持ちません。

pub mod clock;
pub mod event_publisher;
pub mod id_generator;
pub mod inventory;
pub mod notification_ledger;
pub mod notifier;
pub mod order_store;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::event_publisher::{EventPublisher, RelayError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::inventory::{Inventory, InventoryError};
pub use self::notification_ledger::{NotificationLedger, NotificationRecord};
pub use self::notifier::{Notifier, NotifyError};
pub use self::order_store::{OrderStore, StoreError};
