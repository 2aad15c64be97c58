//! orderq-core
//!
//! Deferred order tasks for a flash-sale booking flow: close unpaid orders
//! after their hold window, notify users once their payment lands, and relay
//! order events to other services.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task envelope, order view, events, outcome, errors）
//! - **queue**: Task Queue Broker（Broker trait, retry/visibility policy, InMemoryBroker）
//! - **ports**: 外部連携の抽象化（OrderStore, Inventory, Notifier, NotificationLedger, EventPublisher, Clock, IdGenerator）
//! - **impls**: ports の in-memory 実装（開発用・テスト用）
//! - **typed**: 型付き Task API（Task trait, Handler trait, TypedRegistry, PayloadCodec）
//! - **payloads**: task kind ごとの payload 型
//! - **handlers**: 注文クローズ / 支払い通知 handler
//! - **app**: AppBuilder, Scheduler, Runtime, WorkerPool
//! - **config**: 設定の読み込み
//! - **observability**: tracing 初期化とキュー状態の集計

pub mod app;
pub mod config;
pub mod domain;
pub mod handlers;
pub mod impls;
pub mod observability;
pub mod payloads;
pub mod ports;
pub mod queue;
pub mod typed;
