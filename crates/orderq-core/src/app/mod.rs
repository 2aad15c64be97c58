//! App - アプリケーション層
//!
//! ports / queue / handlers を組み合わせて、producer 側と consumer 側を作ります。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: handler 登録と起動時検証
//! - **Scheduler**: 業務イベント → deferred task の enqueue
//! - **Runtime**: kind tag による handler dispatch
//! - **WorkerPool**: fetch → dispatch → ack/fail ループ

pub mod builder;
pub mod runtime;
pub mod scheduler;
pub mod worker_loop;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::runtime::Runtime;
pub use self::scheduler::{ScheduleError, Scheduler};
pub use self::worker_loop::{TickOutcome, Worker, WorkerPool};
