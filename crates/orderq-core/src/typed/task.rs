//! Task trait - 型付き Task の定義
//!
//! Associated const `TYPE` が broker 上の kind tag になります。

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Task は task_type と payload 型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct RefundOrderPayload {
///     sn: OrderSn,
/// }
///
/// impl Task for RefundOrderPayload {
///     const TYPE: &'static str = "order.refund_order.v1";
/// }
/// ```
///
/// # Trait Bounds
/// - `Serialize`: enqueue 時に payload へエンコードするため
/// - `DeserializeOwned`: dequeue 時に payload から復元するため
/// - `Send + Sync + 'static`: worker task 間で受け渡すため
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// task_type の定義
    ///
    /// # 命名規約
    /// - `{domain}.{action}.v{major}`
    /// - 例: `order.defer_close_homestay_order.v1`
    const TYPE: &'static str;
}
