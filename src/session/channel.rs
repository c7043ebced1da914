//! 单槽结果通道
//! One-shot, consume-once handoff of the session result
//!
//! 负载通道容量为1; 取消通道永不发送, 失效时丢弃其发送端,
//! 所有阻塞在 `consume` 上的消费者立即以 `Cancelled` 返回。

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};

use crate::error::{ScanError, ScanResult};

/// 消费结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery<T> {
    Payload(T),
    /// 会话在产生结果前被停止 (正常终态, 不是错误)
    Cancelled,
}

impl<T> Delivery<T> {
    pub fn payload(self) -> Option<T> {
        match self {
            Delivery::Payload(p) => Some(p),
            Delivery::Cancelled => None,
        }
    }
}

struct Slot<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    cancel_tx: Option<Sender<()>>,
    cancel_rx: Receiver<()>,
    published: bool,
}

impl<T> Slot<T> {
    fn armed() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(0);
        Self {
            tx,
            rx,
            cancel_tx: Some(cancel_tx),
            cancel_rx,
            published: false,
        }
    }
}

/// 会话结果通道
pub struct ResultChannel<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> Default for ResultChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResultChannel<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::armed()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 发布结果; 未 reset 前再次发布返回 `AlreadyPublished`
    pub fn publish(&self, payload: T) -> ScanResult<()> {
        let mut slot = self.lock();
        if slot.cancel_tx.is_none() {
            return Err(ScanError::ChannelClosed);
        }
        if slot.published {
            return Err(ScanError::AlreadyPublished);
        }
        slot.tx
            .try_send(payload)
            .map_err(|_| ScanError::AlreadyPublished)?;
        slot.published = true;
        Ok(())
    }

    fn receivers(&self) -> (Receiver<T>, Receiver<()>) {
        let slot = self.lock();
        (slot.rx.clone(), slot.cancel_rx.clone())
    }

    /// 阻塞等待结果, 直到发布或通道失效
    pub fn consume(&self) -> Delivery<T> {
        let (rx, cancel_rx) = self.receivers();
        select! {
            recv(rx) -> msg => msg.map(Delivery::Payload).unwrap_or(Delivery::Cancelled),
            recv(cancel_rx) -> _ => Delivery::Cancelled,
        }
    }

    /// 带超时的等待; 超时返回 `None`
    pub fn consume_timeout(&self, timeout: Duration) -> Option<Delivery<T>> {
        let (rx, cancel_rx) = self.receivers();
        select! {
            recv(rx) -> msg => Some(msg.map(Delivery::Payload).unwrap_or(Delivery::Cancelled)),
            recv(cancel_rx) -> _ => Some(Delivery::Cancelled),
            default(timeout) => None,
        }
    }

    /// 非阻塞读取
    pub fn try_consume(&self) -> Option<Delivery<T>> {
        let slot = self.lock();
        if let Ok(payload) = slot.rx.try_recv() {
            return Some(Delivery::Payload(payload));
        }
        if slot.cancel_tx.is_none() {
            return Some(Delivery::Cancelled);
        }
        None
    }

    pub fn is_published(&self) -> bool {
        self.lock().published
    }

    pub fn is_invalidated(&self) -> bool {
        self.lock().cancel_tx.is_none()
    }

    /// 使通道失效: 丢弃未取走的结果并唤醒所有等待者
    pub fn invalidate(&self) {
        let mut slot = self.lock();
        while slot.rx.try_recv().is_ok() {}
        slot.cancel_tx = None;
    }

    /// 为新会话重新启用 (先唤醒旧的等待者)
    pub fn reset(&self) {
        // 旧槽被丢弃时其取消发送端随之关闭
        *self.lock() = Slot::armed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_publish_then_consume() {
        let channel = ResultChannel::new();
        channel.publish("XYZ".to_string()).unwrap();
        assert_eq!(channel.consume(), Delivery::Payload("XYZ".to_string()));
        assert_eq!(channel.try_consume(), None);
    }

    #[test]
    fn test_second_publish_rejected() {
        let channel = ResultChannel::new();
        channel.publish(1).unwrap();
        assert_eq!(channel.publish(2), Err(ScanError::AlreadyPublished));

        // 取走之后仍然拒绝, 直到 reset
        assert_eq!(channel.consume(), Delivery::Payload(1));
        assert_eq!(channel.publish(3), Err(ScanError::AlreadyPublished));

        channel.reset();
        channel.publish(4).unwrap();
        assert_eq!(channel.consume(), Delivery::Payload(4));
    }

    #[test]
    fn test_consume_blocks_until_publish() {
        let channel = Arc::new(ResultChannel::new());
        let consumer = {
            let channel = channel.clone();
            thread::spawn(move || channel.consume())
        };
        thread::sleep(Duration::from_millis(20));
        channel.publish("late").unwrap();
        assert_eq!(consumer.join().unwrap(), Delivery::Payload("late"));
    }

    #[test]
    fn test_invalidate_unblocks_waiters() {
        let channel: Arc<ResultChannel<String>> = Arc::new(ResultChannel::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let channel = channel.clone();
                thread::spawn(move || channel.consume())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        channel.invalidate();
        for w in waiters {
            assert_eq!(w.join().unwrap(), Delivery::Cancelled);
        }
        assert_eq!(channel.publish("x".into()), Err(ScanError::ChannelClosed));
        assert_eq!(channel.try_consume(), Some(Delivery::Cancelled));
    }

    #[test]
    fn test_exactly_one_consumer_gets_payload() {
        let channel: Arc<ResultChannel<u32>> = Arc::new(ResultChannel::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let channel = channel.clone();
                thread::spawn(move || channel.consume())
            })
            .collect();
        channel.publish(42).unwrap();
        thread::sleep(Duration::from_millis(20));
        channel.invalidate();

        let deliveries: Vec<_> = waiters.into_iter().map(|w| w.join().unwrap()).collect();
        let payloads = deliveries
            .iter()
            .filter(|d| matches!(d, Delivery::Payload(42)))
            .count();
        assert_eq!(payloads, 1);
    }

    #[test]
    fn test_consume_timeout() {
        let channel: ResultChannel<u8> = ResultChannel::new();
        assert_eq!(channel.consume_timeout(Duration::from_millis(10)), None);
        channel.publish(7).unwrap();
        assert_eq!(
            channel.consume_timeout(Duration::from_millis(10)),
            Some(Delivery::Payload(7))
        );
    }
}
