use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::frame::LandmarkFrame;

/// 推論スレッドからの最新ランドマークフレームを保持する共有キャッシュ
///
/// 書き手（推論側）は publish で丸ごと差し替え、読み手（リターゲット側）は
/// snapshot でコピーを取ってすぐロックを解放する。ブロッキング待ちはしない。
/// フレームIDは新フレームが発行されるたびにインクリメントされるので、
/// 読み手はIDの比較だけで「新しいフレームが来たか」を判定できる。
pub struct PoseSource {
    latest: Arc<Mutex<Option<LandmarkFrame>>>,
    frame_id: Arc<AtomicU64>,
}

impl PoseSource {
    pub fn new() -> Self {
        Self {
            latest: Arc::new(Mutex::new(None)),
            frame_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 推論側ハンドルを作る
    pub fn publisher(&self) -> PosePublisher {
        PosePublisher {
            latest: self.latest.clone(),
            frame_id: self.frame_id.clone(),
        }
    }

    /// 現在のフレームID。初回発行前は0。
    pub fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }

    /// 最新フレームのコピーを取得。発行前はNone。
    pub fn snapshot(&self) -> Option<LandmarkFrame> {
        let guard = self.latest.lock().unwrap();
        guard.clone()
    }
}

impl Default for PoseSource {
    fn default() -> Self {
        Self::new()
    }
}

/// PoseSourceへの書き込みハンドル（推論スレッド所有）
#[derive(Clone)]
pub struct PosePublisher {
    latest: Arc<Mutex<Option<LandmarkFrame>>>,
    frame_id: Arc<AtomicU64>,
}

impl PosePublisher {
    pub fn publish(&self, frame: LandmarkFrame) {
        *self.latest.lock().unwrap() = Some(frame);
        self.frame_id.fetch_add(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::{Landmark, LandmarkIndex};

    fn any_frame() -> LandmarkFrame {
        let arr = [Landmark::new(0.5, 0.5, 0.0); LandmarkIndex::COUNT];
        LandmarkFrame::new(arr)
    }

    #[test]
    fn test_empty_before_publish() {
        let source = PoseSource::new();
        assert_eq!(source.frame_id(), 0);
        assert!(source.snapshot().is_none());
    }

    #[test]
    fn test_publish_increments_frame_id() {
        let source = PoseSource::new();
        let publisher = source.publisher();
        publisher.publish(any_frame());
        assert_eq!(source.frame_id(), 1);
        publisher.publish(any_frame());
        assert_eq!(source.frame_id(), 2);
        assert!(source.snapshot().is_some());
    }

    #[test]
    fn test_publish_from_thread() {
        let source = PoseSource::new();
        let publisher = source.publisher();
        let handle = std::thread::spawn(move || {
            publisher.publish(any_frame());
        });
        handle.join().unwrap();
        assert_eq!(source.frame_id(), 1);
        assert!(source.snapshot().is_some());
    }
}
