//! 링 버퍼 기반 프레임 큐 (라이브 프리뷰용)
//! 프리뷰 스레드가 push, C#은 가장 최신 프레임만 가져감

use crate::rendering::RasterFrame;
use std::collections::VecDeque;

const QUEUE_CAPACITY: usize = 4;

/// 프리뷰 스레드가 만든 프레임 1장
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    /// 프리뷰 시작 이후 일련번호
    pub sequence: u64,
    /// 렌더링에 사용된 각도 (라디안)
    pub angle: f64,
    pub frame: RasterFrame,
}

/// 프리뷰 프레임 큐 (Mutex로 감싸서 사용)
pub struct FrameQueue {
    buffer: VecDeque<PreviewFrame>,
    max_len: usize,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::with_capacity(QUEUE_CAPACITY)
    }

    pub fn with_capacity(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            buffer: VecDeque::with_capacity(max_len),
            max_len,
        }
    }

    /// 큐에 프레임 추가 (용량 초과 시 가장 오래된 것 evict)
    pub fn push(&mut self, frame: PreviewFrame) {
        while self.buffer.len() >= self.max_len {
            let _ = self.buffer.pop_front();
        }
        self.buffer.push_back(frame);
    }

    /// 가장 최근 프레임 조회 (소비하지 않음)
    pub fn latest(&self) -> Option<PreviewFrame> {
        self.buffer.back().cloned()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64) -> PreviewFrame {
        PreviewFrame {
            sequence,
            angle: 0.0,
            frame: RasterFrame::new(2, 2),
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut queue = FrameQueue::with_capacity(2);
        queue.push(frame(1));
        queue.push(frame(2));
        queue.push(frame(3));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.latest().map(|f| f.sequence), Some(3));
    }

    #[test]
    fn latest_does_not_consume() {
        let mut queue = FrameQueue::new();
        assert!(queue.latest().is_none());
        queue.push(frame(7));
        assert_eq!(queue.latest().map(|f| f.sequence), Some(7));
        assert_eq!(queue.len(), 1);
        queue.clear();
        assert!(queue.is_empty());
    }
}
