//! 플레이어별 최근 메시지 보관소
//!
//! 플레이어마다 최근 N개의 메시지를 고정 크기 링으로 보관합니다.
//! 처벌 기록을 남길 때 증거로 첨부됩니다.
//!
//! 여러 소스의 파이프라인이 하나의 저장소를 공유하므로
//! [`DashMap`]으로 플레이어 키 단위의 원자적 추가를 보장합니다.

use std::collections::VecDeque;

use dashmap::DashMap;

/// 기본 보관 개수
pub const DEFAULT_CONTEXT_CAPACITY: usize = 10;

/// 플레이어별 최근 메시지 저장소
#[derive(Debug)]
pub struct PlayerContextStore {
    windows: DashMap<String, VecDeque<String>>,
    capacity: usize,
}

impl PlayerContextStore {
    /// 플레이어당 `capacity`개를 보관하는 저장소를 만듭니다.
    ///
    /// `capacity`가 0이면 1로 올려 잡습니다.
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// 메시지를 추가합니다. 가득 차 있으면 가장 오래된 메시지를 버립니다.
    pub fn record(&self, player: &str, text: &str) {
        let mut window = self
            .windows
            .entry(player.to_owned())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(text.to_owned());
    }

    /// 플레이어의 최근 메시지를 오래된 순서로 복사해 반환합니다.
    pub fn snapshot(&self, player: &str) -> Option<Vec<String>> {
        self.windows
            .get(player)
            .map(|window| window.iter().cloned().collect())
    }

    /// 플레이어당 보관 개수
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 기록된 플레이어 수
    pub fn player_count(&self) -> usize {
        self.windows.len()
    }
}

impl Default for PlayerContextStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_CAPACITY)
    }
}
