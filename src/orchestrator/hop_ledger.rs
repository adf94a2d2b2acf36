//! 中继去重记录
//!
//! 以 job_id 为键记录"已开始处理的最大 cursor"。同一任务的某一跳如果
//! cursor 不大于已记录值，说明是中继的重复投递或乱序投递，直接忽略。
//! 只在单个进程内有效。

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    highest_cursor: usize,
    last_seen: Instant,
}

/// 中继去重记录
#[derive(Debug)]
pub struct HopLedger {
    entries: DashMap<String, LedgerEntry>,
    ttl: Duration,
}

impl HopLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// 登记 (job_id, cursor)；首次出现且比已知进度新时返回 true
    pub fn observe(&self, job_id: &str, cursor: usize) -> bool {
        self.prune();

        let now = Instant::now();
        match self.entries.entry(job_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let seen = entry.get_mut();
                if cursor <= seen.highest_cursor {
                    debug!(
                        "[任务 {}] 重复投递: cursor {} <= 已处理 {}",
                        job_id, cursor, seen.highest_cursor
                    );
                    return false;
                }
                seen.highest_cursor = cursor;
                seen.last_seen = now;
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(LedgerEntry {
                    highest_cursor: cursor,
                    last_seen: now,
                });
                true
            }
        }
    }

    /// 当前记录的任务数
    pub fn tracked_jobs(&self) -> usize {
        self.entries.len()
    }

    fn prune(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.last_seen.elapsed() < ttl);
    }
}
