//! 分块规划 - 业务能力层
//!
//! 把去重后的标识符列表按原顺序切成不超过 C 个的分块，并给出耗时预估。

use crate::models::Chunk;

/// 规划结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    pub estimated_time: &'static str,
}

impl ChunkPlan {
    /// 规划分块（空输入在上游已被拒绝）
    pub fn new(identifiers: &[String], chunk_size: usize) -> Self {
        Self {
            chunks: plan_chunks(identifiers, chunk_size),
            estimated_time: estimate_time(identifiers.len()),
        }
    }

    pub fn total_identifiers(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }
}

/// 按顺序切分，每块不超过 `chunk_size`，不产生空块
pub fn plan_chunks(identifiers: &[String], chunk_size: usize) -> Vec<Chunk> {
    identifiers
        .chunks(chunk_size.max(1))
        .map(|c| c.to_vec())
        .collect()
}

/// 耗时预估（仅供展示，不参与超时逻辑）
pub fn estimate_time(count: usize) -> &'static str {
    match count {
        0..=20 => "15-30s",
        21..=50 => "30-60s",
        51..=100 => "1-2m",
        101..=250 => "2-4m",
        _ => "4-8m",
    }
}
