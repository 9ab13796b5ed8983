//! The four category pools.

use std::sync::Arc;

use crate::config::PoolsConfig;
use crate::pool::descriptor::{PoolDescriptor, WorkloadKind};
use crate::pool::worker::{PoolStats, WorkerPool};
use crate::types::DispatchResult;

/// Independently sized pools, one per workload category.
#[derive(Debug, Clone)]
pub struct PoolSet {
    generic: Arc<WorkerPool>,
    audio: Arc<WorkerPool>,
    transcription: Arc<WorkerPool>,
    ai: Arc<WorkerPool>,
}

impl PoolSet {
    /// Build from explicit descriptors.
    pub fn new(
        generic: PoolDescriptor,
        audio: PoolDescriptor,
        transcription: PoolDescriptor,
        ai: PoolDescriptor,
    ) -> Self {
        Self {
            generic: Arc::new(WorkerPool::new(generic)),
            audio: Arc::new(WorkerPool::new(audio)),
            transcription: Arc::new(WorkerPool::new(transcription)),
            ai: Arc::new(WorkerPool::new(ai)),
        }
    }

    pub fn from_config(config: &PoolsConfig) -> DispatchResult<Self> {
        let descriptor = |kind: WorkloadKind| PoolDescriptor::from_config(kind, kind.config(config));
        Ok(Self::new(
            descriptor(WorkloadKind::Generic)?,
            descriptor(WorkloadKind::Audio)?,
            descriptor(WorkloadKind::Transcription)?,
            descriptor(WorkloadKind::Ai)?,
        ))
    }

    pub fn get(&self, kind: WorkloadKind) -> &Arc<WorkerPool> {
        match kind {
            WorkloadKind::Generic => &self.generic,
            WorkloadKind::Audio => &self.audio,
            WorkloadKind::Transcription => &self.transcription,
            WorkloadKind::Ai => &self.ai,
        }
    }

    pub fn stats(&self) -> Vec<PoolStats> {
        WorkloadKind::ALL.iter().map(|kind| self.get(*kind).stats()).collect()
    }

    pub fn drain(&self) {
        for kind in WorkloadKind::ALL {
            self.get(kind).drain();
        }
    }

    pub fn is_drained(&self) -> bool {
        WorkloadKind::ALL.iter().all(|kind| self.get(*kind).is_drained())
    }
}
