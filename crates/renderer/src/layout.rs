//! Per-image layout bookkeeping.
//!
//! [`ResourceLayoutTracker`] is the single owner of the last known layout of
//! every image the frame core touches. Barriers are derived from the
//! recorded state, never queried back from the driver.
//!
//! ```text
//! track(image)            -> UNDEFINED
//! transition(image, L)    -> barrier(current -> L), current = L
//! transition(image, L)    -> no-op while current == L
//! ```

use std::collections::HashMap;

use ash::vk;
use tracing::error;

use lumen_rhi::{Gpu, ImageBarrier};

/// Tracked state of one image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutRecord {
    pub layout: vk::ImageLayout,
    /// Stage of the last access, the source scope of the next barrier.
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub aspect: vk::ImageAspectFlags,
}

impl LayoutRecord {
    /// Contents undefined, no prior dependency known.
    pub const fn undefined(aspect: vk::ImageAspectFlags) -> Self {
        Self {
            layout: vk::ImageLayout::UNDEFINED,
            stage: vk::PipelineStageFlags2::NONE,
            access: vk::AccessFlags2::NONE,
            aspect,
        }
    }

    /// Source scope for a barrier leaving this state.
    fn source_scope(&self) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
        if self.layout == vk::ImageLayout::UNDEFINED {
            // Wait on everything submitted so far.
            (
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::AccessFlags2::MEMORY_WRITE,
            )
        } else {
            (self.stage, self.access)
        }
    }
}

/// Last known layout of every tracked image.
#[derive(Debug, Default)]
pub struct ResourceLayoutTracker {
    records: HashMap<vk::Image, LayoutRecord>,
}

impl ResourceLayoutTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `image` in `UNDEFINED`, replacing any previous record.
    pub fn track(&mut self, image: vk::Image, aspect: vk::ImageAspectFlags) {
        self.records.insert(image, LayoutRecord::undefined(aspect));
    }

    pub fn untrack(&mut self, image: vk::Image) -> Option<LayoutRecord> {
        self.records.remove(&image)
    }

    /// Forget the contents of every tracked image.
    pub fn reset_all(&mut self) {
        for record in self.records.values_mut() {
            *record = LayoutRecord::undefined(record.aspect);
        }
    }

    #[inline]
    pub fn is_tracked(&self, image: vk::Image) -> bool {
        self.records.contains_key(&image)
    }

    #[inline]
    pub fn record(&self, image: vk::Image) -> Option<&LayoutRecord> {
        self.records.get(&image)
    }

    #[inline]
    pub fn layout(&self, image: vk::Image) -> Option<vk::ImageLayout> {
        self.records.get(&image).map(|record| record.layout)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The barrier moving `image` to `target`, or `None` when it is already
    /// there.
    pub fn plan_transition(
        &self,
        image: vk::Image,
        target: vk::ImageLayout,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) -> Option<ImageBarrier> {
        let current = self.current_record(image);
        if current.layout == target {
            return None;
        }

        let (src_stage, src_access) = current.source_scope();
        Some(ImageBarrier {
            image,
            aspect: current.aspect,
            old_layout: current.layout,
            new_layout: target,
            src_stage,
            src_access,
            dst_stage,
            dst_access,
        })
    }

    /// Record a barrier into `cmd` moving `image` to `target` and store the
    /// new state. Returns whether a barrier was recorded.
    pub fn transition<G: Gpu>(
        &mut self,
        gpu: &G,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        target: vk::ImageLayout,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) -> bool {
        let Some(barrier) = self.plan_transition(image, target, dst_stage, dst_access) else {
            return false;
        };

        gpu.cmd_image_barrier(cmd, &barrier);
        self.records.insert(
            image,
            LayoutRecord {
                layout: target,
                stage: dst_stage,
                access: dst_access,
                aspect: barrier.aspect,
            },
        );
        true
    }

    /// Record a barrier on `image` that keeps its layout but orders the
    /// last recorded access before `dst_stage`/`dst_access`.
    ///
    /// For attachments that stay in one layout and are rewritten every
    /// frame, where [`Self::transition`] records nothing.
    pub fn serialize<G: Gpu>(
        &mut self,
        gpu: &G,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) {
        let current = self.current_record(image);
        let (src_stage, src_access) = current.source_scope();
        gpu.cmd_image_barrier(
            cmd,
            &ImageBarrier {
                image,
                aspect: current.aspect,
                old_layout: current.layout,
                new_layout: current.layout,
                src_stage,
                src_access,
                dst_stage,
                dst_access,
            },
        );
        self.records.insert(
            image,
            LayoutRecord {
                stage: dst_stage,
                access: dst_access,
                ..current
            },
        );
    }

    fn current_record(&self, image: vk::Image) -> LayoutRecord {
        match self.records.get(&image) {
            Some(record) => *record,
            None => {
                debug_assert!(false, "transition requested on untracked image {image:?}");
                error!("Transition requested on untracked image {image:?}, assuming UNDEFINED");
                LayoutRecord::undefined(vk::ImageAspectFlags::COLOR)
            }
        }
    }
}
