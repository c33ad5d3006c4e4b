//! Per-draw push constant block.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Push constants shared by every draw in a frame.
///
/// Matches the GLSL block
///
/// ```glsl
/// layout(push_constant) uniform FrameConstants {
///     float time;
///     vec2 resolution;
/// };
/// ```
///
/// where `resolution` is 8-byte aligned.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FramePushConstants {
    pub time: f32,
    _pad: f32,
    pub resolution: Vec2,
}

impl FramePushConstants {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn new(time: f32, extent: vk::Extent2D) -> Self {
        Self {
            time,
            _pad: 0.0,
            resolution: Vec2::new(extent.width as f32, extent.height as f32),
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_and_layout() {
        assert_eq!(FramePushConstants::SIZE, 16);
        assert_eq!(std::mem::offset_of!(FramePushConstants, resolution), 8);
        assert!(FramePushConstants::SIZE <= lumen_core::config::MIN_PUSH_CONSTANT_SIZE);
    }

    #[test]
    fn test_bytes_encode_time_and_resolution() {
        let constants = FramePushConstants::new(
            1.5,
            vk::Extent2D {
                width: 1920,
                height: 1080,
            },
        );
        let bytes = constants.as_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], &1.5f32.to_le_bytes());
        assert_eq!(&bytes[8..12], &1920.0f32.to_le_bytes());
        assert_eq!(&bytes[12..16], &1080.0f32.to_le_bytes());
    }
}
