use async_trait::async_trait;

/// The scrollable view hosting the entity list.
///
/// A refresh replaces the list wholesale, which can reset the scroll
/// position. The offset is captured right before the refresh is requested
/// and restored only after `next_paint` resolves; restoring earlier races
/// the layout pass.
#[async_trait]
pub trait ScrollViewport: Send + Sync {
    fn capture_offset(&self) -> f64;

    /// Resolves once the latest store state has been rendered.
    async fn next_paint(&self);

    fn restore_offset(&self, offset: f64);
}

/// Viewport for hosts without a scroll surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessViewport;

#[async_trait]
impl ScrollViewport for HeadlessViewport {
    fn capture_offset(&self) -> f64 {
        0.0
    }

    async fn next_paint(&self) {}

    fn restore_offset(&self, _offset: f64) {}
}
