// SPDX-License-Identifier: GPL-3.0-only

//! Per-source rendering state

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::framebuffer::{ContextId, Framebuffer};
use super::watchdog::FreezeWatchdog;
use crate::backends::camera::SourcePipeline;
use crate::backends::camera::types::VideoSourceDescriptor;
use crate::geometry::FrameSize;

/// A surface owned by one render context
struct Surface {
    framebuffer: Framebuffer,
    /// Serial of the frame last converted into this surface (0 = never)
    uploaded_serial: u64,
}

/// Everything the compositor tracks for one selected source
pub struct SourceHandle {
    descriptor: VideoSourceDescriptor,
    pipeline: Option<Arc<dyn SourcePipeline>>,
    frame_size: Option<FrameSize>,
    /// Frames ignored since the pipeline was attached
    settled_frames: u32,
    startup_skip_frames: u32,
    /// Incremented for every accepted frame
    frame_serial: u64,
    surfaces: HashMap<ContextId, Surface>,
    watchdog: FreezeWatchdog,
}

impl SourceHandle {
    pub fn new(
        descriptor: VideoSourceDescriptor,
        startup_skip_frames: u32,
        watchdog: FreezeWatchdog,
    ) -> Self {
        Self {
            descriptor,
            pipeline: None,
            frame_size: None,
            settled_frames: 0,
            startup_skip_frames,
            frame_serial: 0,
            surfaces: HashMap::new(),
            watchdog,
        }
    }

    pub fn descriptor(&self) -> &VideoSourceDescriptor {
        &self.descriptor
    }

    /// Last frame size reported by the pipeline
    pub fn frame_size(&self) -> Option<FrameSize> {
        self.frame_size.filter(|size| !size.is_empty())
    }

    /// Attach a pipeline, restarting the start-up settle count
    pub fn attach_pipeline(&mut self, pipeline: Arc<dyn SourcePipeline>) {
        info!(source = %self.descriptor, pipeline = pipeline.name(), "Attaching pipeline");
        self.pipeline = Some(pipeline);
        self.settled_frames = 0;
    }

    pub fn detach_pipeline(&mut self) {
        if self.pipeline.take().is_some() {
            debug!(source = %self.descriptor, "Detaching pipeline");
        }
        self.watchdog.stop();
    }

    /// Record a frame announced by the pipeline.
    ///
    /// Returns `true` when the frame counts as fresh, `false` while the
    /// source is still settling or has no pipeline.
    pub fn on_frame_ready(&mut self, size: FrameSize) -> bool {
        if self.pipeline.is_none() {
            return false;
        }

        self.frame_size = Some(size);
        let fresh = if self.settled_frames >= self.startup_skip_frames {
            self.frame_serial += 1;
            true
        } else {
            self.settled_frames += 1;
            false
        };
        self.watchdog.restart();
        fresh
    }

    /// Convert the latest frame into this context's surface if it has not
    /// been uploaded there yet. Creates the surface lazily.
    pub fn update_surface(&mut self, context: ContextId) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };
        let Some(size) = self.frame_size.filter(|size| !size.is_empty()) else {
            return;
        };
        if self.frame_serial == 0 {
            return;
        }

        let surface = self.surfaces.entry(context).or_insert_with(|| {
            debug!(source = %self.descriptor, size = %size, "Creating surface");
            Surface {
                framebuffer: Framebuffer::new(size),
                uploaded_serial: 0,
            }
        });
        if surface.framebuffer.size() != size {
            surface.framebuffer = Framebuffer::new(size);
            surface.uploaded_serial = 0;
        }
        if surface.uploaded_serial != self.frame_serial && pipeline.convert(&mut surface.framebuffer)
        {
            surface.uploaded_serial = self.frame_serial;
        }
    }

    /// This context's surface, once it holds a converted frame
    pub fn surface(&self, context: ContextId) -> Option<&Framebuffer> {
        self.surfaces
            .get(&context)
            .filter(|surface| surface.uploaded_serial > 0)
            .map(|surface| &surface.framebuffer)
    }

    pub fn release_context(&mut self, context: ContextId) {
        self.surfaces.remove(&context);
    }

    pub fn restart_freeze_detection(&self) {
        if self.pipeline.is_some() {
            self.watchdog.restart();
        }
    }

    pub fn stop_freeze_detection(&self) {
        self.watchdog.stop();
    }
}

/// Handles of all selected sources
#[derive(Default)]
pub struct SourceRegistry {
    handles: HashMap<VideoSourceDescriptor, SourceHandle>,
}

impl SourceRegistry {
    /// Create handles for newly selected sources with `create` and remove
    /// handles of deselected ones.
    ///
    /// Removed handles are returned so the caller can drop them outside its
    /// lock; dropping a handle joins its watchdog thread.
    pub fn reconcile<F>(&mut self, selected: &[VideoSourceDescriptor], mut create: F) -> Vec<SourceHandle>
    where
        F: FnMut(&VideoSourceDescriptor) -> Option<SourceHandle>,
    {
        let stale: Vec<VideoSourceDescriptor> = self
            .handles
            .keys()
            .filter(|descriptor| !selected.contains(descriptor))
            .cloned()
            .collect();
        let mut removed = Vec::with_capacity(stale.len());
        for descriptor in stale {
            if let Some(mut handle) = self.handles.remove(&descriptor) {
                info!(source = %descriptor, "Source deselected");
                handle.detach_pipeline();
                removed.push(handle);
            }
        }

        for descriptor in selected {
            if !self.handles.contains_key(descriptor) {
                if let Some(handle) = create(descriptor) {
                    info!(source = %descriptor, "Source selected");
                    self.handles.insert(descriptor.clone(), handle);
                }
            }
        }

        removed
    }

    pub fn get(&self, descriptor: &VideoSourceDescriptor) -> Option<&SourceHandle> {
        self.handles.get(descriptor)
    }

    pub fn get_mut(&mut self, descriptor: &VideoSourceDescriptor) -> Option<&mut SourceHandle> {
        self.handles.get_mut(descriptor)
    }

    /// Look up by pipeline name
    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut SourceHandle> {
        self.handles
            .values_mut()
            .find(|handle| handle.descriptor.name == name)
    }

    pub fn handles(&self) -> impl Iterator<Item = &SourceHandle> {
        self.handles.values()
    }

    pub fn handles_mut(&mut self) -> impl Iterator<Item = &mut SourceHandle> {
        self.handles.values_mut()
    }

    pub fn release_context(&mut self, context: ContextId) {
        for handle in self.handles.values_mut() {
            handle.release_context(context);
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::VideoSourceKind;
    use crate::compositor::framebuffer::RenderContext;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingPipeline {
        conversions: AtomicU32,
    }

    impl SourcePipeline for CountingPipeline {
        fn name(&self) -> &str {
            "counting"
        }

        fn convert(&self, _surface: &mut Framebuffer) -> bool {
            self.conversions.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn handle(startup_skip: u32) -> SourceHandle {
        SourceHandle::new(
            VideoSourceDescriptor::new(VideoSourceKind::DownwardCamera, "counting"),
            startup_skip,
            FreezeWatchdog::new("test", None, || {}).unwrap(),
        )
    }

    #[test]
    fn test_frames_ignored_without_pipeline() {
        let mut handle = handle(0);
        assert!(!handle.on_frame_ready(FrameSize::new(4, 4)));
        assert_eq!(handle.frame_size(), None);
    }

    #[test]
    fn test_startup_frames_are_skipped() {
        let mut handle = handle(2);
        handle.attach_pipeline(Arc::new(CountingPipeline {
            conversions: AtomicU32::new(0),
        }));

        assert!(!handle.on_frame_ready(FrameSize::new(4, 4)));
        assert!(!handle.on_frame_ready(FrameSize::new(4, 4)));
        assert!(handle.on_frame_ready(FrameSize::new(4, 4)));
    }

    #[test]
    fn test_surface_converted_once_per_frame() {
        let pipeline = Arc::new(CountingPipeline {
            conversions: AtomicU32::new(0),
        });
        let mut handle = handle(0);
        handle.attach_pipeline(pipeline.clone());
        let context = RenderContext::new();

        handle.update_surface(context.id());
        assert!(handle.surface(context.id()).is_none());

        handle.on_frame_ready(FrameSize::new(4, 4));
        handle.update_surface(context.id());
        handle.update_surface(context.id());
        assert_eq!(pipeline.conversions.load(Ordering::SeqCst), 1);
        assert!(handle.surface(context.id()).is_some());

        handle.release_context(context.id());
        assert!(handle.surface(context.id()).is_none());
    }

    #[test]
    fn test_reconcile_adds_and_removes() {
        let mut registry = SourceRegistry::default();
        let a = VideoSourceDescriptor::new(VideoSourceKind::DownwardCamera, "a");
        let b = VideoSourceDescriptor::new(VideoSourceKind::MatDesktop, "b");
        let make = |d: &VideoSourceDescriptor| {
            Some(SourceHandle::new(
                d.clone(),
                0,
                FreezeWatchdog::new("test", None, || {}).unwrap(),
            ))
        };

        assert!(registry.reconcile(&[a.clone(), b.clone()], make).is_empty());
        assert_eq!(registry.len(), 2);

        let removed = registry.reconcile(&[b.clone()], make);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].descriptor(), &a);
        assert!(registry.get(&b).is_some());
    }
}
