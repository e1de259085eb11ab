// SPDX-License-Identifier: GPL-3.0-only

//! Pending composited-frame captures

use std::collections::{HashMap, VecDeque};

use image::RgbaImage;
use tracing::debug;

use super::placement::StreamMappings;
use crate::geometry::{FrameSize, RectF};
use crate::rendezvous::{Consumer, Producer};

/// Handle returned to whoever requested a capture
pub type PendingCapture = Consumer<RgbaImage>;

/// A capture waiting for its sources to deliver fresh frames
#[derive(Debug)]
pub struct CaptureRequest {
    pub image_size: FrameSize,
    pub viewport: RectF,
    /// Placement computed when the request was made
    pub mappings: StreamMappings,
    /// Remaining frames per pipeline name
    skip_frames: HashMap<String, i32>,
    producer: Producer<RgbaImage>,
}

impl CaptureRequest {
    pub fn new(
        image_size: FrameSize,
        viewport: RectF,
        mappings: StreamMappings,
        skip_frames: HashMap<String, i32>,
        producer: Producer<RgbaImage>,
    ) -> Self {
        Self {
            image_size,
            viewport,
            mappings,
            skip_frames,
            producer,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.skip_frames.is_empty()
    }

    /// Whether the requester stopped waiting, e.g. after a timeout
    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }

    /// Count one fresh frame from `source`; it stops being waited on once
    /// its counter drops below zero
    fn frame_arrived(&mut self, source: &str) {
        if let Some(remaining) = self.skip_frames.get_mut(source) {
            *remaining -= 1;
            if *remaining < 0 {
                self.skip_frames.remove(source);
            }
        }
    }

    /// Hand the image to the requester. Returns `false` if nobody is waiting.
    pub fn deliver(self, image: RgbaImage) -> bool {
        self.producer.fulfil(image)
    }
}

/// FIFO of capture requests. Only the head is ever counted down or served;
/// requests nobody waits for any more are dropped before they reach it.
#[derive(Debug, Default)]
pub struct CaptureQueue {
    requests: VecDeque<CaptureRequest>,
}

impl CaptureQueue {
    pub fn push(&mut self, request: CaptureRequest) {
        self.requests.push_back(request);
    }

    /// A fresh frame from `source` counts toward the head request only
    pub fn frame_arrived(&mut self, source: &str) {
        self.drop_abandoned();
        if let Some(head) = self.requests.front_mut() {
            head.frame_arrived(source);
        }
    }

    /// Stop waiting on sources that are no longer selected
    pub fn retain_sources(&mut self, selected: &[&str]) {
        for request in &mut self.requests {
            request
                .skip_frames
                .retain(|source, _| selected.contains(&source.as_str()));
        }
    }

    /// Remove and return the head request if it is settled
    pub fn take_ready(&mut self) -> Option<CaptureRequest> {
        self.drop_abandoned();
        if self.requests.front().is_some_and(CaptureRequest::is_settled) {
            let request = self.requests.pop_front();
            debug!(remaining = self.requests.len(), "Serving capture request");
            request
        } else {
            None
        }
    }

    fn drop_abandoned(&mut self) {
        while self.requests.front().is_some_and(CaptureRequest::is_abandoned) {
            self.requests.pop_front();
            debug!(remaining = self.requests.len(), "Dropped abandoned capture request");
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
