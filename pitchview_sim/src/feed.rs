//! Per-view frame feed over a pre-simulated world.

use std::sync::Arc;

use async_trait::async_trait;
use pitchview_env::{EnvError, Frame, FrameSource, ViewId};

use crate::oracle::WorldState;
use crate::render::{RenderStyle, Renderer};
use crate::rig::SyntheticCamera;

/// Renders one camera's frames lazily from a shared world timeline.
///
/// The timeline is simulated once and shared by every view, so all feeds
/// show the same instant at the same index.
pub struct StadiumFeed {
    camera: SyntheticCamera,
    renderer: Renderer,
    world: Arc<Vec<WorldState>>,
    next: usize,
}

impl StadiumFeed {
    pub fn new(camera: SyntheticCamera, style: RenderStyle, seed: u64, world: Arc<Vec<WorldState>>) -> Self {
        let renderer = Renderer::new(style, seed.wrapping_add(camera.view().index() as u64));
        Self {
            camera,
            renderer,
            world,
            next: 0,
        }
    }

    pub fn view(&self) -> ViewId {
        self.camera.view()
    }

    pub fn remaining(&self) -> usize {
        self.world.len().saturating_sub(self.next)
    }
}

#[async_trait]
impl FrameSource for StadiumFeed {
    async fn next_frame(&mut self) -> Result<Option<Frame>, EnvError> {
        let Some(state) = self.world.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        Ok(Some(self.renderer.render(&self.camera, state)))
    }
}
