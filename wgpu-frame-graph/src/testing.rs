use crate::Result;
use crate::backend::{Backend, TextureBarrier};
use crate::resource::{ResourceState, TextureDesc, TextureHandle, TextureUsageFlags};
use std::cell::Cell;

/// Hands out sequential ids as textures and records transitions into the
/// command context.
#[derive(Default)]
pub(crate) struct CountingBackend {
    pub(crate) created: Cell<u32>,
}

impl Backend for CountingBackend {
    type Texture = u32;
    type CommandContext = Vec<(TextureHandle, ResourceState, ResourceState)>;

    fn create_texture(
        &self,
        _label: &str,
        _desc: &TextureDesc,
        _usage: TextureUsageFlags,
    ) -> Result<u32> {
        let id = self.created.get();
        self.created.set(id + 1);
        Ok(id)
    }

    fn transition_textures(
        &self,
        cmd: &mut Self::CommandContext,
        barriers: &[TextureBarrier<'_, u32>],
    ) {
        cmd.extend(
            barriers
                .iter()
                .map(|barrier| (barrier.handle, barrier.before, barrier.after)),
        );
    }
}
