use crate::backend::Backend;
use crate::pool::TransientPool;
use crate::resource::{
    Access, ResourceRegistry, ResourceState, ResourceUsage, TextureDesc, TextureHandle,
};

/// A unit of GPU work scheduled by the graph.
///
/// `setup` runs once, synchronously, while the graph is being built and
/// declares every texture the pass touches. `execute` runs only if the pass
/// survives culling, after the graph has transitioned each declared texture
/// into its required state.
pub trait RenderPass<B: Backend> {
    fn name(&self) -> &str;
    fn setup(&mut self, builder: &mut PassBuilder<'_, '_, B>);
    fn execute(&mut self, context: &mut PassContext<'_, '_, B>);
}

/// Pass built from `RenderGraph::add_pass`: typed setup-time data plus the
/// closure that consumes it at run time.
pub(crate) struct CallbackPass<D, E> {
    name: String,
    data: D,
    execute: E,
}

impl<D, E> CallbackPass<D, E> {
    pub(crate) fn new(name: String, data: D, execute: E) -> Self {
        Self {
            name,
            data,
            execute,
        }
    }
}

impl<B, D, E> RenderPass<B> for CallbackPass<D, E>
where
    B: Backend,
    E: FnMut(&D, &mut PassContext<'_, '_, B>),
{
    fn name(&self) -> &str {
        &self.name
    }

    // The setup closure already ran inside `add_pass`.
    fn setup(&mut self, _builder: &mut PassBuilder<'_, '_, B>) {}

    fn execute(&mut self, context: &mut PassContext<'_, '_, B>) {
        (self.execute)(&self.data, context);
    }
}

pub(crate) struct PassEntry<'a, B: Backend> {
    pub(crate) name: String,
    pub(crate) pass: Box<dyn RenderPass<B> + 'a>,
    pub(crate) usages: Vec<ResourceUsage>,
    pub(crate) keep_alive: bool,
    pub(crate) culled: bool,
}

impl<'a, B: Backend> PassEntry<'a, B> {
    pub(crate) fn new(
        name: String,
        pass: Box<dyn RenderPass<B> + 'a>,
        usages: Vec<ResourceUsage>,
        keep_alive: bool,
    ) -> Self {
        Self {
            name,
            pass,
            usages,
            keep_alive,
            culled: false,
        }
    }
}

/// Records one pass's resource usages during setup.
pub struct PassBuilder<'r, 'a, B: Backend> {
    resources: &'r mut ResourceRegistry<'a, B::Texture>,
    pass_name: &'r str,
    usages: Vec<ResourceUsage>,
    keep_alive: bool,
}

impl<'r, 'a, B: Backend> PassBuilder<'r, 'a, B> {
    pub(crate) fn new(
        resources: &'r mut ResourceRegistry<'a, B::Texture>,
        pass_name: &'r str,
    ) -> Self {
        Self {
            resources,
            pass_name,
            usages: Vec::new(),
            keep_alive: false,
        }
    }

    pub(crate) fn finish(self) -> (Vec<ResourceUsage>, bool) {
        (self.usages, self.keep_alive)
    }

    pub fn pass_name(&self) -> &str {
        self.pass_name
    }

    pub fn read_texture(&mut self, handle: TextureHandle, state: ResourceState) -> TextureHandle {
        self.record(handle, state, Access::Read);
        handle
    }

    /// Declares a write. On transient textures the state's capability is
    /// folded into the usage the texture will be allocated with.
    pub fn write_texture(&mut self, handle: TextureHandle, state: ResourceState) -> TextureHandle {
        self.record(handle, state, Access::Write);
        self.resources
            .accumulate_usage(handle, state.implied_usage());
        handle
    }

    pub fn create_texture(&mut self, name: impl Into<String>, desc: TextureDesc) -> TextureHandle {
        self.resources.register_texture(name, desc)
    }

    /// Keeps the pass even when nothing reads what it writes.
    pub fn keep_alive(&mut self) {
        self.keep_alive = true;
    }

    pub fn texture_desc(&self, handle: TextureHandle) -> Option<&TextureDesc> {
        self.resources.get(handle).map(|resource| resource.desc())
    }

    fn record(&mut self, handle: TextureHandle, state: ResourceState, access: Access) {
        if self.resources.get(handle).is_none() {
            log::debug!(
                "Pass '{}' declares {:?} on unknown texture {:?}",
                self.pass_name,
                access,
                handle
            );
        }
        self.usages.push(ResourceUsage {
            handle,
            state,
            access,
        });
    }
}

/// What a pass sees while it records commands.
pub struct PassContext<'c, 'a, B: Backend> {
    pub backend: &'c B,
    pub cmd: &'c mut B::CommandContext,
    resources: &'c ResourceRegistry<'a, B::Texture>,
    pool: &'c TransientPool<B>,
    pass_index: usize,
}

impl<'c, 'a, B: Backend> PassContext<'c, 'a, B> {
    pub(crate) fn new(
        backend: &'c B,
        cmd: &'c mut B::CommandContext,
        resources: &'c ResourceRegistry<'a, B::Texture>,
        pool: &'c TransientPool<B>,
        pass_index: usize,
    ) -> Self {
        Self {
            backend,
            cmd,
            resources,
            pool,
            pass_index,
        }
    }

    /// Physical texture behind `handle`, if it is bound this frame.
    pub fn texture(&self, handle: TextureHandle) -> Option<&'c B::Texture> {
        let resources = self.resources;
        let pool = self.pool;
        resources.get(handle)?.physical(pool)
    }

    pub fn texture_desc(&self, handle: TextureHandle) -> Option<&'c TextureDesc> {
        let resources = self.resources;
        resources.get(handle).map(|resource| resource.desc())
    }

    pub fn state(&self, handle: TextureHandle) -> Option<ResourceState> {
        self.resources.get(handle).map(|resource| resource.state())
    }

    pub fn pass_index(&self) -> usize {
        self.pass_index
    }
}
