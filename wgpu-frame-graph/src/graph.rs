use crate::Result;
use crate::analysis::analyze;
use crate::backend::{Backend, TextureBarrier};
use crate::debug::{DebugFlags, GraphDump, PassStatistics};
use crate::pass::{CallbackPass, PassBuilder, PassContext, PassEntry, RenderPass};
use crate::pool::{PoolKey, TransientPool};
use crate::resource::{
    ResourceRegistry, ResourceState, ResourceUsage, TextureDesc, TextureHandle, TextureResource,
};
use web_time::Instant;

#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub executed_passes: Vec<String>,
    pub culled_passes: Vec<String>,
    pub barrier_count: usize,
    pub skipped_usages: usize,
    pub pass_statistics: Vec<PassStatistics>,
}

pub struct RenderGraph<'a, B: Backend> {
    resources: ResourceRegistry<'a, B::Texture>,
    passes: Vec<PassEntry<'a, B>>,
    debug_flags: DebugFlags,
    needs_compile: bool,
}

impl<B: Backend> Default for RenderGraph<'_, B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, B: Backend> RenderGraph<'a, B> {
    pub fn new() -> Self {
        Self::with_debug_flags(DebugFlags::from_env())
    }

    pub fn with_debug_flags(debug_flags: DebugFlags) -> Self {
        Self {
            resources: ResourceRegistry::new(),
            passes: Vec::new(),
            debug_flags,
            needs_compile: true,
        }
    }

    pub fn set_debug_flags(&mut self, debug_flags: DebugFlags) {
        self.debug_flags = debug_flags;
    }

    pub fn debug_flags(&self) -> DebugFlags {
        self.debug_flags
    }

    pub fn register_texture(&mut self, name: impl Into<String>, desc: TextureDesc) -> TextureHandle {
        self.needs_compile = true;
        self.resources.register_texture(name, desc)
    }

    pub fn import_texture(
        &mut self,
        name: impl Into<String>,
        texture: &'a B::Texture,
        state: &'a mut ResourceState,
        desc: TextureDesc,
    ) -> TextureHandle {
        self.needs_compile = true;
        self.resources.import_texture(name, texture, state, desc)
    }

    /// Adds a pass built from a setup closure and an execute closure.
    ///
    /// `setup` runs immediately and fills a `D` that is later handed to
    /// `execute`, which only runs if the pass survives culling.
    pub fn add_pass<D, S, E>(&mut self, name: impl Into<String>, setup: S, execute: E) -> usize
    where
        D: Default + 'a,
        S: FnOnce(&mut D, &mut PassBuilder<'_, 'a, B>),
        E: FnMut(&D, &mut PassContext<'_, '_, B>) + 'a,
    {
        let name = name.into();
        let mut data = D::default();
        let mut builder = PassBuilder::new(&mut self.resources, &name);
        setup(&mut data, &mut builder);
        let (usages, keep_alive) = builder.finish();

        let pass = CallbackPass::new(name.clone(), data, execute);
        self.push_pass(name, Box::new(pass), usages, keep_alive)
    }

    pub fn add_render_pass<P>(&mut self, mut pass: P) -> usize
    where
        P: RenderPass<B> + 'a,
    {
        let name = pass.name().to_string();
        let mut builder: PassBuilder<'_, 'a, B> = PassBuilder::new(&mut self.resources, &name);
        pass.setup(&mut builder);
        let (usages, keep_alive) = builder.finish();

        self.push_pass(name, Box::new(pass), usages, keep_alive)
    }

    fn push_pass(
        &mut self,
        name: String,
        pass: Box<dyn RenderPass<B> + 'a>,
        usages: Vec<ResourceUsage>,
        keep_alive: bool,
    ) -> usize {
        let index = self.passes.len();
        self.passes
            .push(PassEntry::new(name, pass, usages, keep_alive));
        self.needs_compile = true;
        index
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn resources(&self) -> &ResourceRegistry<'a, B::Texture> {
        &self.resources
    }

    pub fn texture_desc(&self, handle: TextureHandle) -> Option<&TextureDesc> {
        self.resources.get(handle).map(TextureResource::desc)
    }

    pub fn compile(&mut self) -> usize {
        let culled = analyze(&mut self.resources, &mut self.passes);
        self.needs_compile = false;

        log::debug!(
            "Compiled render graph: {} passes ({} culled), {} textures",
            self.passes.len(),
            culled,
            self.resources.len()
        );

        if self.debug_flags.contains(DebugFlags::LOG_LIFETIMES) {
            for (handle, resource) in self.resources.iter().filter(|(_, r)| r.is_required()) {
                log::info!(
                    "{:?} '{}' lives from pass {:?} to pass {:?}",
                    handle,
                    resource.name(),
                    resource.first_use(),
                    resource.last_use()
                );
            }
        }

        culled
    }

    pub fn is_culled(&mut self, pass_index: usize) -> Option<bool> {
        self.compile_if_needed();
        self.passes.get(pass_index).map(|pass| pass.culled)
    }

    pub fn dump(&mut self) -> GraphDump {
        self.compile_if_needed();
        GraphDump::capture(&self.resources, &self.passes)
    }

    pub fn to_dot(&mut self) -> String {
        self.dump().to_dot()
    }

    fn compile_if_needed(&mut self) {
        if self.needs_compile {
            self.compile();
        }
    }

    /// Runs every surviving pass in declaration order.
    ///
    /// Transients are bound from `pool` on first use and returned after their
    /// last use. Before each pass, textures not already in the state the pass
    /// declared are transitioned in one batch. If a pass cannot bind all of
    /// its transients the frame stops before that pass changes any state,
    /// and the pool's frame is still advanced.
    pub fn execute(
        mut self,
        backend: &B,
        pool: &mut TransientPool<B>,
        cmd: &mut B::CommandContext,
    ) -> Result<FrameReport> {
        self.compile_if_needed();

        if self.debug_flags.contains(DebugFlags::DUMP_GRAPH) {
            log::info!(
                "Render graph:\n{}",
                GraphDump::capture(&self.resources, &self.passes)
            );
        }

        let mut report = FrameReport::default();
        let result = self.run_passes(backend, pool, cmd, &mut report);
        self.release_remaining(pool);

        pool.end_frame();

        result.map(|()| report)
    }

    fn run_passes(
        &mut self,
        backend: &B,
        pool: &mut TransientPool<B>,
        cmd: &mut B::CommandContext,
        report: &mut FrameReport,
    ) -> Result<()> {
        let debug_flags = self.debug_flags;
        let Self {
            resources, passes, ..
        } = self;
        let mut transitions = Vec::new();

        for (pass_index, pass) in passes.iter_mut().enumerate() {
            if pass.culled {
                log::trace!("Skipping culled pass '{}'", pass.name);
                report.culled_passes.push(pass.name.clone());
                continue;
            }

            // Bind everything first so a failed allocation leaves every
            // tracked state untouched.
            for usage in &pass.usages {
                let Some(resource) = resources.get_mut(usage.handle) else {
                    log::debug!(
                        "Pass '{}' skips unresolved texture {:?}",
                        pass.name,
                        usage.handle
                    );
                    report.skipped_usages += 1;
                    continue;
                };

                if !resource.is_bound() {
                    let key = PoolKey {
                        desc: *resource.desc(),
                        usage: resource.usage(),
                    };
                    let (slot, pooled_state) = pool.acquire(backend, resource.name(), key)?;
                    resource.bind_slot(slot, pooled_state);
                }
            }

            transitions.clear();
            for usage in &pass.usages {
                let Some(resource) = resources.get_mut(usage.handle) else {
                    continue;
                };
                let before = resource.state();
                if before != usage.state {
                    transitions.push((usage.handle, before, usage.state));
                    resource.set_state(usage.state);
                }
            }

            if !transitions.is_empty() {
                let barriers: Vec<TextureBarrier<'_, B::Texture>> = transitions
                    .iter()
                    .filter_map(|&(handle, before, after)| {
                        let resource = resources.get(handle)?;
                        Some(TextureBarrier {
                            handle,
                            name: resource.name(),
                            texture: resource.physical(&*pool)?,
                            before,
                            after,
                        })
                    })
                    .collect();

                if debug_flags.contains(DebugFlags::LOG_BARRIERS) {
                    for barrier in &barriers {
                        log::info!(
                            "Pass '{}': '{}' {:?} -> {:?}",
                            pass.name,
                            barrier.name,
                            barrier.before,
                            barrier.after
                        );
                    }
                }

                report.barrier_count += barriers.len();
                backend.transition_textures(cmd, &barriers);
            }

            let started = debug_flags
                .contains(DebugFlags::PASS_TIMING)
                .then(Instant::now);
            {
                let mut context = PassContext::new(backend, cmd, resources, pool, pass_index);
                pass.pass.execute(&mut context);
            }
            if let Some(started) = started {
                report.pass_statistics.push(PassStatistics {
                    pass_name: pass.name.clone(),
                    pass_index,
                    execution_time: started.elapsed(),
                });
            }
            report.executed_passes.push(pass.name.clone());

            for usage in &pass.usages {
                let Some(resource) = resources.get_mut(usage.handle) else {
                    continue;
                };
                if resource.last_use() != Some(pass_index) {
                    continue;
                }
                if let Some((slot, final_state)) = resource.unbind_slot() {
                    if debug_flags.contains(DebugFlags::LOG_LIFETIMES) {
                        log::info!(
                            "Returning '{}' to the pool after pass '{}' in {:?}",
                            resource.name(),
                            pass.name,
                            final_state
                        );
                    }
                    pool.release(slot, final_state);
                }
            }
        }

        Ok(())
    }

    fn release_remaining(&mut self, pool: &mut TransientPool<B>) {
        for resource in self.resources.iter_mut() {
            if let Some((slot, final_state)) = resource.unbind_slot() {
                pool.release(slot, final_state);
            }
        }
    }
}
